//! Shared maintenance-window queries used by the scheduler (to suppress
//! notifications) and the public status builder (to override display
//! status). Active means `starts_at <= now < ends_at`.

use rusqlite::Connection;
use std::collections::HashSet;

/// Monitor ids with at least one active maintenance window at `now`.
pub fn active_monitor_ids(conn: &Connection, now: i64) -> HashSet<String> {
    let mut stmt = match conn.prepare(
        "SELECT DISTINCT mm.monitor_id
         FROM maintenance_monitors mm
         JOIN maintenance_windows w ON w.id = mm.maintenance_id
         WHERE w.starts_at <= ?1 AND ?1 < w.ends_at",
    ) {
        Ok(s) => s,
        Err(_) => return HashSet::new(),
    };
    let rows = match stmt.query_map([now], |row| row.get::<_, String>(0)) {
        Ok(r) => r,
        Err(_) => return HashSet::new(),
    };
    rows.filter_map(|r| r.ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn setup() -> Db {
        let db = Db::open_in_memory().unwrap();
        {
            let conn = db.conn();
            conn.execute(
                "INSERT INTO monitors (id, name, type, target, created_at, updated_at) VALUES ('m1','m','http','t',0,0)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO maintenance_windows (id, title, starts_at, ends_at, created_at) VALUES ('w1','w',100,200,0)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO maintenance_monitors (maintenance_id, monitor_id) VALUES ('w1','m1')",
                [],
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn active_monitor_ids_includes_only_windows_covering_now() {
        let db = setup();
        let conn = db.conn();
        let ids = active_monitor_ids(&conn, 150);
        assert!(ids.contains("m1"));
        let ids = active_monitor_ids(&conn, 500);
        assert!(!ids.contains("m1"));
    }
}
