//! Coarse mutual exclusion via the `locks` table (spec §4.4/§4.6/§9):
//! a conditional upsert that only succeeds if no live lease exists.
//! Sufficient for a single-instance deployment; for multiple instances
//! the same row acts as a fencing lease.

use rusqlite::{params, Connection};

/// Attempt to acquire (or renew) `name` for `ttl_secs` starting at `now`.
/// Returns `true` iff this call now holds the lease.
pub fn try_acquire(conn: &Connection, name: &str, now: i64, ttl_secs: i64) -> bool {
    let expires_at = now + ttl_secs;
    let changed = conn
        .execute(
            "INSERT INTO locks (name, expires_at) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET expires_at = excluded.expires_at
             WHERE locks.expires_at <= ?3",
            params![name, expires_at, now],
        )
        .unwrap_or(0);
    changed > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    #[test]
    fn second_acquire_fails_while_lease_is_live() {
        let db = Db::open_in_memory().unwrap();
        let conn = db.conn();
        assert!(try_acquire(&conn, "scheduler:tick", 1000, 55));
        assert!(!try_acquire(&conn, "scheduler:tick", 1010, 55));
    }

    #[test]
    fn acquire_succeeds_again_after_expiry() {
        let db = Db::open_in_memory().unwrap();
        let conn = db.conn();
        assert!(try_acquire(&conn, "scheduler:tick", 1000, 55));
        assert!(try_acquire(&conn, "scheduler:tick", 1060, 55));
    }
}
