//! Ambient config layer: environment variables read once at boot
//! (teacher pattern: `dotenvy::dotenv()` in `main.rs`), with defaults so
//! the process runs unconfigured in development.

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: String,
    pub admin_token: String,
    pub scheduler_concurrency: usize,
    pub scheduler_lease_secs: i64,
    pub rollup_lease_secs: i64,
    pub snapshot_max_age_secs: i64,
    pub snapshot_refresh_at_secs: i64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "uptime-sentinel.db".into()),
            admin_token: std::env::var("ADMIN_TOKEN").unwrap_or_else(|_| {
                eprintln!("\u{26a0}\u{fe0f}  ADMIN_TOKEN not set — generating an ephemeral one for this process");
                format!("dev_{}", hex::encode(rand::random::<[u8; 16]>()))
            }),
            scheduler_concurrency: env_or("SCHEDULER_CONCURRENCY", 5usize),
            scheduler_lease_secs: env_or("SCHEDULER_LEASE_SECS", 55i64),
            rollup_lease_secs: env_or("ROLLUP_LEASE_SECS", 600i64),
            snapshot_max_age_secs: env_or("SNAPSHOT_MAX_AGE_SECS", 60i64),
            snapshot_refresh_at_secs: env_or("SNAPSHOT_REFRESH_AT_SECS", 30i64),
        }
    }

    /// Overlays operator-set overrides from the `settings` table (written by
    /// `PATCH /admin/settings`) on top of the env-derived defaults. Secrets
    /// (`database_path`, `admin_token`) are never overridable this way.
    pub fn overlay(&self, conn: &rusqlite::Connection) -> Settings {
        let mut out = self.clone();
        if let Some(v) = read_override(conn, "scheduler_concurrency") {
            out.scheduler_concurrency = v.max(1) as usize;
        }
        if let Some(v) = read_override(conn, "scheduler_lease_secs") {
            out.scheduler_lease_secs = v.max(1);
        }
        if let Some(v) = read_override(conn, "rollup_lease_secs") {
            out.rollup_lease_secs = v.max(1);
        }
        if let Some(v) = read_override(conn, "snapshot_max_age_secs") {
            out.snapshot_max_age_secs = v.max(1);
        }
        if let Some(v) = read_override(conn, "snapshot_refresh_at_secs") {
            out.snapshot_refresh_at_secs = v.max(0);
        }
        out
    }
}

fn read_override(conn: &rusqlite::Connection, key: &str) -> Option<i64> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get::<_, String>(0))
        .ok()
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    #[test]
    fn overlay_keeps_defaults_when_no_overrides_stored() {
        let db = Db::open_in_memory().unwrap();
        let base = Settings {
            database_path: ":memory:".into(),
            admin_token: "tok".into(),
            scheduler_concurrency: 5,
            scheduler_lease_secs: 55,
            rollup_lease_secs: 600,
            snapshot_max_age_secs: 60,
            snapshot_refresh_at_secs: 30,
        };
        let effective = base.overlay(&db.conn());
        assert_eq!(effective.scheduler_concurrency, 5);
    }

    #[test]
    fn overlay_applies_stored_override() {
        let db = Db::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES ('scheduler_concurrency', '9', 0)",
                [],
            )
            .unwrap();
        let base = Settings {
            database_path: ":memory:".into(),
            admin_token: "tok".into(),
            scheduler_concurrency: 5,
            scheduler_lease_secs: 55,
            rollup_lease_secs: 600,
            snapshot_max_age_secs: 60,
            snapshot_refresh_at_secs: 30,
        };
        let effective = base.overlay(&db.conn());
        assert_eq!(effective.scheduler_concurrency, 9);
    }
}
