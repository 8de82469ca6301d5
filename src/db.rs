//! Storage layer: a single SQLite connection behind a mutex (teacher
//! pattern, `db.rs`), migrated with batched `CREATE TABLE IF NOT EXISTS`
//! plus additive `ALTER TABLE` statements guarded with `.ok()`.
//!
//! Timestamps are stored as `INTEGER` unix seconds throughout, per
//! spec §3 — unlike the teacher's `TEXT datetime('now')` columns.

use rusqlite::{Connection, MutexGuard, Result};
use std::sync::Mutex;

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
        let db = Db { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Db { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS monitors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                type TEXT NOT NULL DEFAULT 'http',
                target TEXT NOT NULL,
                interval_sec INTEGER NOT NULL DEFAULT 300,
                timeout_ms INTEGER NOT NULL DEFAULT 10000,
                is_active INTEGER NOT NULL DEFAULT 1,
                http_method TEXT,
                http_headers TEXT,
                http_body TEXT,
                expected_status TEXT,
                response_keyword TEXT,
                response_forbidden_keyword TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS monitor_state (
                monitor_id TEXT PRIMARY KEY REFERENCES monitors(id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'unknown',
                last_checked_at INTEGER,
                last_changed_at INTEGER,
                last_latency_ms INTEGER,
                last_error TEXT,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                consecutive_successes INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS check_results (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                checked_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                latency_ms INTEGER,
                http_status INTEGER,
                error TEXT,
                attempt INTEGER NOT NULL DEFAULT 1,
                location TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_check_results_monitor_time ON check_results(monitor_id, checked_at DESC);

            CREATE TABLE IF NOT EXISTS outages (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                started_at INTEGER NOT NULL,
                ended_at INTEGER,
                initial_error TEXT,
                last_error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_outages_monitor ON outages(monitor_id, started_at DESC);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_outages_one_ongoing
                ON outages(monitor_id) WHERE ended_at IS NULL;

            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'investigating',
                impact TEXT NOT NULL DEFAULT 'none',
                message TEXT,
                started_at INTEGER NOT NULL,
                resolved_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_incidents_resolved ON incidents(resolved_at, started_at DESC);

            CREATE TABLE IF NOT EXISTS incident_monitors (
                incident_id TEXT NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
                monitor_id TEXT NOT NULL,
                PRIMARY KEY (incident_id, monitor_id)
            );
            CREATE INDEX IF NOT EXISTS idx_incident_monitors_monitor ON incident_monitors(monitor_id);

            CREATE TABLE IF NOT EXISTS incident_updates (
                id TEXT PRIMARY KEY,
                incident_id TEXT NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
                status TEXT,
                message TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_incident_updates_incident ON incident_updates(incident_id, created_at ASC);

            CREATE TABLE IF NOT EXISTS maintenance_windows (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                message TEXT,
                starts_at INTEGER NOT NULL,
                ends_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_maintenance_active ON maintenance_windows(starts_at, ends_at);

            CREATE TABLE IF NOT EXISTS maintenance_monitors (
                maintenance_id TEXT NOT NULL REFERENCES maintenance_windows(id) ON DELETE CASCADE,
                monitor_id TEXT NOT NULL,
                PRIMARY KEY (maintenance_id, monitor_id)
            );
            CREATE INDEX IF NOT EXISTS idx_maintenance_monitors_monitor ON maintenance_monitors(monitor_id);

            CREATE TABLE IF NOT EXISTS notification_channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                type TEXT NOT NULL DEFAULT 'webhook',
                config TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notification_deliveries (
                id TEXT PRIMARY KEY,
                event_key TEXT NOT NULL,
                channel_id TEXT NOT NULL REFERENCES notification_channels(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                http_status INTEGER,
                error TEXT,
                created_at INTEGER NOT NULL,
                UNIQUE(event_key, channel_id)
            );

            CREATE TABLE IF NOT EXISTS monitor_daily_rollups (
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                day_start_at INTEGER NOT NULL,
                total_sec INTEGER NOT NULL,
                downtime_sec INTEGER NOT NULL,
                unknown_sec INTEGER NOT NULL,
                uptime_sec INTEGER NOT NULL,
                checks_total INTEGER NOT NULL,
                checks_up INTEGER NOT NULL,
                checks_down INTEGER NOT NULL,
                checks_unknown INTEGER NOT NULL,
                checks_maintenance INTEGER NOT NULL,
                avg_latency_ms REAL,
                p50 INTEGER,
                p95 INTEGER,
                latency_histogram_json TEXT NOT NULL,
                PRIMARY KEY (monitor_id, day_start_at)
            );

            CREATE TABLE IF NOT EXISTS locks (
                name TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS public_snapshots (
                key TEXT PRIMARY KEY,
                generated_at INTEGER NOT NULL,
                body_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;

        Ok(())
    }
}
