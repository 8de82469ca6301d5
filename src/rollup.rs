//! C6 — daily rollup. Reduces one UTC day of checks and outages per
//! monitor into a single `MonitorDailyRollup` row, reusing the interval
//! algebra (C1) so that outage time and probe-gap ("unknown") time are
//! computed consistently with the public builder and analytics.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::params;

use crate::config::Settings;
use crate::db::Db;
use crate::histogram;
use crate::intervals::{self, CheckPoint, Interval};
use crate::locks;
use crate::time_util::{day_start, SECS_PER_DAY};

const LOCK_PREFIX: &str = "analytics:daily-rollup:";
const FLUSH_BATCH: usize = 50;

struct MonitorSpan {
    id: String,
    interval_sec: i64,
    created_at: i64,
}

pub struct DayRollup {
    pub monitor_id: String,
    pub day_start_at: i64,
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub unknown_sec: i64,
    pub uptime_sec: i64,
    pub checks_total: i64,
    pub checks_up: i64,
    pub checks_down: i64,
    pub checks_unknown: i64,
    pub checks_maintenance: i64,
    pub avg_latency_ms: Option<f64>,
    pub p50: Option<i64>,
    pub p95: Option<i64>,
    pub latency_histogram: Vec<i64>,
}

/// Background loop: sleeps until the next UTC midnight, then rolls up the
/// day that just ended. Runs forever until the Rocket shutdown fires.
pub async fn run(db: Arc<Db>, settings: Arc<Settings>, shutdown: rocket::Shutdown) {
    println!("\u{1f4ca} rollup: starting");
    loop {
        let now = chrono::Utc::now().timestamp();
        let next_midnight = day_start(now) + SECS_PER_DAY;
        let sleep_secs = (next_midnight - now).max(1) as u64;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(sleep_secs)) => {}
            _ = shutdown.clone() => {
                println!("\u{1f4ca} rollup: shutting down");
                return;
            }
        }

        let finished_day = day_start(chrono::Utc::now().timestamp()) - SECS_PER_DAY;
        match run_for_day(&db, &settings, finished_day) {
            Ok(n) => println!("\u{1f4ca} rollup: wrote {n} monitor-day rows for day_start_at={finished_day}"),
            Err(e) => eprintln!("\u{274c} rollup: failed for day_start_at={finished_day}: {e}"),
        }
    }
}

/// Compute and persist the rollup for one UTC day (`day_start_at`). Public
/// so the manual-trigger admin endpoint can invoke it on demand.
pub fn run_for_day(db: &Db, settings: &Settings, day_start_at: i64) -> Result<usize, String> {
    let now = chrono::Utc::now().timestamp();
    let lock_name = format!("{LOCK_PREFIX}{day_start_at}");
    {
        let conn = db.conn();
        if !locks::try_acquire(&conn, &lock_name, now, settings.rollup_lease_secs) {
            return Ok(0);
        }
    }

    let day_end = day_start_at + SECS_PER_DAY;
    let monitors = select_monitors(db, day_end);
    let mut rollups = Vec::with_capacity(monitors.len());

    for m in &monitors {
        let range_start = day_start_at.max(m.created_at);
        if range_start >= day_end {
            continue;
        }
        rollups.push(compute_one(db, m, range_start, day_end, day_start_at));
    }

    let mut written = 0;
    for chunk in rollups.chunks(FLUSH_BATCH) {
        written += persist_chunk(db, chunk)?;
    }
    Ok(written)
}

fn select_monitors(db: &Db, day_end: i64) -> Vec<MonitorSpan> {
    let conn = db.conn();
    let mut stmt = match conn.prepare("SELECT id, interval_sec, created_at FROM monitors WHERE created_at < ?1") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let rows = stmt.query_map(params![day_end], |row| {
        Ok(MonitorSpan { id: row.get(0)?, interval_sec: row.get(1)?, created_at: row.get(2)? })
    });
    match rows {
        Ok(mapped) => mapped.filter_map(|r| r.ok()).collect(),
        Err(_) => Vec::new(),
    }
}

fn compute_one(db: &Db, monitor: &MonitorSpan, range_start: i64, range_end: i64, day_start_at: i64) -> DayRollup {
    let conn = db.conn();
    let total_sec = range_end - range_start;

    let downtime = fetch_outage_intervals(&conn, &monitor.id, range_start, range_end);
    let downtime = intervals::merge(&downtime);
    let downtime_sec = intervals::sum(&downtime);

    let checks = fetch_checks(&conn, &monitor.id, range_start - 2 * monitor.interval_sec, range_end);
    let check_points: Vec<CheckPoint> = checks.iter().map(|c| CheckPoint { at: c.checked_at, is_unknown: c.status == "unknown" }).collect();
    let unknown = intervals::build_unknown(range_start, range_end, monitor.interval_sec, &check_points);
    let unknown_overlap = intervals::overlap(&unknown, &downtime);
    let unknown_sec = (intervals::sum(&unknown) - unknown_overlap).max(0);

    let unavailable_sec = total_sec.min(downtime_sec + unknown_sec);
    let uptime_sec = total_sec - unavailable_sec;

    let in_range_checks: Vec<&CheckRow> = checks.iter().filter(|c| c.checked_at >= range_start).collect();
    let checks_up = in_range_checks.iter().filter(|c| c.status == "up").count() as i64;
    let checks_down = in_range_checks.iter().filter(|c| c.status == "down").count() as i64;
    let checks_unknown = in_range_checks.iter().filter(|c| c.status == "unknown").count() as i64;
    let checks_maintenance = in_range_checks.iter().filter(|c| c.status == "maintenance").count() as i64;
    let checks_total = in_range_checks.len() as i64;

    let mut latencies: Vec<i64> = in_range_checks
        .iter()
        .filter(|c| c.status == "up")
        .filter_map(|c| c.latency_ms)
        .collect();
    latencies.sort_unstable();

    let avg_latency_ms = if latencies.is_empty() {
        None
    } else {
        Some((latencies.iter().sum::<i64>() as f64 / latencies.len() as f64).round())
    };
    let p50 = histogram::percentile(&latencies, 0.50);
    let p95 = histogram::percentile(&latencies, 0.95);
    let latency_histogram = histogram::build(&latencies);

    DayRollup {
        monitor_id: monitor.id.clone(),
        day_start_at,
        total_sec,
        downtime_sec,
        unknown_sec,
        uptime_sec,
        checks_total,
        checks_up,
        checks_down,
        checks_unknown,
        checks_maintenance,
        avg_latency_ms,
        p50,
        p95,
        latency_histogram,
    }
}

struct CheckRow {
    checked_at: i64,
    status: String,
    latency_ms: Option<i64>,
}

fn fetch_checks(conn: &rusqlite::Connection, monitor_id: &str, from: i64, to: i64) -> Vec<CheckRow> {
    let mut stmt = match conn.prepare(
        "SELECT checked_at, status, latency_ms FROM check_results WHERE monitor_id = ?1 AND checked_at >= ?2 AND checked_at < ?3 ORDER BY checked_at ASC",
    ) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let rows = stmt.query_map(params![monitor_id, from, to], |row| {
        Ok(CheckRow { checked_at: row.get(0)?, status: row.get(1)?, latency_ms: row.get(2)? })
    });
    match rows {
        Ok(mapped) => mapped.filter_map(|r| r.ok()).collect(),
        Err(_) => Vec::new(),
    }
}

fn fetch_outage_intervals(conn: &rusqlite::Connection, monitor_id: &str, range_start: i64, range_end: i64) -> Vec<Interval> {
    let mut stmt = match conn.prepare(
        "SELECT started_at, ended_at FROM outages WHERE monitor_id = ?1 AND started_at < ?2 AND (ended_at IS NULL OR ended_at > ?3)",
    ) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let rows = stmt.query_map(params![monitor_id, range_end, range_start], |row| {
        let started_at: i64 = row.get(0)?;
        let ended_at: Option<i64> = row.get(1)?;
        Ok(Interval::new(started_at, ended_at.unwrap_or(range_end)))
    });
    match rows {
        Ok(mapped) => mapped
            .filter_map(|r| r.ok())
            .filter_map(|i| intervals::clip(i, Interval::new(range_start, range_end)))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn persist_chunk(db: &Db, chunk: &[DayRollup]) -> Result<usize, String> {
    let mut conn = db.conn();
    let tx = conn.transaction().map_err(|e| e.to_string())?;
    for r in chunk {
        let histogram_json = serde_json::to_string(&r.latency_histogram).map_err(|e| e.to_string())?;
        tx.execute(
            "INSERT INTO monitor_daily_rollups (
                monitor_id, day_start_at, total_sec, downtime_sec, unknown_sec, uptime_sec,
                checks_total, checks_up, checks_down, checks_unknown, checks_maintenance,
                avg_latency_ms, p50, p95, latency_histogram_json
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
            ON CONFLICT(monitor_id, day_start_at) DO UPDATE SET
                total_sec = excluded.total_sec,
                downtime_sec = excluded.downtime_sec,
                unknown_sec = excluded.unknown_sec,
                uptime_sec = excluded.uptime_sec,
                checks_total = excluded.checks_total,
                checks_up = excluded.checks_up,
                checks_down = excluded.checks_down,
                checks_unknown = excluded.checks_unknown,
                checks_maintenance = excluded.checks_maintenance,
                avg_latency_ms = excluded.avg_latency_ms,
                p50 = excluded.p50,
                p95 = excluded.p95,
                latency_histogram_json = excluded.latency_histogram_json",
            params![
                r.monitor_id,
                r.day_start_at,
                r.total_sec,
                r.downtime_sec,
                r.unknown_sec,
                r.uptime_sec,
                r.checks_total,
                r.checks_up,
                r.checks_down,
                r.checks_unknown,
                r.checks_maintenance,
                r.avg_latency_ms,
                r.p50,
                r.p95,
                histogram_json,
            ],
        )
        .map_err(|e| e.to_string())?;
    }
    tx.commit().map_err(|e| e.to_string())?;
    Ok(chunk.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn settings() -> Settings {
        Settings {
            database_path: ":memory:".into(),
            admin_token: "test".into(),
            scheduler_concurrency: 5,
            scheduler_lease_secs: 55,
            rollup_lease_secs: 600,
            snapshot_max_age_secs: 60,
            snapshot_refresh_at_secs: 30,
        }
    }

    #[test]
    fn rollup_counts_outage_seconds_and_checks() {
        let db = Db::open_in_memory().unwrap();
        let day_start_at = 1_700_000_000i64 / SECS_PER_DAY * SECS_PER_DAY;
        {
            let conn = db.conn();
            conn.execute(
                "INSERT INTO monitors (id, name, type, target, interval_sec, created_at, updated_at) VALUES ('m1','api','http','t',60,0,0)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO outages (id, monitor_id, started_at, ended_at) VALUES ('o1','m1',?1,?2)",
                params![day_start_at + 100, day_start_at + 400],
            )
            .unwrap();
            for i in 0..5 {
                let t = day_start_at + i * 3600;
                conn.execute(
                    "INSERT INTO check_results (id, monitor_id, checked_at, status, latency_ms, attempt) VALUES (?1,'m1',?2,'up',50,1)",
                    params![format!("c{i}"), t],
                )
                .unwrap();
            }
        }

        let n = run_for_day(&db, &settings(), day_start_at).unwrap();
        assert_eq!(n, 1);

        let conn = db.conn();
        let downtime: i64 = conn
            .query_row("SELECT downtime_sec FROM monitor_daily_rollups WHERE monitor_id='m1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(downtime, 300);
        let checks_up: i64 = conn
            .query_row("SELECT checks_up FROM monitor_daily_rollups WHERE monitor_id='m1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(checks_up, 5);
    }

    #[test]
    fn second_run_is_a_no_op_while_lease_is_live() {
        let db = Db::open_in_memory().unwrap();
        let day_start_at = 1_700_000_000i64 / SECS_PER_DAY * SECS_PER_DAY;
        {
            let conn = db.conn();
            conn.execute(
                "INSERT INTO monitors (id, name, type, target, interval_sec, created_at, updated_at) VALUES ('m1','api','http','t',60,0,0)",
                [],
            )
            .unwrap();
        }
        assert_eq!(run_for_day(&db, &settings(), day_start_at).unwrap(), 1);
        assert_eq!(run_for_day(&db, &settings(), day_start_at).unwrap(), 0);
    }
}
