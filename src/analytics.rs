//! C9 — analytics queries. Overview and per-monitor uptime/latency
//! reporting: 24h computed live from raw checks using the same interval
//! algebra as the rollup (C6); 7d/30d/90d read from daily rollups, with
//! missing days treated as fully unknown so charts stay continuous.

use rusqlite::params;
use serde::Serialize;

use crate::db::Db;
use crate::histogram;
use crate::intervals::{self, CheckPoint, Interval};
use crate::time_util::{day_start, floor_minute, range_bounds, range_seconds, SECS_PER_DAY};

#[derive(Debug, Serialize, Clone)]
pub struct Overview {
    pub range_start: i64,
    pub range_end: i64,
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub uptime_sec: i64,
    pub uptime_pct: f64,
    pub monitors_total: i64,
    pub alerts_count: i64,
    pub outages_longest_sec: i64,
    pub outages_mttr_sec: Option<f64>,
}

#[derive(Debug, Serialize, Clone)]
pub struct MonitorPoint {
    pub checked_at: i64,
    pub status: String,
    pub latency_ms: Option<i64>,
}

#[derive(Debug, Serialize, Clone)]
pub struct MonitorWindow {
    pub range_start: i64,
    pub range_end: i64,
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub unknown_sec: i64,
    pub uptime_sec: i64,
    pub uptime_pct: f64,
    pub avg_latency_ms: Option<f64>,
    pub p50: Option<i64>,
    pub p95: Option<i64>,
    pub points: Vec<MonitorPoint>,
}

#[derive(Debug, Serialize, Clone)]
pub struct OutageEntry {
    pub id: String,
    pub monitor_id: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub initial_error: Option<String>,
    pub last_error: Option<String>,
}

pub fn overview(db: &Db, now: i64, range: &str) -> Option<Overview> {
    let (range_start, range_end) = range_bounds(range, now)?;
    let conn = db.conn();

    let mut stmt = conn
        .prepare("SELECT id, created_at, interval_sec FROM monitors WHERE is_active = 1")
        .ok()?;
    let monitors: Vec<(String, i64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .ok()?
        .filter_map(|r| r.ok())
        .collect();
    drop(stmt);

    let mut total_sec = 0i64;
    let mut downtime_sec = 0i64;
    let mut longest = 0i64;
    let mut alerts_count = 0i64;
    let mut mttr_samples: Vec<i64> = Vec::new();

    for (id, created_at, _interval_sec) in &monitors {
        let m_start = range_start.max(*created_at);
        if m_start >= range_end {
            continue;
        }
        total_sec += range_end - m_start;

        let outages = fetch_outages_in_range(&conn, id, m_start, range_end);
        let merged = intervals::merge(&outages.iter().map(|o| o.interval).collect::<Vec<_>>());
        downtime_sec += intervals::sum(&merged);
        for o in &merged {
            longest = longest.max(o.end - o.start);
        }

        for o in &outages {
            if o.started_at >= m_start {
                alerts_count += 1;
            }
            if let Some(ended) = o.ended_at {
                if ended <= range_end {
                    mttr_samples.push(ended - o.started_at);
                }
            }
        }
    }

    let uptime_sec = (total_sec - downtime_sec).max(0);
    let uptime_pct = if total_sec > 0 { uptime_sec as f64 / total_sec as f64 * 100.0 } else { 100.0 };
    let mttr_sec = if mttr_samples.is_empty() {
        None
    } else {
        Some(mttr_samples.iter().sum::<i64>() as f64 / mttr_samples.len() as f64)
    };

    Some(Overview {
        range_start,
        range_end,
        total_sec,
        downtime_sec,
        uptime_sec,
        uptime_pct,
        monitors_total: monitors.len() as i64,
        alerts_count,
        outages_longest_sec: longest,
        outages_mttr_sec: mttr_sec,
    })
}

struct OutageSpan {
    interval: Interval,
    started_at: i64,
    ended_at: Option<i64>,
}

fn fetch_outages_in_range(conn: &rusqlite::Connection, monitor_id: &str, range_start: i64, range_end: i64) -> Vec<OutageSpan> {
    let mut stmt = match conn.prepare(
        "SELECT started_at, ended_at FROM outages WHERE monitor_id = ?1 AND started_at < ?2 AND (ended_at IS NULL OR ended_at > ?3)",
    ) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let rows = stmt.query_map(params![monitor_id, range_end, range_start], |row| {
        let started_at: i64 = row.get(0)?;
        let ended_at: Option<i64> = row.get(1)?;
        Ok((started_at, ended_at))
    });
    match rows {
        Ok(mapped) => mapped
            .filter_map(|r| r.ok())
            .filter_map(|(started_at, ended_at)| {
                let raw = Interval::new(started_at, ended_at.unwrap_or(range_end));
                intervals::clip(raw, Interval::new(range_start, range_end)).map(|interval| OutageSpan { interval, started_at, ended_at })
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Live 24h window for a single monitor: raw checks plus the same
/// unknown-interval computation the rollup uses, without touching
/// `monitor_daily_rollups`.
pub fn monitor_24h(db: &Db, monitor_id: &str, now: i64) -> Option<MonitorWindow> {
    let conn = db.conn();
    let (created_at, interval_sec): (i64, i64) = conn
        .query_row("SELECT created_at, interval_sec FROM monitors WHERE id = ?1", params![monitor_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .ok()?;

    let range_end = floor_minute(now);
    let range_start = (range_end - SECS_PER_DAY).max(created_at);
    if range_start >= range_end {
        return None;
    }

    let outages = fetch_outages_in_range(&conn, monitor_id, range_start, range_end);
    let downtime = intervals::merge(&outages.iter().map(|o| o.interval).collect::<Vec<_>>());
    let downtime_sec = intervals::sum(&downtime);

    let mut stmt = conn
        .prepare(
            "SELECT checked_at, status, latency_ms FROM check_results WHERE monitor_id = ?1 AND checked_at >= ?2 AND checked_at < ?3 ORDER BY checked_at ASC",
        )
        .ok()?;
    let points: Vec<MonitorPoint> = stmt
        .query_map(params![monitor_id, range_start - 2 * interval_sec, range_end], |row| {
            Ok(MonitorPoint { checked_at: row.get(0)?, status: row.get(1)?, latency_ms: row.get(2)? })
        })
        .ok()?
        .filter_map(|r| r.ok())
        .collect();

    let check_points: Vec<CheckPoint> = points.iter().map(|p| CheckPoint { at: p.checked_at, is_unknown: p.status == "unknown" }).collect();
    let unknown = intervals::build_unknown(range_start, range_end, interval_sec, &check_points);
    let unknown_sec = (intervals::sum(&unknown) - intervals::overlap(&unknown, &downtime)).max(0);

    let total_sec = range_end - range_start;
    let unavailable_sec = total_sec.min(downtime_sec + unknown_sec);
    let uptime_sec = total_sec - unavailable_sec;
    let uptime_pct = if total_sec > 0 { uptime_sec as f64 / total_sec as f64 * 100.0 } else { 100.0 };

    let in_range: Vec<&MonitorPoint> = points.iter().filter(|p| p.checked_at >= range_start).collect();
    let mut latencies: Vec<i64> = in_range.iter().filter(|p| p.status == "up").filter_map(|p| p.latency_ms).collect();
    latencies.sort_unstable();
    let avg_latency_ms = if latencies.is_empty() { None } else { Some(latencies.iter().sum::<i64>() as f64 / latencies.len() as f64) };

    Some(MonitorWindow {
        range_start,
        range_end,
        total_sec,
        downtime_sec,
        unknown_sec,
        uptime_sec,
        uptime_pct,
        avg_latency_ms,
        p50: histogram::percentile(&latencies, 0.50),
        p95: histogram::percentile(&latencies, 0.95),
        points: in_range.into_iter().cloned().collect(),
    })
}

/// 7d/30d/90d windows, read entirely from `monitor_daily_rollups`. Missing
/// days contribute a fully-unknown placeholder so ranges stay contiguous.
pub fn monitor_from_rollups(db: &Db, monitor_id: &str, now: i64, range: &str) -> Option<MonitorWindow> {
    let (range_start, range_end) = range_bounds(range, now)?;
    let conn = db.conn();

    let mut stmt = conn
        .prepare(
            "SELECT day_start_at, total_sec, downtime_sec, unknown_sec, uptime_sec, checks_up, avg_latency_ms, latency_histogram_json
             FROM monitor_daily_rollups WHERE monitor_id = ?1 AND day_start_at >= ?2 AND day_start_at < ?3",
        )
        .ok()?;
    let rows: Vec<(i64, i64, i64, i64, i64, i64, Option<f64>, String)> = stmt
        .query_map(params![monitor_id, range_start, range_end], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })
        .ok()?
        .filter_map(|r| r.ok())
        .collect();

    let by_day: std::collections::HashMap<i64, _> = rows.into_iter().map(|r| (r.0, r)).collect();

    let mut total_sec = 0i64;
    let mut downtime_sec = 0i64;
    let mut unknown_sec = 0i64;
    let mut uptime_sec = 0i64;
    let mut checks_up_total = 0i64;
    let mut weighted_latency_sum = 0f64;
    let mut histograms: Vec<Vec<i64>> = Vec::new();

    let mut day = day_start(range_start);
    while day < range_end {
        let day_width = range_seconds(day, day + SECS_PER_DAY);
        if let Some((_, t, d, u, up, checks_up, avg_latency, hist_json)) = by_day.get(&day) {
            total_sec += t;
            downtime_sec += d;
            unknown_sec += u;
            uptime_sec += up;
            checks_up_total += checks_up;
            if let Some(avg) = avg_latency {
                weighted_latency_sum += avg * (*checks_up as f64);
            }
            if let Ok(h) = serde_json::from_str::<Vec<i64>>(hist_json) {
                histograms.push(h);
            }
        } else {
            total_sec += day_width;
            unknown_sec += day_width;
        }
        day += SECS_PER_DAY;
    }

    let uptime_pct = if total_sec > 0 { uptime_sec as f64 / total_sec as f64 * 100.0 } else { 100.0 };
    let avg_latency_ms = if checks_up_total > 0 { Some(weighted_latency_sum / checks_up_total as f64) } else { None };
    let merged_hist = histogram::merge(&histograms);
    let (p50, p95) = percentiles_from_histogram(&merged_hist);

    Some(MonitorWindow {
        range_start,
        range_end,
        total_sec,
        downtime_sec,
        unknown_sec,
        uptime_sec,
        uptime_pct,
        avg_latency_ms,
        p50,
        p95,
        points: Vec::new(),
    })
}

/// Approximate percentiles from a merged histogram: nearest-rank over
/// bucket upper bounds (exact samples aren't retained across days).
fn percentiles_from_histogram(hist: &[i64]) -> (Option<i64>, Option<i64>) {
    let total: i64 = hist.iter().sum();
    if total == 0 {
        return (None, None);
    }
    let bounds: Vec<i64> = histogram::BUCKETS.iter().copied().chain(std::iter::once(histogram::BUCKETS[histogram::BUCKETS.len() - 1] * 2)).collect();
    let rank = |pct: f64| -> i64 {
        let target = (pct * total as f64).ceil() as i64;
        let mut cum = 0i64;
        for (i, count) in hist.iter().enumerate() {
            cum += count;
            if cum >= target {
                return bounds[i.min(bounds.len() - 1)];
            }
        }
        bounds[bounds.len() - 1]
    };
    (Some(rank(0.50)), Some(rank(0.95)))
}

pub fn list_outages(db: &Db, before_id: Option<&str>, range_start: i64, range_end: i64, limit: i64) -> Vec<OutageEntry> {
    list_outages_for_monitor(db, None, before_id, range_start, range_end, limit)
}

/// Same as [`list_outages`], optionally scoped to a single monitor
/// (spec §6 `GET /admin/analytics/monitors/{id}/outages`).
pub fn list_outages_for_monitor(
    db: &Db,
    monitor_id: Option<&str>,
    before_id: Option<&str>,
    range_start: i64,
    range_end: i64,
    limit: i64,
) -> Vec<OutageEntry> {
    let conn = db.conn();
    let monitor_filter = if monitor_id.is_some() { "AND monitor_id = ?5" } else { "" };
    let sql = if before_id.is_some() {
        format!(
            "SELECT id, monitor_id, started_at, ended_at, initial_error, last_error FROM outages
             WHERE started_at < ?2 AND (ended_at IS NULL OR ended_at > ?1) AND id < ?3 {monitor_filter}
             ORDER BY id DESC LIMIT ?4"
        )
    } else {
        format!(
            "SELECT id, monitor_id, started_at, ended_at, initial_error, last_error FROM outages
             WHERE started_at < ?2 AND (ended_at IS NULL OR ended_at > ?1) {monitor_filter}
             ORDER BY id DESC LIMIT ?4"
        )
    };
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let map_row = |row: &rusqlite::Row| {
        Ok(OutageEntry {
            id: row.get(0)?,
            monitor_id: row.get(1)?,
            started_at: row.get(2)?,
            ended_at: row.get(3)?,
            initial_error: row.get(4)?,
            last_error: row.get(5)?,
        })
    };
    let rows = match (before_id, monitor_id) {
        (Some(cursor), Some(mid)) => stmt.query_map(params![range_start, range_end, cursor, limit, mid], map_row),
        (Some(cursor), None) => stmt.query_map(params![range_start, range_end, cursor, limit], map_row),
        (None, Some(mid)) => stmt.query_map(params![range_start, range_end, limit, mid], map_row),
        (None, None) => stmt.query_map(params![range_start, range_end, limit], map_row),
    };
    match rows {
        Ok(mapped) => mapped.filter_map(|r| r.ok()).collect(),
        Err(_) => Vec::new(),
    }
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
                "INSERT INTO monitors (id, name, type, target, interval_sec, created_at, updated_at) VALUES ('m1','api','http','t',60,0,0)",
                [],
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn overview_reports_full_uptime_with_no_outages() {
        let db = setup();
        let now = 100_000i64;
        let ov = overview(&db, now, "24h").unwrap();
        assert_eq!(ov.downtime_sec, 0);
        assert_eq!(ov.uptime_pct, 100.0);
        assert_eq!(ov.monitors_total, 1);
    }

    #[test]
    fn overview_rejects_unknown_range() {
        let db = setup();
        assert!(overview(&db, 100_000, "13w").is_none());
    }

    #[test]
    fn monitor_24h_counts_outage_downtime() {
        let db = setup();
        let now = 100_000i64;
        {
            let conn = db.conn();
            conn.execute(
                "INSERT INTO outages (id, monitor_id, started_at, ended_at) VALUES ('o1','m1',?1,?2)",
                params![now - 500, now - 400],
            )
            .unwrap();
        }
        let w = monitor_24h(&db, "m1", now).unwrap();
        assert_eq!(w.downtime_sec, 100);
    }

    #[test]
    fn monitor_from_rollups_fills_missing_days_as_unknown() {
        let db = setup();
        let now = day_start(1_700_000_000) + SECS_PER_DAY * 3;
        // no rollup rows inserted -> every day in the 7d window is missing
        let w = monitor_from_rollups(&db, "m1", now, "7d").unwrap();
        assert_eq!(w.unknown_sec, w.total_sec);
        assert_eq!(w.uptime_sec, 0);
    }
}
