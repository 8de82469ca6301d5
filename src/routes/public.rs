//! Public, unauthenticated read surface (spec §4.7–§4.9, §6): the cached
//! status snapshot, per-monitor latency/uptime, cross-fleet analytics,
//! incidents, maintenance windows, and per-day rollup detail.

use std::sync::Arc;

use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{get, State};
use rusqlite::params;
use serde::Serialize;

use crate::analytics;
use crate::db::Db;
use crate::error::AppError;
use crate::snapshot;
use crate::status_builder::{self, ActiveIncident, MaintenanceSummary, PublicStatusResponse};

/// Wraps a JSON body with the `Cache-Control` header spec §4.8 requires.
pub struct CachedJson {
    body: PublicStatusResponse,
    cache_control: String,
}

impl<'r> Responder<'r, 'static> for CachedJson {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let mut res = Json(self.body).respond_to(request)?;
        res.set_raw_header("Cache-Control", self.cache_control);
        Ok(res)
    }
}

/// Serves the cached snapshot when fresh; rebuilds it synchronously on a
/// cold or stale cache (spec §4.8). A hit past the refresh threshold still
/// serves the cached body but kicks off a background rebuild so the next
/// reader sees a fresher row.
#[get("/status")]
pub fn public_status(db: &State<Arc<Db>>, settings: &State<crate::config::Settings>) -> CachedJson {
    let now = chrono::Utc::now().timestamp();
    let effective = settings.overlay(&db.conn());

    if let Some(fresh) = snapshot::read_with_bounds(db, now, effective.snapshot_max_age_secs, effective.snapshot_refresh_at_secs) {
        if fresh.should_background_refresh {
            let db = (*db).clone();
            tokio::spawn(async move {
                let payload = status_builder::build(&db, now);
                if let Err(e) = snapshot::write(&db, now, &payload) {
                    eprintln!("\u{274c} snapshot background refresh failed: {e}");
                }
            });
        }
        return CachedJson {
            body: fresh.payload,
            cache_control: snapshot::cache_control_with_bounds(fresh.age, effective.snapshot_max_age_secs, effective.snapshot_refresh_at_secs),
        };
    }

    let payload = status_builder::build(db, now);
    let _ = snapshot::write(db, now, &payload);
    CachedJson {
        body: payload,
        cache_control: snapshot::cache_control_with_bounds(0, effective.snapshot_max_age_secs, effective.snapshot_refresh_at_secs),
    }
}

fn resolve_window(id: &str, range: &str, db: &Db, now: i64) -> Result<analytics::MonitorWindow, AppError> {
    let window = match range {
        "24h" => analytics::monitor_24h(db, id, now),
        "7d" | "30d" | "90d" => analytics::monitor_from_rollups(db, id, now, range),
        other => return Err(AppError::InvalidArgument(format!("range must be one of: 24h, 7d, 30d, 90d (got {other})"))),
    };
    window.ok_or_else(|| AppError::NotFound(format!("no analytics for monitor {id}")))
}

#[derive(Debug, Serialize)]
pub struct MonitorLatencyResponse {
    monitor: String,
    range: String,
    range_start_at: i64,
    range_end_at: i64,
    avg_latency_ms: Option<f64>,
    p95_latency_ms: Option<i64>,
    points: Vec<analytics::MonitorPoint>,
}

#[get("/monitors/<id>/latency?<range>")]
pub fn public_monitor_latency(id: &str, range: Option<&str>, db: &State<Arc<Db>>) -> Result<Json<MonitorLatencyResponse>, AppError> {
    let range = range.unwrap_or("24h");
    let now = chrono::Utc::now().timestamp();
    let w = resolve_window(id, range, db, now)?;
    Ok(Json(MonitorLatencyResponse {
        monitor: id.to_string(),
        range: range.to_string(),
        range_start_at: w.range_start,
        range_end_at: w.range_end,
        avg_latency_ms: w.avg_latency_ms,
        p95_latency_ms: w.p95,
        points: w.points,
    }))
}

#[derive(Debug, Serialize)]
pub struct MonitorUptimeResponse {
    monitor: String,
    range: String,
    range_start_at: i64,
    range_end_at: i64,
    total_sec: i64,
    uptime_sec: i64,
    downtime_sec: i64,
    uptime_pct: f64,
}

#[get("/monitors/<id>/uptime?<range>")]
pub fn public_monitor_uptime(id: &str, range: Option<&str>, db: &State<Arc<Db>>) -> Result<Json<MonitorUptimeResponse>, AppError> {
    let range = range.unwrap_or("24h");
    if range == "90d" {
        return Err(AppError::InvalidArgument("uptime range must be one of: 24h, 7d, 30d".into()));
    }
    let now = chrono::Utc::now().timestamp();
    let w = resolve_window(id, range, db, now)?;
    Ok(Json(MonitorUptimeResponse {
        monitor: id.to_string(),
        range: range.to_string(),
        range_start_at: w.range_start,
        range_end_at: w.range_end,
        total_sec: w.total_sec,
        uptime_sec: w.uptime_sec,
        downtime_sec: w.downtime_sec,
        uptime_pct: w.uptime_pct,
    }))
}

#[derive(Debug, Serialize)]
pub struct MonitorUptimeSummary {
    monitor_id: String,
    uptime_pct: f64,
    avg_latency_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct FleetUptimeResponse {
    range: String,
    range_start_at: i64,
    range_end_at: i64,
    overall_uptime_pct: f64,
    monitors: Vec<MonitorUptimeSummary>,
}

/// Cross-fleet rollup summary: `30d` or `90d` only (spec §6).
#[get("/analytics/uptime?<range>")]
pub fn public_analytics_uptime(range: Option<&str>, db: &State<Arc<Db>>) -> Result<Json<FleetUptimeResponse>, AppError> {
    let range = range.unwrap_or("30d");
    if !matches!(range, "30d" | "90d") {
        return Err(AppError::InvalidArgument(format!("range must be one of: 30d, 90d (got {range})")));
    }
    let now = chrono::Utc::now().timestamp();
    let overview = analytics::overview(db, now, range)
        .ok_or_else(|| AppError::Internal("failed to compute fleet overview".into()))?;

    let ids: Vec<String> = {
        let conn = db.conn();
        let mut stmt = conn
            .prepare("SELECT id FROM monitors WHERE is_active = 1 ORDER BY name")
            .map_err(AppError::from)?;
        stmt.query_map([], |row| row.get(0)).map_err(AppError::from)?.filter_map(|r| r.ok()).collect()
    };
    let monitors = ids
        .iter()
        .filter_map(|id| analytics::monitor_from_rollups(db, id, now, range).map(|w| (id, w)))
        .map(|(id, w)| MonitorUptimeSummary { monitor_id: id.clone(), uptime_pct: w.uptime_pct, avg_latency_ms: w.avg_latency_ms })
        .collect();

    Ok(Json(FleetUptimeResponse {
        range: range.to_string(),
        range_start_at: overview.range_start,
        range_end_at: overview.range_end,
        overall_uptime_pct: overview.uptime_pct,
        monitors,
    }))
}

#[derive(Debug, Serialize)]
pub struct PublicIncidentsResponse {
    incidents: Vec<ActiveIncident>,
    next_cursor: Option<String>,
}

/// Active (unresolved) incidents first, then resolved ones ordered by
/// `id DESC` — keyset-paginated by `cursor` over that resolved tail.
#[get("/incidents?<limit>&<cursor>&<resolved_only>")]
pub fn public_incidents(
    limit: Option<i64>,
    cursor: Option<&str>,
    resolved_only: Option<bool>,
    db: &State<Arc<Db>>,
) -> Result<Json<PublicIncidentsResponse>, AppError> {
    let limit = limit.unwrap_or(20).clamp(1, 100);
    let resolved_only = resolved_only.unwrap_or(false);
    let conn = db.conn();

    let mut incidents = Vec::new();

    if !resolved_only {
        let mut stmt = conn
            .prepare("SELECT id FROM incidents WHERE resolved_at IS NULL ORDER BY started_at DESC")
            .map_err(AppError::from)?;
        let ids: Vec<String> = stmt.query_map([], |row| row.get(0)).map_err(AppError::from)?.filter_map(|r| r.ok()).collect();
        for id in ids {
            if let Ok(incident) = fetch_active_incident(&conn, &id) {
                incidents.push(incident);
            }
        }
    }

    let remaining = limit - incidents.len() as i64;
    let mut next_cursor = None;
    if remaining > 0 {
        let sql = if cursor.is_some() {
            "SELECT id FROM incidents WHERE resolved_at IS NOT NULL AND id < ?1 ORDER BY id DESC LIMIT ?2"
        } else {
            "SELECT id FROM incidents WHERE resolved_at IS NOT NULL ORDER BY id DESC LIMIT ?2"
        };
        let mut stmt = conn.prepare(sql).map_err(AppError::from)?;
        let ids: Vec<String> = match cursor {
            Some(c) => stmt.query_map(params![c, remaining], |row| row.get(0)),
            None => stmt.query_map(params!["", remaining], |row| row.get(0)),
        }
        .map_err(AppError::from)?
        .filter_map(|r| r.ok())
        .collect();

        if ids.len() as i64 == remaining {
            next_cursor = ids.last().cloned();
        }
        for id in ids {
            if let Ok(incident) = fetch_active_incident(&conn, &id) {
                incidents.push(incident);
            }
        }
    }

    Ok(Json(PublicIncidentsResponse { incidents, next_cursor }))
}

fn fetch_active_incident(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<ActiveIncident> {
    let mut incident = conn.query_row(
        "SELECT id, title, status, impact, message, started_at FROM incidents WHERE id = ?1",
        params![id],
        |row| {
            Ok(ActiveIncident {
                id: row.get(0)?,
                title: row.get(1)?,
                status: row.get(2)?,
                impact: row.get(3)?,
                message: row.get(4)?,
                started_at: row.get(5)?,
                monitor_ids: Vec::new(),
                updates: Vec::new(),
            })
        },
    )?;
    let mut stmt = conn.prepare("SELECT monitor_id FROM incident_monitors WHERE incident_id = ?1")?;
    incident.monitor_ids = stmt.query_map(params![id], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
    let mut stmt = conn.prepare("SELECT id, incident_id, status, message, created_at FROM incident_updates WHERE incident_id = ?1 ORDER BY created_at ASC")?;
    incident.updates = stmt
        .query_map(params![id], |row| {
            Ok(crate::models::IncidentUpdate { id: row.get(0)?, incident_id: row.get(1)?, status: row.get(2)?, message: row.get(3)?, created_at: row.get(4)? })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(incident)
}

#[derive(Debug, Serialize)]
pub struct PublicMaintenanceResponse {
    active: Vec<MaintenanceSummary>,
    upcoming: Vec<MaintenanceSummary>,
}

#[get("/maintenance-windows")]
pub fn public_maintenance_windows(db: &State<Arc<Db>>) -> Json<PublicMaintenanceResponse> {
    let now = chrono::Utc::now().timestamp();
    let snapshot = status_builder::build(db, now);
    Json(PublicMaintenanceResponse { active: snapshot.active_maintenance, upcoming: snapshot.upcoming_maintenance })
}

/// A single day's rollup detail for a monitor, keyed by `day_start_at`
/// (a unix-seconds timestamp anywhere within the target UTC day).
#[get("/monitors/<id>/day-context?<day_start_at>")]
pub fn public_monitor_day_context(id: &str, day_start_at: i64, db: &State<Arc<Db>>) -> Result<Json<crate::models::MonitorDailyRollup>, AppError> {
    let day = crate::time_util::day_start(day_start_at);
    let conn = db.conn();
    conn.query_row(
        "SELECT monitor_id, day_start_at, total_sec, downtime_sec, unknown_sec, uptime_sec,
                checks_total, checks_up, checks_down, checks_unknown, checks_maintenance,
                avg_latency_ms, p50, p95, latency_histogram_json
         FROM monitor_daily_rollups WHERE monitor_id = ?1 AND day_start_at = ?2",
        params![id, day],
        |row| {
            let hist_json: String = row.get(14)?;
            Ok(crate::models::MonitorDailyRollup {
                monitor_id: row.get(0)?,
                day_start_at: row.get(1)?,
                total_sec: row.get(2)?,
                downtime_sec: row.get(3)?,
                unknown_sec: row.get(4)?,
                uptime_sec: row.get(5)?,
                checks_total: row.get(6)?,
                checks_up: row.get(7)?,
                checks_down: row.get(8)?,
                checks_unknown: row.get(9)?,
                checks_maintenance: row.get(10)?,
                avg_latency_ms: row.get(11)?,
                p50: row.get(12)?,
                p95: row.get(13)?,
                latency_histogram: serde_json::from_str(&hist_json).unwrap_or_default(),
            })
        },
    )
    .map(Json)
    .map_err(AppError::from)
}
