//! Admin monitor CRUD + pause/resume. Grounded in the teacher's
//! `routes/monitors.rs`, reshaped to the closed `{http,tcp}` type domain
//! and bearer-token auth of spec §4.10/§6.

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};
use rusqlite::params;

use super::{require_non_empty, require_one_of};
use crate::auth::AdminToken;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::models::{CreateMonitor, Monitor, MonitorType, UpdateMonitor};
use crate::probes::{self, is_target_allowed, CheckOutcome};

fn validate_expected_status(codes: &Option<Vec<i64>>) -> AppResult<()> {
    if let Some(codes) = codes {
        for c in codes {
            if !(100..=599).contains(c) {
                return Err(AppError::InvalidArgument(format!("expected_status entry {c} out of range [100,599]")));
            }
        }
    }
    Ok(())
}

async fn validate_target(monitor_type: MonitorType, target: &str) -> AppResult<()> {
    let (host, port) = match monitor_type {
        MonitorType::Http => {
            let url = reqwest::Url::parse(target).map_err(|e| AppError::InvalidArgument(format!("invalid target url: {e}")))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(AppError::InvalidArgument("target must use http or https".into()));
            }
            let host = url.host_str().ok_or_else(|| AppError::InvalidArgument("target is missing a hostname".into()))?.to_string();
            let port = url.port_or_known_default().unwrap_or(80);
            (host, port)
        }
        MonitorType::Tcp => {
            let (host, port_str) = target.rsplit_once(':').ok_or_else(|| AppError::InvalidArgument("tcp target must be host:port".into()))?;
            let port: u16 = port_str.parse().map_err(|_| AppError::InvalidArgument("invalid tcp port".into()))?;
            (host.trim_start_matches('[').trim_end_matches(']').to_string(), port)
        }
    };
    is_target_allowed(&host, port).await.map_err(|e| AppError::InvalidArgument(e.to_string()))
}

fn row_to_monitor(row: &rusqlite::Row) -> rusqlite::Result<Monitor> {
    let expected_status_json: Option<String> = row.get(9)?;
    Ok(Monitor {
        id: row.get(0)?,
        name: row.get(1)?,
        type_: row.get(2)?,
        target: row.get(3)?,
        interval_sec: row.get(4)?,
        timeout_ms: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        http_method: row.get(7)?,
        http_headers: row.get::<_, Option<String>>(8)?.and_then(|s| serde_json::from_str(&s).ok()),
        http_body: row.get(10)?,
        expected_status: expected_status_json.and_then(|s| serde_json::from_str(&s).ok()),
        response_keyword: row.get(11)?,
        response_forbidden_keyword: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

const MONITOR_COLUMNS: &str = "id, name, type, target, interval_sec, timeout_ms, is_active, http_method, http_headers, expected_status, http_body, response_keyword, response_forbidden_keyword, created_at, updated_at";

fn fetch_monitor(conn: &rusqlite::Connection, id: &str) -> AppResult<Monitor> {
    let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?1");
    conn.query_row(&sql, params![id], row_to_monitor).map_err(AppError::from)
}

#[post("/monitors", format = "json", data = "<input>")]
pub async fn create_monitor(input: Json<CreateMonitor>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<(rocket::http::Status, Json<Monitor>)> {
    let data = input.into_inner();

    require_non_empty("name", &data.name)?;
    require_one_of("type", &data.type_, &["http", "tcp"])?;
    let monitor_type = MonitorType::parse(&data.type_).unwrap();
    require_non_empty("target", &data.target)?;
    if data.interval_sec < 60 {
        return Err(AppError::InvalidArgument("interval_sec must be >= 60".into()));
    }
    if data.timeout_ms < 1000 {
        return Err(AppError::InvalidArgument("timeout_ms must be >= 1000".into()));
    }
    validate_expected_status(&data.expected_status)?;
    validate_target(monitor_type, &data.target).await?;

    if monitor_type == MonitorType::Http {
        let method = data.http_method.as_deref().unwrap_or("GET").to_uppercase();
        require_one_of("http_method", &method, &["GET", "HEAD", "POST"])?;
    } else if data.http_method.is_some()
        || data.http_headers.is_some()
        || data.http_body.is_some()
        || data.expected_status.is_some()
        || data.response_keyword.is_some()
        || data.response_forbidden_keyword.is_some()
    {
        return Err(AppError::InvalidArgument("http_* fields must be absent when type=tcp".into()));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    let headers_json = data.http_headers.as_ref().map(|v| v.to_string());
    let expected_status_json = data.expected_status.as_ref().map(|v| serde_json::to_string(v).unwrap_or_default());

    let conn = db.conn();
    conn.execute(
        "INSERT INTO monitors (id, name, type, target, interval_sec, timeout_ms, is_active, http_method, http_headers, http_body, expected_status, response_keyword, response_forbidden_keyword, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?14)",
        params![
            id, data.name, data.type_, data.target, data.interval_sec, data.timeout_ms, data.is_active as i64,
            data.http_method, headers_json, data.http_body, expected_status_json, data.response_keyword, data.response_forbidden_keyword, now,
        ],
    )?;
    conn.execute("INSERT INTO monitor_state (monitor_id, status) VALUES (?1, 'unknown')", params![id])?;

    Ok((rocket::http::Status::Created, Json(fetch_monitor(&conn, &id)?)))
}

#[get("/monitors")]
pub fn list_monitors(db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<Vec<Monitor>>> {
    let conn = db.conn();
    let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY name");
    let mut stmt = conn.prepare(&sql)?;
    let monitors: Vec<Monitor> = stmt.query_map([], row_to_monitor)?.filter_map(|r| r.ok()).collect();
    Ok(Json(monitors))
}

#[get("/monitors/<id>")]
pub fn get_monitor(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<Monitor>> {
    let conn = db.conn();
    Ok(Json(fetch_monitor(&conn, id)?))
}

#[patch("/monitors/<id>", format = "json", data = "<input>")]
pub async fn update_monitor(id: &str, input: Json<UpdateMonitor>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<Monitor>> {
    let data = input.into_inner();
    validate_expected_status(&data.expected_status)?;
    if let Some(interval) = data.interval_sec {
        if interval < 60 {
            return Err(AppError::InvalidArgument("interval_sec must be >= 60".into()));
        }
    }
    if let Some(timeout) = data.timeout_ms {
        if timeout < 1000 {
            return Err(AppError::InvalidArgument("timeout_ms must be >= 1000".into()));
        }
    }

    let conn = db.conn();
    let current = fetch_monitor(&conn, id)?;
    let monitor_type = MonitorType::parse(&current.type_).unwrap_or(MonitorType::Http);
    if let Some(target) = &data.target {
        validate_target(monitor_type, target).await?;
    }
    if monitor_type == MonitorType::Tcp
        && (data.http_method.is_some()
            || data.http_headers.is_some()
            || data.http_body.is_some()
            || data.expected_status.is_some()
            || data.response_keyword.is_some()
            || data.response_forbidden_keyword.is_some())
    {
        return Err(AppError::InvalidArgument("http_* fields must be absent when type=tcp".into()));
    }

    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "UPDATE monitors SET
            name = COALESCE(?1, name),
            target = COALESCE(?2, target),
            interval_sec = COALESCE(?3, interval_sec),
            timeout_ms = COALESCE(?4, timeout_ms),
            http_method = COALESCE(?5, http_method),
            http_headers = COALESCE(?6, http_headers),
            http_body = COALESCE(?7, http_body),
            expected_status = COALESCE(?8, expected_status),
            response_keyword = COALESCE(?9, response_keyword),
            response_forbidden_keyword = COALESCE(?10, response_forbidden_keyword),
            updated_at = ?11
         WHERE id = ?12",
        params![
            data.name,
            data.target,
            data.interval_sec,
            data.timeout_ms,
            data.http_method,
            data.http_headers.as_ref().map(|v| v.to_string()),
            data.http_body,
            data.expected_status.as_ref().map(|v| serde_json::to_string(v).unwrap_or_default()),
            data.response_keyword,
            data.response_forbidden_keyword,
            now,
            id,
        ],
    )?;

    Ok(Json(fetch_monitor(&conn, id)?))
}

#[delete("/monitors/<id>")]
pub fn delete_monitor(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn();
    let _ = fetch_monitor(&conn, id)?;

    // Cascades via ON DELETE CASCADE for state/checks/outages/rollups/links;
    // incidents and maintenance windows keep their monitor_id as an orphan
    // reference (spec §4.10 deletion contract).
    conn.execute("DELETE FROM monitors WHERE id = ?1", params![id])?;

    Ok(Json(serde_json::json!({"id": id, "deleted": true})))
}

#[post("/monitors/<id>/pause")]
pub fn pause_monitor(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn();
    let _ = fetch_monitor(&conn, id)?;
    conn.execute(
        "INSERT INTO monitor_state (monitor_id, status) VALUES (?1, 'paused')
         ON CONFLICT(monitor_id) DO UPDATE SET status = 'paused'",
        params![id],
    )?;
    Ok(Json(serde_json::json!({"id": id, "status": "paused"})))
}

#[post("/monitors/<id>/resume")]
pub fn resume_monitor(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn();
    let _ = fetch_monitor(&conn, id)?;
    // Resuming does not implicitly close an ongoing outage (spec §4.10);
    // the next tick re-evaluates status from a fresh probe.
    conn.execute(
        "INSERT INTO monitor_state (monitor_id, status) VALUES (?1, 'unknown')
         ON CONFLICT(monitor_id) DO UPDATE SET status = 'unknown' WHERE monitor_state.status = 'paused'",
        params![id],
    )?;
    Ok(Json(serde_json::json!({"id": id, "status": "resumed"})))
}

/// Ad-hoc probe dry-run: runs the configured check once and reports the
/// outcome without touching `check_results`/`monitor_state`/outages.
#[post("/monitors/<id>/test")]
pub async fn test_monitor(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<CheckOutcome>> {
    let monitor = fetch_monitor(&db.conn(), id)?;
    let monitor_type = MonitorType::parse(&monitor.type_).unwrap_or(MonitorType::Http);
    let expected_status: Option<Vec<u16>> = monitor.expected_status.as_ref().map(|codes| codes.iter().map(|c| *c as u16).collect());

    let outcome = match monitor_type {
        MonitorType::Http => {
            let input = probes::http::HttpProbeInput {
                url: &monitor.target,
                method: monitor.http_method.as_deref().unwrap_or("GET"),
                headers: monitor.http_headers.as_ref(),
                body: monitor.http_body.as_deref(),
                timeout_ms: monitor.timeout_ms as u32,
                expected_status: expected_status.as_deref(),
                response_keyword: monitor.response_keyword.as_deref(),
                response_forbidden_keyword: monitor.response_forbidden_keyword.as_deref(),
            };
            probes::http::execute(input).await
        }
        MonitorType::Tcp => probes::tcp::execute(&monitor.target, monitor.timeout_ms as u32).await,
    };

    Ok(Json(outcome))
}
