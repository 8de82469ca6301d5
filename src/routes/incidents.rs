//! Incident CRUD. Incidents are independent of probe-derived outages —
//! creating or resolving one never touches `outages`/`monitor_state`
//! (spec §4.10 open-question decision, recorded in DESIGN.md).

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};
use rusqlite::params;

use super::require_non_empty;
use crate::auth::AdminToken;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::models::{CreateIncident, CreateIncidentUpdate, Incident, IncidentUpdate};

fn fetch_linked_monitor_ids(conn: &rusqlite::Connection, incident_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT monitor_id FROM incident_monitors WHERE incident_id = ?1")?;
    let ids = stmt.query_map(params![incident_id], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
    Ok(ids)
}

fn fetch_incident(conn: &rusqlite::Connection, id: &str) -> AppResult<Incident> {
    let mut incident = conn.query_row(
        "SELECT id, title, status, impact, message, started_at, resolved_at FROM incidents WHERE id = ?1",
        params![id],
        |row| {
            Ok(Incident {
                id: row.get(0)?,
                title: row.get(1)?,
                status: row.get(2)?,
                impact: row.get(3)?,
                message: row.get(4)?,
                started_at: row.get(5)?,
                resolved_at: row.get(6)?,
                monitor_ids: Vec::new(),
            })
        },
    )?;
    incident.monitor_ids = fetch_linked_monitor_ids(conn, id)?;
    Ok(incident)
}

#[post("/incidents", format = "json", data = "<input>")]
pub fn create_incident(input: Json<CreateIncident>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<(rocket::http::Status, Json<Incident>)> {
    let data = input.into_inner();
    require_non_empty("title", &data.title)?;
    super::require_one_of("status", &data.status, &["investigating", "identified", "monitoring"])?;
    super::require_one_of("impact", &data.impact, &["none", "minor", "major", "critical"])?;
    if data.monitor_ids.is_empty() {
        return Err(AppError::InvalidArgument("monitor_ids must contain at least one monitor".into()));
    }

    let conn = db.conn();
    for monitor_id in &data.monitor_ids {
        let exists: bool = conn.query_row("SELECT 1 FROM monitors WHERE id = ?1", params![monitor_id], |_| Ok(true)).unwrap_or(false);
        if !exists {
            return Err(AppError::InvalidArgument(format!("unknown monitor_id: {monitor_id}")));
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO incidents (id, title, status, impact, message, started_at, resolved_at) VALUES (?1,?2,?3,?4,?5,?6,NULL)",
        params![id, data.title, data.status, data.impact, data.message, now],
    )?;
    for monitor_id in &data.monitor_ids {
        conn.execute("INSERT INTO incident_monitors (incident_id, monitor_id) VALUES (?1,?2)", params![id, monitor_id])?;
    }

    Ok((rocket::http::Status::Created, Json(fetch_incident(&conn, &id)?)))
}

#[get("/incidents")]
pub fn list_incidents(db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<Vec<Incident>>> {
    let conn = db.conn();
    let mut stmt = conn.prepare("SELECT id FROM incidents ORDER BY started_at DESC LIMIT 200")?;
    let ids: Vec<String> = stmt.query_map([], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
    let incidents = ids.iter().filter_map(|id| fetch_incident(&conn, id).ok()).collect();
    Ok(Json(incidents))
}

#[post("/incidents/<id>/updates", format = "json", data = "<input>")]
pub fn create_incident_update(id: &str, input: Json<CreateIncidentUpdate>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<(rocket::http::Status, Json<IncidentUpdate>)> {
    let data = input.into_inner();
    require_non_empty("message", &data.message)?;
    if let Some(status) = &data.status {
        super::require_one_of("status", status, &["investigating", "identified", "monitoring", "resolved"])?;
    }

    let conn = db.conn();
    let current = fetch_incident(&conn, id)?;

    let update_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO incident_updates (id, incident_id, status, message, created_at) VALUES (?1,?2,?3,?4,?5)",
        params![update_id, id, data.status, data.message, now],
    )?;
    if let Some(status) = &data.status {
        // Resolving is idempotent (R3): `resolved_at` is only set the first time.
        let resolved_at = if status == "resolved" {
            if current.status == "resolved" { current.resolved_at } else { Some(now) }
        } else {
            None
        };
        conn.execute("UPDATE incidents SET status = ?1, resolved_at = ?2 WHERE id = ?3", params![status, resolved_at, id])?;
    }

    Ok((
        rocket::http::Status::Created,
        Json(IncidentUpdate { id: update_id, incident_id: id.to_string(), status: data.status, message: data.message, created_at: now }),
    ))
}

#[patch("/incidents/<id>/resolve")]
pub fn resolve_incident(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<Incident>> {
    let conn = db.conn();
    let current = fetch_incident(&conn, id)?;
    // Idempotent: resolving an already-resolved incident is a no-op, not a conflict.
    if current.status != "resolved" {
        let now = chrono::Utc::now().timestamp();
        conn.execute("UPDATE incidents SET status = 'resolved', resolved_at = ?1 WHERE id = ?2", params![now, id])?;
    }
    Ok(Json(fetch_incident(&conn, id)?))
}

#[delete("/incidents/<id>")]
pub fn delete_incident(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn();
    let _ = fetch_incident(&conn, id)?;
    conn.execute("DELETE FROM incidents WHERE id = ?1", params![id])?;
    Ok(Json(serde_json::json!({"id": id, "deleted": true})))
}
