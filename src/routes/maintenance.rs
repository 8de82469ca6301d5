//! Maintenance window CRUD (spec §4.10). A window must span at least
//! one monitor and `starts_at < ends_at`; overlapping windows for the
//! same monitor are allowed (the maintenance-set union just absorbs them).

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};
use rusqlite::params;

use super::require_non_empty;
use crate::auth::AdminToken;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::models::{CreateMaintenanceWindow, MaintenanceWindow, UpdateMaintenanceWindow};

fn fetch_linked_monitor_ids(conn: &rusqlite::Connection, maintenance_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT monitor_id FROM maintenance_monitors WHERE maintenance_id = ?1")?;
    let ids = stmt.query_map(params![maintenance_id], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
    Ok(ids)
}

fn fetch_window(conn: &rusqlite::Connection, id: &str) -> AppResult<MaintenanceWindow> {
    let mut window = conn.query_row(
        "SELECT id, title, message, starts_at, ends_at, created_at FROM maintenance_windows WHERE id = ?1",
        params![id],
        |row| {
            Ok(MaintenanceWindow {
                id: row.get(0)?,
                title: row.get(1)?,
                message: row.get(2)?,
                starts_at: row.get(3)?,
                ends_at: row.get(4)?,
                created_at: row.get(5)?,
                monitor_ids: Vec::new(),
            })
        },
    )?;
    window.monitor_ids = fetch_linked_monitor_ids(conn, id)?;
    Ok(window)
}

#[post("/maintenance-windows", format = "json", data = "<input>")]
pub fn create_maintenance_window(input: Json<CreateMaintenanceWindow>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<(rocket::http::Status, Json<MaintenanceWindow>)> {
    let data = input.into_inner();
    require_non_empty("title", &data.title)?;
    if data.starts_at >= data.ends_at {
        return Err(AppError::InvalidArgument("starts_at must be before ends_at".into()));
    }
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
        "INSERT INTO maintenance_windows (id, title, message, starts_at, ends_at, created_at) VALUES (?1,?2,?3,?4,?5,?6)",
        params![id, data.title, data.message, data.starts_at, data.ends_at, now],
    )?;
    for monitor_id in &data.monitor_ids {
        conn.execute("INSERT INTO maintenance_monitors (maintenance_id, monitor_id) VALUES (?1,?2)", params![id, monitor_id])?;
    }

    Ok((rocket::http::Status::Created, Json(fetch_window(&conn, &id)?)))
}

#[get("/maintenance-windows")]
pub fn list_maintenance_windows(db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<Vec<MaintenanceWindow>>> {
    let conn = db.conn();
    let mut stmt = conn.prepare("SELECT id FROM maintenance_windows ORDER BY starts_at DESC LIMIT 200")?;
    let ids: Vec<String> = stmt.query_map([], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
    let windows = ids.iter().filter_map(|id| fetch_window(&conn, id).ok()).collect();
    Ok(Json(windows))
}

#[delete("/maintenance-windows/<id>")]
pub fn delete_maintenance_window(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn();
    let _ = fetch_window(&conn, id)?;
    conn.execute("DELETE FROM maintenance_windows WHERE id = ?1", params![id])?;
    Ok(Json(serde_json::json!({"id": id, "deleted": true})))
}

#[patch("/maintenance-windows/<id>", format = "json", data = "<input>")]
pub fn update_maintenance_window(id: &str, input: Json<UpdateMaintenanceWindow>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<MaintenanceWindow>> {
    let data = input.into_inner();
    if let Some(title) = &data.title {
        require_non_empty("title", title)?;
    }

    let conn = db.conn();
    let current = fetch_window(&conn, id)?;
    let starts_at = data.starts_at.unwrap_or(current.starts_at);
    let ends_at = data.ends_at.unwrap_or(current.ends_at);
    if starts_at >= ends_at {
        return Err(AppError::InvalidArgument("starts_at must be before ends_at".into()));
    }

    if let Some(monitor_ids) = &data.monitor_ids {
        if monitor_ids.is_empty() {
            return Err(AppError::InvalidArgument("monitor_ids must contain at least one monitor".into()));
        }
        for monitor_id in monitor_ids {
            let exists: bool = conn.query_row("SELECT 1 FROM monitors WHERE id = ?1", params![monitor_id], |_| Ok(true)).unwrap_or(false);
            if !exists {
                return Err(AppError::InvalidArgument(format!("unknown monitor_id: {monitor_id}")));
            }
        }
    }

    conn.execute(
        "UPDATE maintenance_windows SET
            title = COALESCE(?1, title),
            message = COALESCE(?2, message),
            starts_at = ?3,
            ends_at = ?4
         WHERE id = ?5",
        params![data.title, data.message, starts_at, ends_at, id],
    )?;

    if let Some(monitor_ids) = &data.monitor_ids {
        conn.execute("DELETE FROM maintenance_monitors WHERE maintenance_id = ?1", params![id])?;
        for monitor_id in monitor_ids {
            conn.execute("INSERT INTO maintenance_monitors (maintenance_id, monitor_id) VALUES (?1,?2)", params![id, monitor_id])?;
        }
    }

    Ok(Json(fetch_window(&conn, id)?))
}
