//! Notification channel CRUD. Only the `webhook` channel type exists
//! today (spec §4.10); `config` is validated by deserializing it as a
//! `WebhookConfig` up front so a bad payload never reaches the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};
use rusqlite::params;

use super::require_non_empty;
use crate::auth::AdminToken;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::models::{CreateNotificationChannel, NotificationChannel, UpdateNotificationChannel, WebhookConfig};

fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<NotificationChannel> {
    let config_json: String = row.get(3)?;
    Ok(NotificationChannel {
        id: row.get(0)?,
        name: row.get(1)?,
        type_: row.get(2)?,
        config: serde_json::from_str(&config_json).unwrap_or(serde_json::Value::Null),
        is_active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

const CHANNEL_COLUMNS: &str = "id, name, type, config, is_active, created_at";

#[post("/notification-channels", format = "json", data = "<input>")]
pub fn create_channel(input: Json<CreateNotificationChannel>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<(rocket::http::Status, Json<NotificationChannel>)> {
    let data = input.into_inner();
    require_non_empty("name", &data.name)?;
    serde_json::from_value::<WebhookConfig>(data.config.clone())
        .map_err(|e| AppError::InvalidArgument(format!("invalid webhook config: {e}")))?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    let config_json = data.config.to_string();

    let conn = db.conn();
    conn.execute(
        "INSERT INTO notification_channels (id, name, type, config, is_active, created_at) VALUES (?1,?2,'webhook',?3,?4,?5)",
        params![id, data.name, config_json, data.is_active as i64, now],
    )?;

    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE id = ?1");
    let channel = conn.query_row(&sql, params![id], row_to_channel)?;
    Ok((rocket::http::Status::Created, Json(channel)))
}

#[get("/notification-channels")]
pub fn list_channels(db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<Vec<NotificationChannel>>> {
    let conn = db.conn();
    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels ORDER BY created_at");
    let mut stmt = conn.prepare(&sql)?;
    let channels: Vec<NotificationChannel> = stmt.query_map([], row_to_channel)?.filter_map(|r| r.ok()).collect();
    Ok(Json(channels))
}

#[delete("/notification-channels/<id>")]
pub fn delete_channel(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn();
    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE id = ?1");
    let _ = conn.query_row(&sql, params![id], row_to_channel)?;
    conn.execute("DELETE FROM notification_channels WHERE id = ?1", params![id])?;
    Ok(Json(serde_json::json!({"id": id, "deleted": true})))
}

#[patch("/notification-channels/<id>", format = "json", data = "<input>")]
pub fn update_channel(id: &str, input: Json<UpdateNotificationChannel>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<NotificationChannel>> {
    let data = input.into_inner();
    if let Some(name) = &data.name {
        require_non_empty("name", name)?;
    }
    if let Some(config) = &data.config {
        serde_json::from_value::<WebhookConfig>(config.clone()).map_err(|e| AppError::InvalidArgument(format!("invalid webhook config: {e}")))?;
    }

    let conn = db.conn();
    conn.execute(
        "UPDATE notification_channels SET
            name = COALESCE(?1, name),
            config = COALESCE(?2, config),
            is_active = COALESCE(?3, is_active)
         WHERE id = ?4",
        params![data.name, data.config.as_ref().map(|v| v.to_string()), data.is_active.map(|b| b as i64), id],
    )?;

    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE id = ?1");
    Ok(Json(conn.query_row(&sql, params![id], row_to_channel)?))
}

/// Sends one real webhook request using the channel's stored config,
/// bypassing the delivery-dedup ledger (spec §6 `.../test`).
#[post("/notification-channels/<id>/test")]
pub async fn test_channel(id: &str, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn();
    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE id = ?1");
    let channel = conn.query_row(&sql, params![id], row_to_channel)?;
    drop(conn);

    let config: WebhookConfig = serde_json::from_value(channel.config)
        .map_err(|e| AppError::Internal(format!("stored channel config is no longer valid: {e}")))?;

    let client = reqwest::Client::builder().build().map_err(|e| AppError::Internal(format!("failed to build webhook client: {e}")))?;
    let method = match config.method.to_uppercase().as_str() {
        "PUT" => reqwest::Method::PUT,
        _ => reqwest::Method::POST,
    };
    let body = serde_json::json!({"event": "test", "channel_id": id}).to_string();

    let result = client
        .request(method, &config.url)
        .timeout(Duration::from_millis(config.timeout_ms))
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await;

    match result {
        Ok(resp) => Ok(Json(serde_json::json!({"ok": resp.status().is_success(), "http_status": resp.status().as_u16()}))),
        Err(e) => Ok(Json(serde_json::json!({"ok": false, "error": e.to_string()}))),
    }
}
