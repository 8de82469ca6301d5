//! `GET/PATCH /admin/settings` — operator-tunable knobs layered over the
//! env-derived defaults (spec §6). Grounded in the teacher's
//! `routes/settings.rs` key/value `settings` table pattern, generalized
//! from status-page branding strings to the numeric scheduler/snapshot
//! knobs this spec actually calls out as configurable.

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{get, patch, State};
use serde::{Deserialize, Serialize};

use crate::auth::AdminToken;
use crate::config::Settings;
use crate::db::Db;
use crate::error::{AppError, AppResult};

fn set_override(conn: &rusqlite::Connection, key: &str, value: i64, now: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![key, value.to_string(), now],
    )?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub scheduler_concurrency: usize,
    pub scheduler_lease_secs: i64,
    pub rollup_lease_secs: i64,
    pub snapshot_max_age_secs: i64,
    pub snapshot_refresh_at_secs: i64,
}

impl From<Settings> for SettingsResponse {
    fn from(s: Settings) -> Self {
        SettingsResponse {
            scheduler_concurrency: s.scheduler_concurrency,
            scheduler_lease_secs: s.scheduler_lease_secs,
            rollup_lease_secs: s.rollup_lease_secs,
            snapshot_max_age_secs: s.snapshot_max_age_secs,
            snapshot_refresh_at_secs: s.snapshot_refresh_at_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettings {
    pub scheduler_concurrency: Option<usize>,
    pub scheduler_lease_secs: Option<i64>,
    pub rollup_lease_secs: Option<i64>,
    pub snapshot_max_age_secs: Option<i64>,
    pub snapshot_refresh_at_secs: Option<i64>,
}

/// Current effective settings: env-derived defaults overlaid with any
/// operator overrides persisted via `PATCH`.
#[get("/settings")]
pub fn get_settings(db: &State<Arc<Db>>, base: &State<Settings>, _token: AdminToken) -> Json<SettingsResponse> {
    let effective = base.overlay(&db.conn());
    Json(effective.into())
}

/// Persists operator overrides for the scheduler/rollup lease durations,
/// probe concurrency, and snapshot freshness bounds (spec §6). `ADMIN_TOKEN`
/// and `DATABASE_PATH` are boot-time secrets and are never exposed here.
#[patch("/settings", format = "json", data = "<input>")]
pub fn update_settings(
    input: Json<UpdateSettings>,
    db: &State<Arc<Db>>,
    base: &State<Settings>,
    _token: AdminToken,
) -> AppResult<Json<SettingsResponse>> {
    let now = chrono::Utc::now().timestamp();
    let conn = db.conn();

    if let Some(v) = input.scheduler_concurrency {
        if v == 0 {
            return Err(AppError::InvalidArgument("scheduler_concurrency must be >= 1".into()));
        }
        set_override(&conn, "scheduler_concurrency", v as i64, now).map_err(|e| AppError::Internal(e.to_string()))?;
    }
    if let Some(v) = input.scheduler_lease_secs {
        if v < 1 {
            return Err(AppError::InvalidArgument("scheduler_lease_secs must be >= 1".into()));
        }
        set_override(&conn, "scheduler_lease_secs", v, now).map_err(|e| AppError::Internal(e.to_string()))?;
    }
    if let Some(v) = input.rollup_lease_secs {
        if v < 1 {
            return Err(AppError::InvalidArgument("rollup_lease_secs must be >= 1".into()));
        }
        set_override(&conn, "rollup_lease_secs", v, now).map_err(|e| AppError::Internal(e.to_string()))?;
    }
    if let Some(v) = input.snapshot_max_age_secs {
        if v < 1 {
            return Err(AppError::InvalidArgument("snapshot_max_age_secs must be >= 1".into()));
        }
        set_override(&conn, "snapshot_max_age_secs", v, now).map_err(|e| AppError::Internal(e.to_string()))?;
    }
    if let Some(v) = input.snapshot_refresh_at_secs {
        if v < 0 {
            return Err(AppError::InvalidArgument("snapshot_refresh_at_secs must be >= 0".into()));
        }
        set_override(&conn, "snapshot_refresh_at_secs", v, now).map_err(|e| AppError::Internal(e.to_string()))?;
    }

    let effective = base.overlay(&conn);
    Ok(Json(effective.into()))
}
