//! Manual trigger endpoints. Not part of the distilled spec — added so an
//! operator (or a test) can force a scheduler tick or a specific day's
//! rollup without waiting for the background loop's next firing.

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{post, State};

use crate::auth::AdminToken;
use crate::config::Settings;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::rollup;
use crate::scheduler;
use crate::time_util::day_start;

#[post("/trigger/scheduler-tick")]
pub async fn trigger_scheduler_tick(db: &State<Arc<Db>>, settings: &State<Settings>, _token: AdminToken) -> AppResult<Json<serde_json::Value>> {
    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| AppError::Internal(format!("failed to build webhook client: {e}")))?;
    scheduler::run_tick(db.inner(), settings.inner(), &client).await.map_err(AppError::Internal)?;
    Ok(Json(serde_json::json!({"triggered": "scheduler-tick"})))
}

/// `day` is a unix-seconds timestamp anywhere within the target UTC day;
/// defaults to yesterday (the day the background loop would have just rolled up).
#[post("/trigger/rollup?<day>")]
pub fn trigger_rollup(day: Option<i64>, db: &State<Arc<Db>>, settings: &State<Settings>, _token: AdminToken) -> AppResult<Json<serde_json::Value>> {
    let now = chrono::Utc::now().timestamp();
    let target = day.unwrap_or(now - crate::time_util::SECS_PER_DAY);
    let day_start_at = day_start(target);

    let rows = rollup::run_for_day(db.inner(), settings.inner(), day_start_at).map_err(AppError::Internal)?;
    Ok(Json(serde_json::json!({"triggered": "rollup", "day_start_at": day_start_at, "monitors_rolled_up": rows})))
}
