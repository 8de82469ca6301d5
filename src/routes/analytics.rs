//! Admin-only analytics: account-wide overview and outage history,
//! both keyset-paginated/range-scoped the same way the public analytics
//! endpoints are (spec §4.9), just gated behind the bearer token.

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{get, State};

use crate::analytics::{self, Overview, OutageEntry};
use crate::auth::AdminToken;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::time_util::range_bounds;

#[get("/analytics/overview?<range>")]
pub fn admin_overview(range: Option<&str>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<Overview>> {
    let range = range.unwrap_or("24h");
    let now = chrono::Utc::now().timestamp();
    analytics::overview(db, now, range)
        .map(Json)
        .ok_or_else(|| AppError::InvalidArgument(format!("range must be one of: 24h, 7d, 30d, 90d (got {range})")))
}

#[get("/analytics/outages?<range>&<before_id>&<limit>")]
pub fn admin_outages(
    range: Option<&str>,
    before_id: Option<&str>,
    limit: Option<i64>,
    db: &State<Arc<Db>>,
    _token: AdminToken,
) -> AppResult<Json<Vec<OutageEntry>>> {
    let range = range.unwrap_or("7d");
    let now = chrono::Utc::now().timestamp();
    let (range_start, range_end) = range_bounds(range, now)
        .ok_or_else(|| AppError::InvalidArgument(format!("range must be one of: 24h, 7d, 30d, 90d (got {range})")))?;
    let limit = limit.unwrap_or(50).clamp(1, 200);

    Ok(Json(analytics::list_outages(db, before_id, range_start, range_end, limit)))
}

#[get("/analytics/monitors/<id>?<range>")]
pub fn admin_monitor_analytics(id: &str, range: Option<&str>, db: &State<Arc<Db>>, _token: AdminToken) -> AppResult<Json<analytics::MonitorWindow>> {
    let range = range.unwrap_or("24h");
    let now = chrono::Utc::now().timestamp();
    let window = match range {
        "24h" => analytics::monitor_24h(db, id, now),
        "7d" | "30d" | "90d" => analytics::monitor_from_rollups(db, id, now, range),
        other => return Err(AppError::InvalidArgument(format!("range must be one of: 24h, 7d, 30d, 90d (got {other})"))),
    };
    window.map(Json).ok_or_else(|| AppError::NotFound(format!("no analytics for monitor {id}")))
}

#[get("/analytics/monitors/<id>/outages?<range>&<before_id>&<limit>")]
pub fn admin_monitor_outages(
    id: &str,
    range: Option<&str>,
    before_id: Option<&str>,
    limit: Option<i64>,
    db: &State<Arc<Db>>,
    _token: AdminToken,
) -> AppResult<Json<Vec<OutageEntry>>> {
    let range = range.unwrap_or("7d");
    let now = chrono::Utc::now().timestamp();
    let (range_start, range_end) = range_bounds(range, now)
        .ok_or_else(|| AppError::InvalidArgument(format!("range must be one of: 24h, 7d, 30d, 90d (got {range})")))?;
    let limit = limit.unwrap_or(50).clamp(1, 200);

    Ok(Json(analytics::list_outages_for_monitor(db, Some(id), before_id, range_start, range_end, limit)))
}
