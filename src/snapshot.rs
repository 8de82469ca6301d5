//! C8 — snapshot store. A single cached row per logical key, read under
//! a freshness bound and refreshed best-effort by the scheduler and by
//! stale-serving readers.

use rusqlite::{params, OptionalExtension};

use crate::db::Db;
use crate::status_builder::PublicStatusResponse;

const STATUS_KEY: &str = "status";
pub const MAX_AGE_SECS: i64 = 60;
const REFRESH_AT_SECS: i64 = 30;

pub struct Fresh {
    pub payload: PublicStatusResponse,
    pub age: i64,
    pub should_background_refresh: bool,
}

/// Read the cached snapshot; `None` on a cold cache or one older than `max_age_secs`.
pub fn read(db: &Db, now: i64) -> Option<Fresh> {
    read_with_bounds(db, now, MAX_AGE_SECS, REFRESH_AT_SECS)
}

/// Same as [`read`] but with operator-configurable freshness bounds
/// (spec §4.8, `PATCH /admin/settings` overrides).
pub fn read_with_bounds(db: &Db, now: i64, max_age_secs: i64, refresh_at_secs: i64) -> Option<Fresh> {
    let conn = db.conn();
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT generated_at, body_json FROM public_snapshots WHERE key = ?1",
            params![STATUS_KEY],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .ok()
        .flatten();

    let (generated_at, body_json) = row?;
    let age = (now - generated_at).max(0);
    if age > max_age_secs {
        return None;
    }
    let payload: PublicStatusResponse = serde_json::from_str(&body_json).ok()?;
    Some(Fresh { payload, age, should_background_refresh: age >= refresh_at_secs })
}

/// Upsert the cached payload. Failures here are logged by the caller, not propagated.
pub fn write(db: &Db, now: i64, payload: &PublicStatusResponse) -> Result<(), String> {
    let body_json = serde_json::to_string(payload).map_err(|e| e.to_string())?;
    let conn = db.conn();
    conn.execute(
        "INSERT INTO public_snapshots (key, generated_at, body_json, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(key) DO UPDATE SET generated_at = excluded.generated_at, body_json = excluded.body_json, updated_at = excluded.updated_at",
        params![STATUS_KEY, payload.generated_at, body_json, now],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

/// `Cache-Control` header value per spec §4.8: `max-age` bounded so that
/// `max-age + stale-while-revalidate ≤ MAX_AGE_SECS`.
pub fn cache_control(age: i64) -> String {
    cache_control_with_bounds(age, MAX_AGE_SECS, REFRESH_AT_SECS)
}

pub fn cache_control_with_bounds(age: i64, max_age_secs: i64, refresh_at_secs: i64) -> String {
    let max_age = refresh_at_secs.min(max_age_secs - age).max(0);
    let remainder = (max_age_secs - age - max_age).max(0);
    format!("public, max-age={max_age}, stale-while-revalidate={remainder}, stale-if-error={remainder}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_builder::{Banner, StatusCounts};

    fn sample_payload(generated_at: i64) -> PublicStatusResponse {
        PublicStatusResponse {
            generated_at,
            overall_status: "up".into(),
            counts: StatusCounts { up: 1, down: 0, maintenance: 0, paused: 0, unknown: 0 },
            banner: Banner { source: "monitors".into(), status: "operational".into(), down_ratio: None, incident: None },
            monitors: Vec::new(),
            incidents: Vec::new(),
            active_maintenance: Vec::new(),
            upcoming_maintenance: Vec::new(),
        }
    }

    #[test]
    fn read_miss_on_cold_cache() {
        let db = Db::open_in_memory().unwrap();
        assert!(read(&db, 1000).is_none());
    }

    #[test]
    fn write_then_read_round_trips_within_freshness_bound() {
        let db = Db::open_in_memory().unwrap();
        write(&db, 1000, &sample_payload(1000)).unwrap();
        let fresh = read(&db, 1010).unwrap();
        assert_eq!(fresh.age, 10);
        assert!(!fresh.should_background_refresh);
    }

    #[test]
    fn stale_beyond_max_age_reads_as_miss() {
        let db = Db::open_in_memory().unwrap();
        write(&db, 1000, &sample_payload(1000)).unwrap();
        assert!(read(&db, 1000 + MAX_AGE_SECS + 1).is_none());
    }

    #[test]
    fn read_past_refresh_threshold_requests_background_refresh() {
        let db = Db::open_in_memory().unwrap();
        write(&db, 1000, &sample_payload(1000)).unwrap();
        let fresh = read(&db, 1000 + REFRESH_AT_SECS).unwrap();
        assert!(fresh.should_background_refresh);
    }

    #[test]
    fn cache_control_keeps_max_age_plus_swr_within_bound() {
        let header = cache_control(0);
        assert!(header.contains("max-age=30"));
        let header = cache_control(45);
        assert!(header.contains("max-age=15"));
    }

    #[test]
    fn cache_control_matches_spec_scenario_5() {
        // age=5, defaults max_age_secs=60, refresh_at_secs=30 -> max-age=30, swr=stale-if-error=25
        let header = cache_control(5);
        assert_eq!(header, "public, max-age=30, stale-while-revalidate=25, stale-if-error=25");
    }
}
