//! C4 — scheduler. A leased, concurrency-bounded per-minute tick: select
//! due monitors, run probes, advance state, persist atomically, fan out
//! notifications on observable transitions, then refresh the public
//! snapshot.
//!
//! Grounded in the teacher's `checker.rs::run_checker` loop, reshaped
//! from "one monitor per loop iteration" into a leased batch tick with
//! bounded concurrency (spec §4.4, §5).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use rusqlite::params;

use crate::config::Settings;
use crate::db::Db;
use crate::maintenance;
use crate::models::MonitorType;
use crate::notifications::{self, ActiveChannel, EventMonitor, EventPayload, EventState};
use crate::probes::{self, CheckOutcome, CheckStatus};
use crate::snapshot;
use crate::state_machine::{self, MonitorStatus, NextState, OutageAction, PrevState};
use crate::status_builder;
use crate::time_util::floor_minute;

const LOCK_NAME: &str = "scheduler:tick";

struct DueMonitor {
    id: String,
    name: String,
    type_: MonitorType,
    target: String,
    timeout_ms: u32,
    http_method: Option<String>,
    http_headers: Option<serde_json::Value>,
    http_body: Option<String>,
    expected_status: Option<Vec<u16>>,
    response_keyword: Option<String>,
    response_forbidden_keyword: Option<String>,
    prev_status: Option<MonitorStatus>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    prev_last_error: Option<String>,
}

/// Background scheduler loop, spawned once from the Rocket liftoff fairing.
pub async fn run(db: Arc<Db>, settings: Arc<Settings>, shutdown: rocket::Shutdown) {
    println!("\u{1f50d} scheduler: starting");
    let notif_client = match reqwest::Client::builder().build() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("\u{274c} scheduler: failed to build webhook client: {e}");
            return;
        }
    };

    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.clone() => {
                println!("\u{1f50d} scheduler: shutting down");
                return;
            }
        }

        if let Err(e) = run_tick(&db, &settings, &notif_client).await {
            eprintln!("\u{274c} scheduler: tick failed: {e}");
        }
    }
}

/// Run one tick immediately. Used by the background loop and by the
/// manual `/admin/trigger/scheduler-tick` endpoint (spec §9 addition).
pub async fn run_tick(db: &Arc<Db>, settings: &Settings, notif_client: &reqwest::Client) -> Result<(), String> {
    let now = chrono::Utc::now().timestamp();
    let checked_at = floor_minute(now);
    let settings = settings.overlay(&db.conn());
    let settings = &settings;

    {
        let conn = db.conn();
        if !crate::locks::try_acquire(&conn, LOCK_NAME, now, settings.scheduler_lease_secs) {
            return Ok(()); // another instance/tick holds the lease
        }
    }

    let due = select_due_monitors(db, checked_at);
    if due.is_empty() {
        refresh_snapshot_best_effort(db, settings, now).await;
        return Ok(());
    }

    let maintenance_set: HashSet<String> = {
        let conn = db.conn();
        maintenance::active_monitor_ids(&conn, now)
    };
    let channels = notifications::active_channels(db);

    let concurrency = settings.scheduler_concurrency.max(1);
    stream::iter(due.into_iter())
        .for_each_concurrent(concurrency, |monitor| {
            let db = db.clone();
            let channels = &channels;
            let maintenance_set = &maintenance_set;
            let notif_client = notif_client.clone();
            async move {
                process_one(&db, &monitor, checked_at, maintenance_set, channels, &notif_client).await;
            }
        })
        .await;

    refresh_snapshot_best_effort(db, settings, now).await;
    Ok(())
}

fn select_due_monitors(db: &Db, checked_at: i64) -> Vec<DueMonitor> {
    let conn = db.conn();
    let mut stmt = match conn.prepare(
        "SELECT m.id, m.name, m.type, m.target, m.timeout_ms, m.http_method, m.http_headers, m.http_body,
                m.expected_status, m.response_keyword, m.response_forbidden_keyword,
                ms.status, ms.consecutive_failures, ms.consecutive_successes, ms.last_error
         FROM monitors m
         LEFT JOIN monitor_state ms ON ms.monitor_id = m.id
         WHERE m.is_active = 1
           AND (ms.status IS NULL OR ms.status != 'paused')
           AND (ms.last_checked_at IS NULL OR ms.last_checked_at <= ?1 - m.interval_sec)",
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("\u{274c} scheduler: failed to prepare selection query: {e}");
            return Vec::new();
        }
    };

    let rows = stmt.query_map(params![checked_at], |row| {
        let type_str: String = row.get(2)?;
        let expected_status_json: Option<String> = row.get(8)?;
        let prev_status_str: Option<String> = row.get(11)?;
        Ok(DueMonitor {
            id: row.get(0)?,
            name: row.get(1)?,
            type_: MonitorType::parse(&type_str).unwrap_or(MonitorType::Http),
            target: row.get(3)?,
            timeout_ms: row.get::<_, i64>(4)? as u32,
            http_method: row.get(5)?,
            http_headers: row
                .get::<_, Option<String>>(6)?
                .and_then(|s| serde_json::from_str(&s).ok()),
            http_body: row.get(7)?,
            expected_status: expected_status_json.and_then(|s| serde_json::from_str(&s).ok()),
            response_keyword: row.get(9)?,
            response_forbidden_keyword: row.get(10)?,
            prev_status: prev_status_str.map(|s| MonitorStatus::parse(&s)),
            consecutive_failures: row.get::<_, i64>(12).unwrap_or(0) as u32,
            consecutive_successes: row.get::<_, i64>(13).unwrap_or(0) as u32,
            prev_last_error: row.get(14)?,
        })
    });

    match rows {
        Ok(mapped) => mapped.filter_map(|r| r.ok()).collect(),
        Err(e) => {
            eprintln!("\u{274c} scheduler: failed to select due monitors: {e}");
            Vec::new()
        }
    }
}

async fn run_probe(monitor: &DueMonitor) -> CheckOutcome {
    match monitor.type_ {
        MonitorType::Http => {
            let input = probes::http::HttpProbeInput {
                url: &monitor.target,
                method: monitor.http_method.as_deref().unwrap_or("GET"),
                headers: monitor.http_headers.as_ref(),
                body: monitor.http_body.as_deref(),
                timeout_ms: monitor.timeout_ms,
                expected_status: monitor.expected_status.as_deref(),
                response_keyword: monitor.response_keyword.as_deref(),
                response_forbidden_keyword: monitor.response_forbidden_keyword.as_deref(),
            };
            probes::http::execute(input).await
        }
        MonitorType::Tcp => probes::tcp::execute(&monitor.target, monitor.timeout_ms).await,
    }
}

async fn process_one(
    db: &Arc<Db>,
    monitor: &DueMonitor,
    checked_at: i64,
    maintenance_set: &HashSet<String>,
    channels: &[ActiveChannel],
    notif_client: &reqwest::Client,
) {
    println!("\u{1f50d} checking {} ({})", monitor.name, monitor.target);
    let outcome = run_probe(monitor).await;

    let prev = PrevState {
        status: monitor.prev_status,
        consecutive_failures: monitor.consecutive_failures,
        consecutive_successes: monitor.consecutive_successes,
        last_error: monitor.prev_last_error.clone(),
    };
    let next = state_machine::advance(&prev, &outcome);

    let in_maintenance = maintenance_set.contains(&monitor.id);

    let event = match persist_batch(db, monitor, checked_at, &outcome, &next) {
        Ok(event) => event,
        Err(e) => {
            eprintln!("\u{274c} scheduler: persistence failed for {}: {e}", monitor.id);
            return;
        }
    };

    if let Some(event_type) = event {
        if in_maintenance {
            return; // outage row is still opened above; notifications are suppressed
        }
        let event_key = format!("monitor:{}:{}:{}", monitor.id, event_type, checked_at);
        let payload = EventPayload {
            event: format!("monitor.{event_type}"),
            event_id: event_key.clone(),
            timestamp: checked_at,
            monitor: EventMonitor {
                id: monitor.id.clone(),
                name: monitor.name.clone(),
                type_: monitor.type_.as_str().to_string(),
                target: monitor.target.clone(),
            },
            state: EventState {
                status: next.status.as_str().to_string(),
                latency_ms: outcome.latency_ms.map(|v| v as i64),
                http_status: outcome.http_status.map(|v| v as i64),
                error: outcome.error.clone(),
                location: None,
            },
        };
        notifications::dispatch(db.clone(), notif_client, &event_key, channels, &payload).await;
    }
}

/// Persist the check result, state upsert and outage action as one
/// transaction (spec §4.4.1). Returns the event name (`"down"`/`"up"`) if
/// this batch produced a notification-worthy transition.
fn persist_batch(
    db: &Db,
    monitor: &DueMonitor,
    checked_at: i64,
    outcome: &CheckOutcome,
    next: &NextState,
) -> Result<Option<&'static str>, String> {
    let mut conn = db.conn();
    let tx = conn.transaction().map_err(|e| e.to_string())?;

    let check_id = uuid::Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO check_results (id, monitor_id, checked_at, status, latency_ms, http_status, error, attempt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            check_id,
            monitor.id,
            checked_at,
            outcome.status.as_str(),
            outcome.latency_ms,
            outcome.http_status,
            outcome.error,
            outcome.attempts,
        ],
    )
    .map_err(|e| e.to_string())?;

    let last_changed_at = if next.changed { Some(checked_at) } else { None };
    tx.execute(
        "INSERT INTO monitor_state (monitor_id, status, last_checked_at, last_changed_at, last_latency_ms, last_error, consecutive_failures, consecutive_successes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(monitor_id) DO UPDATE SET
            status = excluded.status,
            last_checked_at = excluded.last_checked_at,
            last_changed_at = COALESCE(excluded.last_changed_at, monitor_state.last_changed_at),
            last_latency_ms = excluded.last_latency_ms,
            last_error = excluded.last_error,
            consecutive_failures = excluded.consecutive_failures,
            consecutive_successes = excluded.consecutive_successes",
        params![
            monitor.id,
            next.status.as_str(),
            checked_at,
            last_changed_at,
            outcome.latency_ms,
            next.last_error,
            next.consecutive_failures,
            next.consecutive_successes,
        ],
    )
    .map_err(|e| e.to_string())?;

    match next.outage_action {
        OutageAction::Open => {
            let id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO outages (id, monitor_id, started_at, initial_error, last_error)
                 SELECT ?1, ?2, ?3, ?4, ?4
                 WHERE NOT EXISTS (SELECT 1 FROM outages WHERE monitor_id = ?2 AND ended_at IS NULL)",
                params![id, monitor.id, checked_at, outcome.error],
            )
            .map_err(|e| e.to_string())?;
        }
        OutageAction::Close => {
            tx.execute(
                "UPDATE outages SET ended_at = ?1 WHERE monitor_id = ?2 AND ended_at IS NULL",
                params![checked_at, monitor.id],
            )
            .map_err(|e| e.to_string())?;
        }
        OutageAction::Update => {
            tx.execute(
                "UPDATE outages SET last_error = ?1 WHERE monitor_id = ?2 AND ended_at IS NULL",
                params![outcome.error, monitor.id],
            )
            .map_err(|e| e.to_string())?;
        }
        OutageAction::None => {}
    }

    tx.commit().map_err(|e| e.to_string())?;

    if !next.changed {
        return Ok(None);
    }
    let event = match (monitor.prev_status, next.status) {
        (prev, MonitorStatus::Down) if prev != Some(MonitorStatus::Down) => Some("down"),
        (Some(MonitorStatus::Down), MonitorStatus::Up) => Some("up"),
        _ => None,
    };
    Ok(event)
}

async fn refresh_snapshot_best_effort(db: &Db, settings: &Settings, now: i64) {
    let _ = settings;
    let payload = status_builder::build(db, now);
    if let Err(e) = snapshot::write(db, now, &payload) {
        eprintln!("\u{274c} scheduler: snapshot write failed: {e}");
    }
}
