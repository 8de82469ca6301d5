//! C7 — public status builder. Composes the payload served by the
//! public status endpoint: monitors with display status and recent
//! heartbeats, incidents, maintenance windows, and a derived banner.
//!
//! Grounded in the teacher's `routes/status.rs::status_page`, reshaped
//! from a single flat monitor list into the richer payload spec §4.7
//! describes (heartbeats, incidents, maintenance, banner).

use std::collections::HashMap;

use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::Db;
use crate::maintenance;
use crate::time_util::floor_minute;

const HEARTBEAT_LOOKBACK_SEC: i64 = 7 * 86_400;
const HEARTBEAT_LIMIT: i64 = 60;
const STALE_JITTER_FACTOR: i64 = 2;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Heartbeat {
    pub checked_at: i64,
    pub status: String,
    pub latency_ms: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusMonitor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub last_checked_at: Option<i64>,
    pub last_latency_ms: Option<i64>,
    pub is_stale: bool,
    pub heartbeats: Vec<Heartbeat>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusCounts {
    pub up: i64,
    pub down: i64,
    pub maintenance: i64,
    pub paused: i64,
    pub unknown: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BannerIncident {
    pub id: String,
    pub title: String,
    pub impact: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Banner {
    pub source: String, // "incident" | "monitors" | "maintenance"
    pub status: String, // "major_outage" | "partial_outage" | "unknown" | "maintenance" | "operational"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident: Option<BannerIncident>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActiveIncident {
    pub id: String,
    pub title: String,
    pub status: String,
    pub impact: String,
    pub message: Option<String>,
    pub started_at: i64,
    pub monitor_ids: Vec<String>,
    pub updates: Vec<crate::models::IncidentUpdate>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MaintenanceSummary {
    pub id: String,
    pub title: String,
    pub message: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub monitor_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublicStatusResponse {
    pub generated_at: i64,
    pub overall_status: String,
    pub counts: StatusCounts,
    pub banner: Banner,
    pub monitors: Vec<StatusMonitor>,
    pub incidents: Vec<ActiveIncident>,
    pub active_maintenance: Vec<MaintenanceSummary>,
    pub upcoming_maintenance: Vec<MaintenanceSummary>,
}

struct MonitorRow {
    id: String,
    name: String,
    type_: String,
    interval_sec: i64,
    status: Option<String>,
    last_checked_at: Option<i64>,
    last_latency_ms: Option<i64>,
}

pub fn build(db: &Db, now: i64) -> PublicStatusResponse {
    let range_end = floor_minute(now);
    let lookback_start = range_end - HEARTBEAT_LOOKBACK_SEC;

    let conn = db.conn();
    let maintenance_ids = maintenance::active_monitor_ids(&conn, now);

    let monitor_rows = fetch_monitors(&conn);
    let heartbeats = fetch_heartbeats(&conn, lookback_start);

    let mut counts = StatusCounts { up: 0, down: 0, maintenance: 0, paused: 0, unknown: 0 };
    let mut monitors = Vec::with_capacity(monitor_rows.len());

    for row in monitor_rows {
        let stored = row.status.as_deref().unwrap_or("unknown");
        let in_maintenance = maintenance_ids.contains(&row.id);
        let is_stale = if in_maintenance || stored == "paused" || stored == "maintenance" {
            false
        } else {
            row.last_checked_at.map_or(true, |t| now - t > STALE_JITTER_FACTOR * row.interval_sec)
        };

        let display_status = if in_maintenance {
            "maintenance"
        } else if is_stale {
            "unknown"
        } else {
            stored
        };

        match display_status {
            "up" => counts.up += 1,
            "down" => counts.down += 1,
            "maintenance" => counts.maintenance += 1,
            "paused" => counts.paused += 1,
            _ => counts.unknown += 1,
        }

        let mut hb = heartbeats.get(&row.id).cloned().unwrap_or_default();
        hb.sort_by_key(|h| h.checked_at);

        monitors.push(StatusMonitor {
            id: row.id,
            name: row.name,
            type_: row.type_,
            status: display_status.to_string(),
            last_checked_at: row.last_checked_at,
            last_latency_ms: if is_stale { None } else { row.last_latency_ms },
            is_stale,
            heartbeats: hb,
        });
    }

    let overall_status = derive_overall_status(&counts);
    let incidents = fetch_active_incidents(&conn);
    let (active_maintenance, upcoming_maintenance) = fetch_maintenance_windows(&conn, now);
    let banner = derive_banner(&incidents, &counts, &active_maintenance);

    PublicStatusResponse {
        generated_at: now,
        overall_status,
        counts,
        banner,
        monitors,
        incidents,
        active_maintenance,
        upcoming_maintenance,
    }
}

fn fetch_monitors(conn: &rusqlite::Connection) -> Vec<MonitorRow> {
    let mut stmt = match conn.prepare(
        "SELECT m.id, m.name, m.type, m.interval_sec, ms.status, ms.last_checked_at, ms.last_latency_ms
         FROM monitors m
         LEFT JOIN monitor_state ms ON ms.monitor_id = m.id
         WHERE m.is_active = 1
         ORDER BY m.name",
    ) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let rows = stmt.query_map([], |row| {
        Ok(MonitorRow {
            id: row.get(0)?,
            name: row.get(1)?,
            type_: row.get(2)?,
            interval_sec: row.get(3)?,
            status: row.get(4)?,
            last_checked_at: row.get(5)?,
            last_latency_ms: row.get(6)?,
        })
    });
    match rows {
        Ok(mapped) => mapped.filter_map(|r| r.ok()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Latest `HEARTBEAT_LIMIT` checks per monitor within the lookback window,
/// grouped by monitor id (caller sorts into chronological order).
fn fetch_heartbeats(conn: &rusqlite::Connection, lookback_start: i64) -> HashMap<String, Vec<Heartbeat>> {
    let mut stmt = match conn.prepare(
        "SELECT monitor_id, checked_at, status, latency_ms FROM (
            SELECT monitor_id, checked_at, status, latency_ms,
                   ROW_NUMBER() OVER (PARTITION BY monitor_id ORDER BY checked_at DESC) as rn
            FROM check_results
            WHERE checked_at >= ?1
         ) WHERE rn <= ?2",
    ) {
        Ok(s) => s,
        Err(_) => return HashMap::new(),
    };
    let rows = match stmt.query_map(params![lookback_start, HEARTBEAT_LIMIT], |row| {
        let monitor_id: String = row.get(0)?;
        Ok((
            monitor_id,
            Heartbeat { checked_at: row.get(1)?, status: row.get(2)?, latency_ms: row.get(3)? },
        ))
    }) {
        Ok(r) => r,
        Err(_) => return HashMap::new(),
    };

    let mut map: HashMap<String, Vec<Heartbeat>> = HashMap::new();
    for (monitor_id, hb) in rows.filter_map(|r| r.ok()) {
        map.entry(monitor_id).or_default().push(hb);
    }
    map
}

fn derive_overall_status(counts: &StatusCounts) -> String {
    if counts.down > 0 {
        "down".to_string()
    } else if counts.unknown > 0 {
        "unknown".to_string()
    } else if counts.maintenance > 0 {
        "maintenance".to_string()
    } else if counts.up > 0 {
        "up".to_string()
    } else if counts.paused > 0 {
        "paused".to_string()
    } else {
        "unknown".to_string()
    }
}

fn fetch_active_incidents(conn: &rusqlite::Connection) -> Vec<ActiveIncident> {
    let mut stmt = match conn.prepare(
        "SELECT id, title, status, impact, message, started_at
         FROM incidents WHERE resolved_at IS NULL
         ORDER BY started_at DESC LIMIT 5",
    ) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let rows = match stmt.query_map([], |row| {
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
    }) {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    rows.filter_map(|r| r.ok())
        .map(|mut incident| {
            incident.monitor_ids = fetch_linked_ids(conn, "incident_monitors", "incident_id", &incident.id);
            incident.updates = fetch_incident_updates(conn, &incident.id);
            incident
        })
        .collect()
}

fn fetch_incident_updates(conn: &rusqlite::Connection, incident_id: &str) -> Vec<crate::models::IncidentUpdate> {
    let mut stmt = match conn.prepare(
        "SELECT id, incident_id, status, message, created_at FROM incident_updates WHERE incident_id = ?1 ORDER BY created_at ASC",
    ) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let rows = stmt.query_map(params![incident_id], |row| {
        Ok(crate::models::IncidentUpdate {
            id: row.get(0)?,
            incident_id: row.get(1)?,
            status: row.get(2)?,
            message: row.get(3)?,
            created_at: row.get(4)?,
        })
    });
    match rows {
        Ok(mapped) => mapped.filter_map(|r| r.ok()).collect(),
        Err(_) => Vec::new(),
    }
}

fn fetch_linked_ids(conn: &rusqlite::Connection, table: &str, fk_col: &str, id: &str) -> Vec<String> {
    let sql = format!("SELECT monitor_id FROM {table} WHERE {fk_col} = ?1");
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0));
    match rows {
        Ok(mapped) => mapped.filter_map(|r| r.ok()).collect(),
        Err(_) => Vec::new(),
    }
}

fn fetch_maintenance_windows(conn: &rusqlite::Connection, now: i64) -> (Vec<MaintenanceSummary>, Vec<MaintenanceSummary>) {
    let mut active_stmt = match conn.prepare(
        "SELECT id, title, message, starts_at, ends_at FROM maintenance_windows
         WHERE starts_at <= ?1 AND ?1 < ends_at ORDER BY starts_at ASC LIMIT 3",
    ) {
        Ok(s) => s,
        Err(_) => return (Vec::new(), Vec::new()),
    };
    let active = active_stmt
        .query_map(params![now], |row| map_maintenance_row(row))
        .map(|rows| rows.filter_map(|r| r.ok()).collect::<Vec<_>>())
        .unwrap_or_default();

    let mut upcoming_stmt = match conn.prepare(
        "SELECT id, title, message, starts_at, ends_at FROM maintenance_windows
         WHERE starts_at > ?1 ORDER BY starts_at ASC LIMIT 5",
    ) {
        Ok(s) => s,
        Err(_) => return (with_links(conn, active), Vec::new()),
    };
    let upcoming = upcoming_stmt
        .query_map(params![now], |row| map_maintenance_row(row))
        .map(|rows| rows.filter_map(|r| r.ok()).collect::<Vec<_>>())
        .unwrap_or_default();

    (with_links(conn, active), with_links(conn, upcoming))
}

fn map_maintenance_row(row: &rusqlite::Row) -> rusqlite::Result<MaintenanceSummary> {
    Ok(MaintenanceSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        message: row.get(2)?,
        starts_at: row.get(3)?,
        ends_at: row.get(4)?,
        monitor_ids: Vec::new(),
    })
}

fn with_links(conn: &rusqlite::Connection, mut windows: Vec<MaintenanceSummary>) -> Vec<MaintenanceSummary> {
    for w in windows.iter_mut() {
        w.monitor_ids = fetch_linked_ids(conn, "maintenance_monitors", "maintenance_id", &w.id);
    }
    windows
}

fn derive_banner(incidents: &[ActiveIncident], counts: &StatusCounts, active_maintenance: &[MaintenanceSummary]) -> Banner {
    if let Some(top) = incidents.first() {
        let status = incidents
            .iter()
            .map(|i| match i.impact.as_str() {
                "critical" | "major" => 2,
                "minor" => 1,
                _ => 0,
            })
            .max()
            .map(|level| match level {
                2 => "major_outage",
                1 => "partial_outage",
                _ => "operational",
            })
            .unwrap_or("operational");
        return Banner {
            source: "incident".to_string(),
            status: status.to_string(),
            down_ratio: None,
            incident: Some(BannerIncident {
                id: top.id.clone(),
                title: top.title.clone(),
                impact: top.impact.clone(),
                status: top.status.clone(),
            }),
        };
    }

    let total = counts.up + counts.down + counts.maintenance + counts.paused + counts.unknown;
    if counts.down > 0 && total > 0 {
        let ratio = counts.down as f64 / total as f64;
        let status = if ratio >= 0.3 { "major_outage" } else { "partial_outage" };
        return Banner { source: "monitors".to_string(), status: status.to_string(), down_ratio: Some(ratio), incident: None };
    }

    if counts.unknown > 0 {
        return Banner { source: "monitors".to_string(), status: "unknown".to_string(), down_ratio: None, incident: None };
    }

    if !active_maintenance.is_empty() {
        return Banner { source: "maintenance".to_string(), status: "maintenance".to_string(), down_ratio: None, incident: None };
    }

    Banner { source: "monitors".to_string(), status: "operational".to_string(), down_ratio: None, incident: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    fn setup() -> Db {
        let db = Db::open_in_memory().unwrap();
        {
            let conn = db.conn();
            conn.execute(
                "INSERT INTO monitors (id, name, type, target, interval_sec, created_at, updated_at) VALUES ('m1','api','http','t',60,0,0)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO monitor_state (monitor_id, status, last_checked_at, last_latency_ms) VALUES ('m1','up',1000,42)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO check_results (id, monitor_id, checked_at, status, latency_ms, attempt) VALUES ('c1','m1',1000,'up',42,1)",
                [],
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn builds_operational_snapshot_for_healthy_monitor() {
        let db = setup();
        let snapshot = build(&db, 1010);
        assert_eq!(snapshot.overall_status, "up");
        assert_eq!(snapshot.counts.up, 1);
        assert_eq!(snapshot.banner.status, "operational");
        assert_eq!(snapshot.monitors[0].heartbeats.len(), 1);
    }

    #[test]
    fn stale_monitor_is_displayed_as_unknown() {
        let db = setup();
        // last_checked_at=1000, interval=60 -> stale threshold is 120s
        let snapshot = build(&db, 1000 + 121);
        assert_eq!(snapshot.monitors[0].status, "unknown");
        assert!(snapshot.monitors[0].last_latency_ms.is_none());
        assert_eq!(snapshot.overall_status, "unknown");
    }

    #[test]
    fn down_monitor_drives_major_outage_banner_past_ratio_threshold() {
        let db = setup();
        {
            let conn = db.conn();
            conn.execute("UPDATE monitor_state SET status = 'down' WHERE monitor_id = 'm1'", []).unwrap();
        }
        let snapshot = build(&db, 1010);
        assert_eq!(snapshot.banner.source, "monitors");
        assert_eq!(snapshot.banner.status, "major_outage");
    }

    #[test]
    fn active_incident_overrides_monitor_derived_banner() {
        let db = setup();
        {
            let conn = db.conn();
            conn.execute(
                "INSERT INTO incidents (id, title, status, impact, started_at) VALUES ('i1','db latency','investigating','major',900)",
                [],
            )
            .unwrap();
            conn.execute("INSERT INTO incident_monitors (incident_id, monitor_id) VALUES ('i1','m1')", []).unwrap();
        }
        let snapshot = build(&db, 1010);
        assert_eq!(snapshot.banner.source, "incident");
        assert_eq!(snapshot.banner.status, "major_outage");
        assert_eq!(snapshot.incidents.len(), 1);
        assert_eq!(snapshot.incidents[0].monitor_ids, vec!["m1".to_string()]);
    }
}
