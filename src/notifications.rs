//! C5 — notification dispatch. Fans a transition event out to every
//! active webhook channel with at-most-once delivery, enforced by the
//! unique `(event_key, channel_id)` index (spec §4.5, invariant I6).
//!
//! Grounded in the teacher's `notifications.rs::fire_webhooks`,
//! generalized with the placeholder-insert dedup pattern and HMAC
//! signing.

use hmac::{Hmac, Mac};
use rusqlite::params;
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

use crate::db::Db;
use crate::models::WebhookConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Clone)]
pub struct EventPayload {
    pub event: String,
    pub event_id: String,
    pub timestamp: i64,
    pub monitor: EventMonitor,
    pub state: EventState,
}

#[derive(Debug, Serialize, Clone)]
pub struct EventMonitor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub target: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct EventState {
    pub status: String,
    pub latency_ms: Option<i64>,
    pub http_status: Option<i64>,
    pub error: Option<String>,
    /// Always null today (spec §9 open question) — kept for forward compatibility.
    pub location: Option<String>,
}

pub struct ActiveChannel {
    pub id: String,
    pub config: WebhookConfig,
}

/// Fetch active webhook channels and parse their config once (spec §4.4
/// step 5), skipping malformed config rather than failing the whole tick.
pub fn active_channels(db: &Db) -> Vec<ActiveChannel> {
    let conn = db.conn();
    let mut stmt = match conn.prepare("SELECT id, config FROM notification_channels WHERE is_active = 1") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let rows = match stmt.query_map([], |row| {
        let id: String = row.get(0)?;
        let config_json: String = row.get(1)?;
        Ok((id, config_json))
    }) {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    rows.filter_map(|r| r.ok())
        .filter_map(|(id, config_json)| {
            serde_json::from_str::<WebhookConfig>(&config_json)
                .ok()
                .map(|config| ActiveChannel { id, config })
        })
        .collect()
}

/// Dispatch `payload` to every channel, deduplicated per `event_key`.
/// Runs outside the scheduler's persistence lock; individual failures
/// never propagate (spec §7).
pub async fn dispatch(db: Arc<Db>, client: &reqwest::Client, event_key: &str, channels: &[ActiveChannel], payload: &EventPayload) {
    for channel in channels {
        if !reserve_delivery(&db, event_key, &channel.id) {
            continue; // already attempted by a prior/racing tick
        }

        let body = serde_json::to_vec(payload).unwrap_or_default();
        let method = match channel.config.method.to_uppercase().as_str() {
            "PUT" => reqwest::Method::PUT,
            _ => reqwest::Method::POST,
        };

        let mut req = client
            .request(method, &channel.config.url)
            .timeout(Duration::from_millis(channel.config.timeout_ms))
            .header("Content-Type", "application/json")
            .body(body.clone());

        if let Some(headers) = &channel.config.headers {
            if let Some(obj) = headers.as_object() {
                for (k, v) in obj {
                    if let Some(val) = v.as_str() {
                        req = req.header(k.as_str(), val);
                    }
                }
            }
        }

        if let Some(signing) = &channel.config.signing {
            if signing.enabled {
                if let Some(sig) = sign_body(&signing.secret_ref, &body) {
                    req = req.header("X-Signature", format!("sha256={sig}"));
                }
            }
        }

        let (status, http_status, error) = match req.send().await {
            Ok(resp) => {
                let code = resp.status().as_u16() as i64;
                if resp.status().is_success() {
                    ("success", Some(code), None)
                } else {
                    ("failed", Some(code), Some(format!("status {code}")))
                }
            }
            Err(e) => ("failed", None, Some(e.to_string())),
        };

        finalize_delivery(&db, event_key, &channel.id, status, http_status, error.as_deref());
    }
}

/// Insert a placeholder row; returns `true` iff this call won the race and
/// should proceed to dispatch the webhook.
fn reserve_delivery(db: &Db, event_key: &str, channel_id: &str) -> bool {
    let conn = db.conn();
    let now = chrono::Utc::now().timestamp();
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT OR IGNORE INTO notification_deliveries (id, event_key, channel_id, status, created_at) VALUES (?1, ?2, ?3, 'pending', ?4)",
        params![id, event_key, channel_id, now],
    )
    .map(|changed| changed == 1)
    .unwrap_or(false)
}

fn finalize_delivery(db: &Db, event_key: &str, channel_id: &str, status: &str, http_status: Option<i64>, error: Option<&str>) {
    let conn = db.conn();
    let _ = conn.execute(
        "UPDATE notification_deliveries SET status = ?1, http_status = ?2, error = ?3 WHERE event_key = ?4 AND channel_id = ?5",
        params![status, http_status, error, event_key, channel_id],
    );
}

fn sign_body(secret_ref: &str, body: &[u8]) -> Option<String> {
    // Secrets referenced by `secret_ref` are fetched from a host-provided
    // secret store (spec §6); modeled here as an environment variable
    // lookup since this crate doesn't own a secret manager.
    let secret = std::env::var(secret_ref).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_delivery_wins_once_then_skips() {
        let db = Db::open_in_memory().unwrap();
        {
            let conn = db.conn();
            conn.execute(
                "INSERT INTO notification_channels (id, name, type, config, is_active, created_at) VALUES ('c1','c','webhook','{}',1,0)",
                [],
            )
            .unwrap();
        }
        assert!(reserve_delivery(&db, "monitor:1:down:60", "c1"));
        assert!(!reserve_delivery(&db, "monitor:1:down:60", "c1"));
    }

    #[test]
    fn sign_body_requires_secret_present() {
        assert!(sign_body("DOES_NOT_EXIST_ENV_VAR_XYZ", b"payload").is_none());
    }
}
