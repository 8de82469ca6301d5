//! Entity shapes (spec §3) and the admin write-API request DTOs.
//! Timestamps are unix seconds throughout.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    Http,
    Tcp,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Tcp => "tcp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(MonitorType::Http),
            "tcp" => Some(MonitorType::Tcp),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Monitor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub target: String,
    pub interval_sec: i64,
    pub timeout_ms: i64,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_headers: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_forbidden_keyword: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateMonitor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub target: String,
    #[serde(default = "default_interval")]
    pub interval_sec: i64,
    #[serde(default = "default_timeout")]
    pub timeout_ms: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub http_method: Option<String>,
    pub http_headers: Option<serde_json::Value>,
    pub http_body: Option<String>,
    pub expected_status: Option<Vec<i64>>,
    pub response_keyword: Option<String>,
    pub response_forbidden_keyword: Option<String>,
}

fn default_interval() -> i64 {
    300
}
fn default_timeout() -> i64 {
    10_000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateMonitor {
    pub name: Option<String>,
    pub target: Option<String>,
    pub interval_sec: Option<i64>,
    pub timeout_ms: Option<i64>,
    pub http_method: Option<String>,
    pub http_headers: Option<serde_json::Value>,
    pub http_body: Option<String>,
    pub expected_status: Option<Vec<i64>>,
    pub response_keyword: Option<String>,
    pub response_forbidden_keyword: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct MonitorState {
    pub monitor_id: String,
    pub status: String,
    pub last_checked_at: Option<i64>,
    pub last_changed_at: Option<i64>,
    pub last_latency_ms: Option<i64>,
    pub last_error: Option<String>,
    pub consecutive_failures: i64,
    pub consecutive_successes: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct CheckResult {
    pub id: String,
    pub monitor_id: String,
    pub checked_at: i64,
    pub status: String,
    pub latency_ms: Option<i64>,
    pub http_status: Option<i64>,
    pub error: Option<String>,
    pub attempt: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct Outage {
    pub id: String,
    pub monitor_id: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub initial_error: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub status: String,
    pub impact: String,
    pub message: Option<String>,
    pub started_at: i64,
    pub resolved_at: Option<i64>,
    pub monitor_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIncident {
    pub title: String,
    #[serde(default = "default_investigating")]
    pub status: String,
    #[serde(default = "default_none_impact")]
    pub impact: String,
    pub message: Option<String>,
    pub monitor_ids: Vec<String>,
}

fn default_investigating() -> String {
    "investigating".into()
}
fn default_none_impact() -> String {
    "none".into()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IncidentUpdate {
    pub id: String,
    pub incident_id: String,
    pub status: Option<String>,
    pub message: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateIncidentUpdate {
    pub status: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct MaintenanceWindow {
    pub id: String,
    pub title: String,
    pub message: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub created_at: i64,
    pub monitor_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMaintenanceWindow {
    pub title: String,
    pub message: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub monitor_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateMaintenanceWindow {
    pub title: Option<String>,
    pub message: Option<String>,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub monitor_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Clone)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub config: serde_json::Value,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationChannel {
    pub name: String,
    pub config: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateNotificationChannel {
    pub name: Option<String>,
    pub config: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_post")]
    pub method: String,
    pub headers: Option<serde_json::Value>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_json")]
    pub payload_type: String,
    pub signing: Option<WebhookSigning>,
}

fn default_post() -> String {
    "POST".into()
}
fn default_webhook_timeout() -> u64 {
    5000
}
fn default_json() -> String {
    "json".into()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebhookSigning {
    pub enabled: bool,
    pub secret_ref: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct NotificationDelivery {
    pub id: String,
    pub event_key: String,
    pub channel_id: String,
    pub status: String,
    pub http_status: Option<i64>,
    pub error: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct MonitorDailyRollup {
    pub monitor_id: String,
    pub day_start_at: i64,
    pub total_sec: i64,
    pub downtime_sec: i64,
    pub unknown_sec: i64,
    pub uptime_sec: i64,
    pub checks_total: i64,
    pub checks_up: i64,
    pub checks_down: i64,
    pub checks_unknown: i64,
    pub checks_maintenance: i64,
    pub avg_latency_ms: Option<f64>,
    pub p50: Option<i64>,
    pub p95: Option<i64>,
    pub latency_histogram: Vec<i64>,
}
