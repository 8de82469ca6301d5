//! C2 — probe executors. Each probe runs one HTTP or TCP check under a
//! timeout and produces a `CheckOutcome`. Network/DNS/TLS/timeout errors
//! are data (`down` + a classified `error`), never exceptions.

mod allowlist;
pub mod http;
pub mod tcp;

pub use allowlist::{is_target_allowed, AllowlistError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
    /// Reserved for configuration errors discovered at probe time
    /// (e.g. an invalid HTTP method), not for network failures.
    Unknown,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
            CheckStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub latency_ms: Option<u32>,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub attempts: u32,
}

impl CheckOutcome {
    pub fn config_error(msg: impl Into<String>) -> Self {
        CheckOutcome { status: CheckStatus::Unknown, latency_ms: None, http_status: None, error: Some(msg.into()), attempts: 1 }
    }
}
