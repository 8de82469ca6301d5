//! C3 — monitor state machine. Pure function: previous state + probe
//! outcome -> next state + outage action + changed flag. No I/O.

use crate::probes::{CheckOutcome, CheckStatus};

/// Flap-dampening thresholds. Spec.md §9 leaves these as global constants
/// (observed to be 1 in the source system); per-monitor configurability
/// is an explicit Open Question resolved as "no" — see DESIGN.md.
pub const FAILURE_THRESHOLD: u32 = 1;
pub const SUCCESS_THRESHOLD: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Up,
    Down,
    Maintenance,
    Paused,
    Unknown,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Maintenance => "maintenance",
            MonitorStatus::Paused => "paused",
            MonitorStatus::Unknown => "unknown",
        }
    }

    /// Closed-domain coercion: any unrecognized stored string becomes `unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "up" => MonitorStatus::Up,
            "down" => MonitorStatus::Down,
            "maintenance" => MonitorStatus::Maintenance,
            "paused" => MonitorStatus::Paused,
            _ => MonitorStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutageAction {
    Open,
    Close,
    Update,
    None,
}

#[derive(Debug, Clone)]
pub struct PrevState {
    pub status: Option<MonitorStatus>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_error: Option<String>,
}

impl Default for PrevState {
    fn default() -> Self {
        PrevState {
            status: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NextState {
    pub status: MonitorStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_error: Option<String>,
    pub changed: bool,
    pub outage_action: OutageAction,
}

/// Advance the state machine by one observation. `checked_at` is accepted
/// for symmetry with the persistence layer (callers stamp `last_changed_at`
/// themselves) but does not affect the pure decision here.
pub fn advance(prev: &PrevState, outcome: &CheckOutcome) -> NextState {
    match outcome.status {
        CheckStatus::Down => {
            let failures = prev.consecutive_failures + 1;
            let was_up_or_fresh = matches!(prev.status, Some(MonitorStatus::Up) | Some(MonitorStatus::Unknown) | None);

            if was_up_or_fresh && failures >= FAILURE_THRESHOLD {
                NextState {
                    status: MonitorStatus::Down,
                    consecutive_failures: failures,
                    consecutive_successes: 0,
                    last_error: outcome.error.clone(),
                    changed: true,
                    outage_action: OutageAction::Open,
                }
            } else if matches!(prev.status, Some(MonitorStatus::Down)) {
                NextState {
                    status: MonitorStatus::Down,
                    consecutive_failures: failures,
                    consecutive_successes: 0,
                    last_error: outcome.error.clone(),
                    changed: false,
                    outage_action: OutageAction::Update,
                }
            } else {
                // Not yet confirmed (failures < threshold) and wasn't already down.
                let status = prev.status.unwrap_or(MonitorStatus::Unknown);
                NextState {
                    status,
                    consecutive_failures: failures,
                    consecutive_successes: 0,
                    last_error: outcome.error.clone(),
                    changed: false,
                    outage_action: OutageAction::None,
                }
            }
        }
        CheckStatus::Up => {
            let successes = prev.consecutive_successes + 1;
            if matches!(prev.status, Some(MonitorStatus::Down)) && successes >= SUCCESS_THRESHOLD {
                NextState {
                    status: MonitorStatus::Up,
                    consecutive_failures: 0,
                    consecutive_successes: successes,
                    last_error: None,
                    changed: true,
                    outage_action: OutageAction::Close,
                }
            } else {
                let changed = prev.status != Some(MonitorStatus::Up);
                NextState {
                    status: MonitorStatus::Up,
                    consecutive_failures: 0,
                    consecutive_successes: successes,
                    last_error: None,
                    changed,
                    outage_action: OutageAction::None,
                }
            }
        }
        CheckStatus::Unknown => {
            let changed = prev.status != Some(MonitorStatus::Unknown);
            NextState {
                status: MonitorStatus::Unknown,
                consecutive_failures: prev.consecutive_failures,
                consecutive_successes: prev.consecutive_successes,
                last_error: prev.last_error.clone(),
                changed,
                outage_action: OutageAction::None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::CheckOutcome;

    fn down(err: &str) -> CheckOutcome {
        CheckOutcome { status: CheckStatus::Down, latency_ms: None, http_status: None, error: Some(err.into()), attempts: 1 }
    }
    fn up(latency: u32) -> CheckOutcome {
        CheckOutcome { status: CheckStatus::Up, latency_ms: Some(latency), http_status: Some(200), error: None, attempts: 1 }
    }

    #[test]
    fn fresh_monitor_down_opens_outage() {
        let prev = PrevState::default();
        let next = advance(&prev, &down("timeout"));
        assert_eq!(next.status, MonitorStatus::Down);
        assert!(next.changed);
        assert_eq!(next.outage_action, OutageAction::Open);
    }

    #[test]
    fn repeated_down_updates_without_reopening() {
        let prev = PrevState { status: Some(MonitorStatus::Down), consecutive_failures: 1, ..Default::default() };
        let next = advance(&prev, &down("still down"));
        assert!(!next.changed);
        assert_eq!(next.outage_action, OutageAction::Update);
    }

    #[test]
    fn down_then_up_closes_outage() {
        let prev = PrevState { status: Some(MonitorStatus::Down), consecutive_failures: 1, ..Default::default() };
        let next = advance(&prev, &up(42));
        assert_eq!(next.status, MonitorStatus::Up);
        assert!(next.changed);
        assert_eq!(next.outage_action, OutageAction::Close);
        assert!(next.last_error.is_none());
    }

    #[test]
    fn up_then_up_is_no_op() {
        let prev = PrevState { status: Some(MonitorStatus::Up), ..Default::default() };
        let next = advance(&prev, &up(10));
        assert!(!next.changed);
        assert_eq!(next.outage_action, OutageAction::None);
    }

    #[test]
    fn unknown_observation_changes_status_without_outage_action() {
        let prev = PrevState { status: Some(MonitorStatus::Up), ..Default::default() };
        let outcome = CheckOutcome { status: CheckStatus::Unknown, latency_ms: None, http_status: None, error: Some("bad config".into()), attempts: 1 };
        let next = advance(&prev, &outcome);
        assert_eq!(next.status, MonitorStatus::Unknown);
        assert!(next.changed);
        assert_eq!(next.outage_action, OutageAction::None);
    }
}
