// Route modules — one per API domain, mirroring the teacher's layout.

mod analytics;
mod channels;
mod incidents;
mod maintenance;
mod monitors;
mod public;
mod settings;
mod system;
mod trigger;

pub use analytics::{admin_monitor_analytics, admin_monitor_outages, admin_outages, admin_overview};
pub use channels::{create_channel, delete_channel, list_channels, test_channel, update_channel};
pub use incidents::{create_incident, create_incident_update, delete_incident, list_incidents, resolve_incident};
pub use maintenance::{create_maintenance_window, delete_maintenance_window, list_maintenance_windows, update_maintenance_window};
pub use monitors::{create_monitor, delete_monitor, get_monitor, list_monitors, pause_monitor, resume_monitor, test_monitor, update_monitor};
pub use public::{
    public_analytics_uptime, public_incidents, public_maintenance_windows,
    public_monitor_day_context, public_monitor_latency, public_monitor_uptime, public_status,
};
pub use settings::{get_settings, update_settings};
pub use system::health;
pub use trigger::{trigger_rollup, trigger_scheduler_tick};

use crate::error::{AppError, AppResult};

/// Validate a closed-domain string field, coercing an empty allow-list
/// check into a uniform `INVALID_ARGUMENT`.
pub fn require_one_of(field: &str, value: &str, allowed: &[&str]) -> AppResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(AppError::InvalidArgument(format!("{field} must be one of: {}", allowed.join(", "))))
    }
}

pub fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        Err(AppError::InvalidArgument(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}
