#[macro_use] extern crate rocket;

pub mod analytics;
pub mod auth;
pub mod catchers;
pub mod config;
pub mod db;
pub mod error;
pub mod histogram;
pub mod intervals;
pub mod locks;
pub mod maintenance;
pub mod models;
pub mod notifications;
pub mod probes;
pub mod rollup;
pub mod routes;
pub mod scheduler;
pub mod snapshot;
pub mod state_machine;
pub mod status_builder;
pub mod time_util;

use std::sync::Arc;

use config::Settings;
use db::Db;

/// Assembles the Rocket instance: routes, catchers, CORS and state, but does
/// not launch background jobs. `main.rs` attaches those via a liftoff fairing
/// since they need a running `Shutdown` handle; tests build on this directly
/// and drive the scheduler/rollup ticks synchronously through their admin
/// trigger endpoints instead.
pub fn build(database: Arc<Db>, settings: Settings) -> rocket::Rocket<rocket::Build> {
    let cors = rocket_cors::CorsOptions::default().to_cors().expect("failed to build CORS fairing");

    rocket::build()
        .manage(database)
        .manage(settings)
        .attach(cors)
        .register("/", catchers![
            catchers::bad_request,
            catchers::unauthorized,
            catchers::forbidden,
            catchers::not_found,
            catchers::unprocessable_entity,
            catchers::too_many_requests,
            catchers::internal_error,
        ])
        .mount("/", routes![routes::health])
        .mount(
            "/public",
            routes![
                routes::public_status,
                routes::public_incidents,
                routes::public_maintenance_windows,
                routes::public_monitor_latency,
                routes::public_monitor_uptime,
                routes::public_analytics_uptime,
                routes::public_monitor_day_context,
            ],
        )
        .mount(
            "/admin",
            routes![
                routes::create_monitor,
                routes::list_monitors,
                routes::get_monitor,
                routes::update_monitor,
                routes::delete_monitor,
                routes::pause_monitor,
                routes::resume_monitor,
                routes::test_monitor,
                routes::create_incident,
                routes::list_incidents,
                routes::create_incident_update,
                routes::resolve_incident,
                routes::delete_incident,
                routes::create_maintenance_window,
                routes::list_maintenance_windows,
                routes::update_maintenance_window,
                routes::delete_maintenance_window,
                routes::create_channel,
                routes::list_channels,
                routes::update_channel,
                routes::delete_channel,
                routes::test_channel,
                routes::admin_overview,
                routes::admin_outages,
                routes::admin_monitor_analytics,
                routes::admin_monitor_outages,
                routes::get_settings,
                routes::update_settings,
                routes::trigger_scheduler_tick,
                routes::trigger_rollup,
            ],
        )
}
