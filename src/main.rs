#[macro_use] extern crate rocket;

use std::sync::Arc;

use uptime_sentinel::config::Settings;
use uptime_sentinel::db::Db;
use uptime_sentinel::{rollup, scheduler};

#[launch]
fn rocket() -> _ {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env();
    let database = Arc::new(Db::new(&settings.database_path).expect("failed to initialize database"));

    let scheduler_db = database.clone();
    let scheduler_settings = Arc::new(settings.clone());
    let rollup_db = database.clone();
    let rollup_settings = scheduler_settings.clone();

    uptime_sentinel::build(database, settings).attach(rocket::fairing::AdHoc::on_liftoff("Background jobs", move |rocket| {
        Box::pin(async move {
            let shutdown = rocket.shutdown();
            tokio::spawn(scheduler::run(scheduler_db, scheduler_settings, shutdown.clone()));
            tokio::spawn(rollup::run(rollup_db, rollup_settings, shutdown));
        })
    }))
}
