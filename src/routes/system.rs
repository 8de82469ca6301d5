use rocket::get;
use rocket::serde::json::Json;

#[get("/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "uptime-sentinel",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
