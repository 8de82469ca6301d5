use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use std::sync::Arc;

use uptime_sentinel::config::Settings;
use uptime_sentinel::db::Db;

const ADMIN_TOKEN: &str = "test_admin_token_0123456789";

fn test_client() -> Client {
    let db_path = format!("/tmp/uptime_sentinel_test_{}.db", uuid::Uuid::new_v4());
    let database = Arc::new(Db::new(&db_path).expect("DB init failed"));
    let settings = Settings {
        database_path: db_path,
        admin_token: ADMIN_TOKEN.into(),
        scheduler_concurrency: 5,
        scheduler_lease_secs: 55,
        rollup_lease_secs: 600,
        snapshot_max_age_secs: 60,
        snapshot_refresh_at_secs: 30,
    };
    let rocket = uptime_sentinel::build(database, settings);
    Client::tracked(rocket).expect("valid rocket instance")
}

fn auth(req: rocket::local::blocking::LocalRequest<'_>) -> rocket::local::blocking::LocalRequest<'_> {
    req.header(Header::new("Authorization", format!("Bearer {ADMIN_TOKEN}")))
}

fn create_http_monitor(client: &Client, name: &str, target: &str) -> serde_json::Value {
    let body = serde_json::json!({
        "name": name,
        "type": "http",
        "target": target,
        "interval_sec": 60,
        "timeout_ms": 5000,
    });
    let resp = auth(client.post("/admin/monitors"))
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch();
    assert_eq!(resp.status(), Status::Created);
    resp.into_json().unwrap()
}

#[test]
fn test_health() {
    let client = test_client();
    let resp = client.get("/health").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body: serde_json::Value = resp.into_json().unwrap();
    assert_eq!(body["service"], "uptime-sentinel");
    assert_eq!(body["status"], "ok");
}

#[test]
fn test_admin_routes_require_bearer_token() {
    let client = test_client();
    let resp = client.get("/admin/monitors").dispatch();
    assert_eq!(resp.status(), Status::Unauthorized);

    let resp = client
        .get("/admin/monitors")
        .header(Header::new("Authorization", "Bearer wrong-token"))
        .dispatch();
    assert_eq!(resp.status(), Status::Unauthorized);
}

#[test]
fn test_create_http_monitor() {
    let client = test_client();
    let body = create_http_monitor(&client, "Example homepage", "https://example.com/");
    assert_eq!(body["name"], "Example homepage");
    assert_eq!(body["type"], "http");
    assert_eq!(body["http_method"], "GET");
    assert!(body["http_headers"].is_null());
}

#[test]
fn test_create_monitor_validation_rejections() {
    let client = test_client();

    // empty name
    let resp = auth(client.post("/admin/monitors"))
        .header(ContentType::JSON)
        .body(r#"{"name": "", "type": "http", "target": "https://example.com"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    // unknown type
    let resp = auth(client.post("/admin/monitors"))
        .header(ContentType::JSON)
        .body(r#"{"name": "x", "type": "ping", "target": "https://example.com"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    // interval below minimum
    let resp = auth(client.post("/admin/monitors"))
        .header(ContentType::JSON)
        .body(r#"{"name": "x", "type": "http", "target": "https://example.com", "interval_sec": 10}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    // private-network target blocked by the SSRF allow-list
    let resp = auth(client.post("/admin/monitors"))
        .header(ContentType::JSON)
        .body(r#"{"name": "x", "type": "http", "target": "http://10.0.0.5/"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    // http_* field set on a tcp monitor
    let resp = auth(client.post("/admin/monitors"))
        .header(ContentType::JSON)
        .body(r#"{"name": "x", "type": "tcp", "target": "example.com:443", "http_method": "POST"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
}

#[test]
fn test_monitor_crud_lifecycle() {
    let client = test_client();
    let monitor = create_http_monitor(&client, "API", "https://example.com/health");
    let id = monitor["id"].as_str().unwrap();

    let resp = auth(client.get(format!("/admin/monitors/{id}"))).dispatch();
    assert_eq!(resp.status(), Status::Ok);

    let resp = auth(client.patch(format!("/admin/monitors/{id}")))
        .header(ContentType::JSON)
        .body(r#"{"name": "API v2"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let updated: serde_json::Value = resp.into_json().unwrap();
    assert_eq!(updated["name"], "API v2");

    let resp = auth(client.post(format!("/admin/monitors/{id}/pause"))).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let resp = auth(client.post(format!("/admin/monitors/{id}/resume"))).dispatch();
    assert_eq!(resp.status(), Status::Ok);

    let resp = auth(client.delete(format!("/admin/monitors/{id}"))).dispatch();
    assert_eq!(resp.status(), Status::Ok);

    let resp = auth(client.get(format!("/admin/monitors/{id}"))).dispatch();
    assert_eq!(resp.status(), Status::NotFound);
}

#[test]
fn test_incident_lifecycle_and_idempotent_resolution() {
    let client = test_client();
    let monitor = create_http_monitor(&client, "Checkout", "https://example.com/checkout");
    let monitor_id = monitor["id"].as_str().unwrap().to_string();

    let resp = auth(client.post("/admin/incidents"))
        .header(ContentType::JSON)
        .body(serde_json::json!({
            "title": "Checkout degraded",
            "impact": "major",
            "monitor_ids": [monitor_id],
        }).to_string())
        .dispatch();
    assert_eq!(resp.status(), Status::Created);
    let incident: serde_json::Value = resp.into_json().unwrap();
    let incident_id = incident["id"].as_str().unwrap().to_string();
    assert!(incident["resolved_at"].is_null());

    // First resolving update sets resolved_at.
    let resp = auth(client.post(format!("/admin/incidents/{incident_id}/updates")))
        .header(ContentType::JSON)
        .body(r#"{"status": "resolved", "message": "Fixed the bad deploy"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Created);

    let resp = auth(client.get("/admin/incidents")).dispatch();
    let incidents: Vec<serde_json::Value> = resp.into_json().unwrap();
    let found = incidents.iter().find(|i| i["id"] == incident_id).unwrap();
    let first_resolved_at = found["resolved_at"].as_i64().unwrap();

    // A second "resolved" update must not bump resolved_at (R3).
    std::thread::sleep(std::time::Duration::from_secs(1));
    let resp = auth(client.post(format!("/admin/incidents/{incident_id}/updates")))
        .header(ContentType::JSON)
        .body(r#"{"status": "resolved", "message": "still resolved"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Created);

    let resp = auth(client.get("/admin/incidents")).dispatch();
    let incidents: Vec<serde_json::Value> = resp.into_json().unwrap();
    let found = incidents.iter().find(|i| i["id"] == incident_id).unwrap();
    assert_eq!(found["resolved_at"].as_i64().unwrap(), first_resolved_at);

    // The dedicated resolve endpoint is likewise idempotent.
    let resp = auth(client.patch(format!("/admin/incidents/{incident_id}/resolve"))).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let resolved: serde_json::Value = resp.into_json().unwrap();
    assert_eq!(resolved["resolved_at"].as_i64().unwrap(), first_resolved_at);

    let resp = auth(client.delete(format!("/admin/incidents/{incident_id}"))).dispatch();
    assert_eq!(resp.status(), Status::Ok);
}

#[test]
fn test_maintenance_window_validation_and_crud() {
    let client = test_client();
    let monitor = create_http_monitor(&client, "DB", "https://example.com/db");
    let monitor_id = monitor["id"].as_str().unwrap().to_string();
    let now = 1_700_000_000i64;

    // starts_at must be before ends_at
    let resp = auth(client.post("/admin/maintenance-windows"))
        .header(ContentType::JSON)
        .body(serde_json::json!({
            "title": "Bad window", "starts_at": now + 100, "ends_at": now, "monitor_ids": [monitor_id],
        }).to_string())
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    // monitor_ids must be non-empty
    let resp = auth(client.post("/admin/maintenance-windows"))
        .header(ContentType::JSON)
        .body(serde_json::json!({
            "title": "Empty window", "starts_at": now, "ends_at": now + 3600, "monitor_ids": Vec::<String>::new(),
        }).to_string())
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    let resp = auth(client.post("/admin/maintenance-windows"))
        .header(ContentType::JSON)
        .body(serde_json::json!({
            "title": "DB upgrade", "starts_at": now, "ends_at": now + 3600, "monitor_ids": [monitor_id],
        }).to_string())
        .dispatch();
    assert_eq!(resp.status(), Status::Created);
    let window: serde_json::Value = resp.into_json().unwrap();
    let window_id = window["id"].as_str().unwrap().to_string();

    let resp = auth(client.patch(format!("/admin/maintenance-windows/{window_id}")))
        .header(ContentType::JSON)
        .body(r#"{"title": "DB upgrade (extended)"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);

    let resp = auth(client.delete(format!("/admin/maintenance-windows/{window_id}"))).dispatch();
    assert_eq!(resp.status(), Status::Ok);
}

#[test]
fn test_notification_channel_crud_validates_webhook_config() {
    let client = test_client();

    let resp = auth(client.post("/admin/notification-channels"))
        .header(ContentType::JSON)
        .body(r#"{"name": "bad", "config": {"not_a_url_field": true}}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    let resp = auth(client.post("/admin/notification-channels"))
        .header(ContentType::JSON)
        .body(serde_json::json!({
            "name": "Ops webhook",
            "config": {"url": "https://example.com/hooks/ops"},
        }).to_string())
        .dispatch();
    assert_eq!(resp.status(), Status::Created);
    let channel: serde_json::Value = resp.into_json().unwrap();
    assert_eq!(channel["config"]["method"], "POST");
    let channel_id = channel["id"].as_str().unwrap().to_string();

    let resp = auth(client.get("/admin/notification-channels")).dispatch();
    let channels: Vec<serde_json::Value> = resp.into_json().unwrap();
    assert_eq!(channels.len(), 1);

    let resp = auth(client.delete(format!("/admin/notification-channels/{channel_id}"))).dispatch();
    assert_eq!(resp.status(), Status::Ok);
}

#[test]
fn test_settings_overlay_roundtrip() {
    let client = test_client();

    let resp = auth(client.get("/admin/settings")).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let defaults: serde_json::Value = resp.into_json().unwrap();
    assert_eq!(defaults["scheduler_concurrency"], 5);

    let resp = auth(client.patch("/admin/settings"))
        .header(ContentType::JSON)
        .body(r#"{"scheduler_concurrency": 12, "snapshot_max_age_secs": 90}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let updated: serde_json::Value = resp.into_json().unwrap();
    assert_eq!(updated["scheduler_concurrency"], 12);
    assert_eq!(updated["snapshot_max_age_secs"], 90);
    // Untouched fields keep their env-derived default.
    assert_eq!(updated["rollup_lease_secs"], 600);

    // Rejects a zero concurrency override instead of silently accepting it.
    let resp = auth(client.patch("/admin/settings"))
        .header(ContentType::JSON)
        .body(r#"{"scheduler_concurrency": 0}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
}

#[test]
fn test_public_status_endpoint_sets_cache_control() {
    let client = test_client();
    let resp = client.get("/public/status").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let cache_control = resp.headers().get_one("Cache-Control").unwrap().to_string();
    assert!(cache_control.contains("max-age="));
    assert!(cache_control.contains("stale-while-revalidate="));
    let body: serde_json::Value = resp.into_json().unwrap();
    assert!(body["monitors"].is_array());
}

#[test]
fn test_public_maintenance_windows_endpoint_requires_no_auth() {
    let client = test_client();
    let resp = client.get("/public/maintenance-windows").dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body: serde_json::Value = resp.into_json().unwrap();
    assert!(body["active"].is_array());
    assert!(body["upcoming"].is_array());
}

#[test]
fn test_trigger_scheduler_tick_then_rollup() {
    let client = test_client();
    create_http_monitor(&client, "Probed site", "https://example.com/");

    let resp = auth(client.post("/admin/trigger/scheduler-tick")).dispatch();
    assert_eq!(resp.status(), Status::Ok);

    let resp = auth(client.post("/admin/trigger/rollup")).dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body: serde_json::Value = resp.into_json().unwrap();
    assert_eq!(body["triggered"], "rollup");
}

#[test]
fn test_admin_analytics_overview_rejects_unknown_range() {
    let client = test_client();
    let resp = auth(client.get("/admin/analytics/overview?range=decade")).dispatch();
    assert_eq!(resp.status(), Status::BadRequest);

    let resp = auth(client.get("/admin/analytics/overview?range=24h")).dispatch();
    assert_eq!(resp.status(), Status::Ok);
}
