// Integration tests for the query API endpoints
// A live device server backs the router, so no external services are needed

use axum::http::StatusCode;
use axum_test::TestServer;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use telemetry_gateway::api::{create_router, AppState};
use telemetry_gateway::device::Reading;
use telemetry_gateway::{MemorySink, Registry, Server, ServerConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::task::TaskTracker;

const IMEI: &str = "490154203237518";

fn offline_server() -> TestServer {
    let app = create_router(AppState::new(
        Registry::new(),
        TaskTracker::new(),
        Duration::from_millis(100),
    ));
    TestServer::new(app).unwrap()
}

async fn live_server() -> (Server, TestServer, String) {
    let mut server = Server::new(
        ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            login_deadline: Duration::from_millis(500),
            message_deadline: Duration::from_secs(2),
        },
        Arc::new(MemorySink::new()),
    );
    let addr = server.start().await.unwrap();
    let app = create_router(AppState::new(
        server.registry(),
        server.session_tracker(),
        Duration::from_millis(200),
    ));
    (server, TestServer::new(app).unwrap(), addr.to_string())
}

async fn wait_online(server: &Server) {
    let imei = IMEI.parse().unwrap();
    for _ in 0..200 {
        if server.registry().lookup(&imei).is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("device never came online");
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = offline_server();

    let response = server.get("/health").await;
    response.assert_status(StatusCode::OK);
    response.assert_text("OK");
}

#[tokio::test]
async fn test_unknown_device_is_offline() {
    let server = offline_server();

    let response = server.get(&format!("/status/{IMEI}")).await;
    response.assert_status(StatusCode::OK);
    response.assert_json(&json!({ "imei": IMEI, "status": "offline" }));

    let response = server.get(&format!("/readings/{IMEI}")).await;
    response.assert_status(StatusCode::OK);
    response.assert_json(&json!({ "imei": IMEI, "status": "offline" }));
}

#[tokio::test]
async fn test_malformed_imei_is_rejected() {
    let server = offline_server();

    for path in [
        "/status/12345",
        "/status/49015420323751x",
        "/readings/490154203237519",
    ] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["error"].as_str().unwrap().starts_with("Invalid IMEI"));
    }
}

#[tokio::test]
async fn test_live_device_status_and_reading() {
    let (devices, api, addr) = live_server().await;

    let mut conn = TcpStream::connect(&addr).await.unwrap();
    conn.write_all(&IMEI.parse::<telemetry_gateway::DeviceId>().unwrap().digits())
        .await
        .unwrap();
    wait_online(&devices).await;

    let response = api.get(&format!("/status/{IMEI}")).await;
    response.assert_json(&json!({ "imei": IMEI, "status": "online" }));

    // logged in but nothing sent yet
    let response = api.get(&format!("/readings/{IMEI}")).await;
    response.assert_json(&json!({ "imei": IMEI, "status": "online" }));

    let reading = Reading {
        temperature: 21.5,
        altitude: 100.0,
        latitude: 55.0,
        longitude: 37.0,
        battery: 99.0,
    };
    conn.write_all(&reading.encode()).await.unwrap();

    let mut body = Value::Null;
    for _ in 0..50 {
        body = api.get(&format!("/readings/{IMEI}")).await.json();
        if body.get("reading").is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        body["reading"],
        json!({
            "temperature": 21.5,
            "altitude": 100.0,
            "latitude": 55.0,
            "longitude": 37.0,
            "battery": 99.0,
        })
    );
    assert!(body["time"].as_i64().unwrap() > 0);

    let stats: Value = api.get("/stats").await.json();
    assert_eq!(stats, json!({ "online_devices": 1, "active_sessions": 1 }));

    devices.stop();
    devices.wait().await;

    let response = api.get(&format!("/status/{IMEI}")).await;
    response.assert_json(&json!({ "imei": IMEI, "status": "offline" }));
    let stats: Value = api.get("/stats").await.json();
    assert_eq!(stats, json!({ "online_devices": 0, "active_sessions": 0 }));
}
