use std::time::Duration;

use super::*;
use crate::scheduler::{cycle, Producer, TickOutcome};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_app() -> (String, AppState) {
    let mut config = SimulationConfig::default();
    config.bus_feed.url = None;
    config.frontend_origin = "http://dash.test".to_string();
    let state = AppState::new(config).expect("state");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), state)
}

#[tokio::test]
async fn health_carries_configured_cors_origin() {
    let (base, _state) = spawn_app().await;
    let response = reqwest::get(format!("{base}/")).await.expect("request");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("http://dash.test")
    );
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["status"], "online");
}

#[tokio::test]
async fn threshold_updates_clamp_and_reject_inversions() {
    let (base, state) = spawn_app().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/api/settings/thresholds?warning=10&metro=500"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["thresholds"]["density_warning"], 50);
    assert_eq!(body["thresholds"]["metro_flow"], 150);

    let response = client
        .post(format!("{base}/api/settings/thresholds?warning=300&critical=120"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let error: Value = response.json().await.expect("json");
    assert_eq!(error["error_code"], "INVALID_COMMAND");

    let thresholds = state.sim.lock().await.thresholds;
    assert_eq!((thresholds.density_warning, thresholds.density_critical), (50, 200));
}

#[tokio::test]
async fn control_routes_drive_shared_flags() {
    let (base, state) = spawn_app().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{base}/api/control/toggle"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["paused"], true);
    assert!(state.control.is_paused());
    assert_eq!(cycle(Producer::Density, &state).await, TickOutcome::Paused);

    client
        .post(format!("{base}/api/control/resume"))
        .send()
        .await
        .expect("request");
    assert!(!state.control.is_paused());

    let body: Value = client
        .post(format!("{base}/api/control/demo-mode"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["demo_mode"], true);
    assert_eq!(body["speed_multiplier"], 2.0);
}

#[tokio::test]
async fn history_and_insights_follow_density_ticks() {
    let (base, state) = spawn_app().await;
    let client = reqwest::Client::new();

    let early = client
        .post(format!("{base}/api/ai/insights"))
        .send()
        .await
        .expect("request");
    assert_eq!(early.status(), reqwest::StatusCode::NOT_FOUND);

    assert_eq!(cycle(Producer::Density, &state).await, TickOutcome::Ran);

    let history: Value = reqwest::get(format!("{base}/api/history"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(history["counts"]["density_points"], 1);
    assert_eq!(history["trends"]["density"], "stable");

    let insights: Value = client
        .post(format!("{base}/api/ai/insights"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(insights["status"], "success");
    assert_eq!(insights["insights"]["model"], "rule-based");

    client
        .post(format!("{base}/api/control/reset-history"))
        .send()
        .await
        .expect("request");
    assert_eq!(state.sim.lock().await.history.density().len(), 0);
}

#[tokio::test]
async fn nearby_rejects_bad_radius() {
    let (base, _state) = spawn_app().await;

    let response = reqwest::get(format!(
        "{base}/api/responders/nearby?lat=12.97&lon=77.59&radius=-1"
    ))
    .await
    .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let error: Value = response.json().await.expect("json");
    assert_eq!(error["error_code"], "INVALID_QUERY");

    let body: Value = reqwest::get(format!(
        "{base}/api/responders/nearby?lat=12.9789&lon=77.5993&radius=1"
    ))
    .await
    .expect("request")
    .json()
    .await
    .expect("json");
    assert_eq!(body["count"], 15);
}

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame in time")
            .expect("socket open")
            .expect("frame");
        if let WsMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

async fn wait_for_subscribers(state: &AppState, expected: usize) {
    for _ in 0..100 {
        if state.hub.subscriber_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("subscriber count never reached {expected}");
}

#[tokio::test]
async fn socket_gets_ack_then_pushes_and_echoes() {
    let (base, state) = spawn_app().await;
    let url = format!("{}/ws", base.replacen("http://", "ws://", 1));
    let (mut ws, _) = connect_async(url).await.expect("connect");

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "connection");
    wait_for_subscribers(&state, 1).await;

    let event = StreamEvent::Test {
        message: "heartbeat".to_string(),
        active_connections: 1,
        timestamp: Utc::now(),
    };
    let report = state.hub.broadcast(&event).await.expect("broadcast");
    assert_eq!(report.delivered, 1);
    let pushed = next_json(&mut ws).await;
    assert_eq!(pushed["type"], "test");
    assert_eq!(pushed["message"], "heartbeat");

    // Non-JSON text is ignored, so the next frame is the echo of the JSON message.
    ws.send(WsMessage::text("not json")).await.expect("send text");
    ws.send(WsMessage::text(r#"{"ping": 7}"#)).await.expect("send json");
    let echo = next_json(&mut ws).await;
    assert_eq!(echo["type"], "echo");
    assert_eq!(echo["received"]["ping"], 7);

    ws.close(None).await.expect("close");
    wait_for_subscribers(&state, 0).await;
}

#[test]
fn echo_wraps_json_and_ignores_the_rest() {
    let frame = echo_frame(r#"{"ping": 1}"#).expect("json input echoes");
    let value: Value = serde_json::from_str(&frame).expect("frame");
    assert_eq!(value["type"], "echo");
    assert_eq!(value["received"]["ping"], 1);

    assert!(echo_frame("not json").is_none());
}
