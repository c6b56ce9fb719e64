// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use dealerline_agent::{
    DeliveryLock, LeadService, Orchestrator, OrchestratorConfig, Pipeline, PipelineConfig,
    ToolRegistry,
};
use dealerline_gateway::{AuthConfig, GatewayState, HealthState, router};
use dealerline_resilience::CircuitBreakerRegistry;
use dealerline_storage::WriterConfig;
use dealerline_test_utils::{MemoryStorage, RecordingChannel, ScriptedAgent};
use dealerline_whatsapp::SignatureValidator;

const TOKEN: &str = "test-token";
const WEBHOOK_URL: &str = "https://dealer.example/webhooks/whatsapp";

struct App {
    router: Router,
    tracker: TaskTracker,
    channel: Arc<RecordingChannel>,
    storage: Arc<MemoryStorage>,
}

fn app(validator: Option<SignatureValidator>) -> App {
    let storage = Arc::new(MemoryStorage::new());
    let channel = Arc::new(RecordingChannel::new());
    let agent = Arc::new(ScriptedAgent::terminal("Temos o Corolla 2024 disponível!"));
    let breakers = Arc::new(CircuitBreakerRegistry::default());
    let tools = Arc::new(ToolRegistry::with_builtins(
        storage.clone(),
        Duration::from_secs(1),
    ));
    let orchestrator = Orchestrator::new(
        agent,
        tools,
        Arc::clone(&breakers),
        OrchestratorConfig {
            service: "anthropic".into(),
            max_tool_iterations: 3,
            request_timeout: Duration::from_secs(5),
            fallback_message: "Desculpe, tivemos um problema.".into(),
            ceiling_message: "Um consultor vai continuar o atendimento.".into(),
        },
    );
    let dedup = Arc::new(DeliveryLock::new(Duration::from_secs(3600)));
    let pipeline = Pipeline::new(
        dedup,
        storage.clone(),
        orchestrator,
        channel.clone(),
        breakers,
        PipelineConfig {
            history_window: 10,
            channel_service: "whatsapp".into(),
            dispatch_timeout: Duration::from_secs(5),
            transcription_service: "transcription".into(),
            transcription_timeout: Duration::from_secs(5),
            writer: WriterConfig {
                assistant_attempts: 3,
                retry_backoff: Duration::from_millis(1),
            },
        },
    );

    let tracker = TaskTracker::new();
    let state = GatewayState {
        pipeline: Arc::new(pipeline),
        storage: storage.clone(),
        leads: Arc::new(LeadService::new(storage.clone())),
        tracker: tracker.clone(),
        webhook_validator: validator,
        auth: AuthConfig {
            bearer_token: Some(TOKEN.into()),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render: Some(Arc::new(|| "dealerline_up 1\n".to_string())),
        },
    };

    App {
        router: router(state),
        tracker,
        channel,
        storage,
    }
}

impl App {
    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

fn webhook_form(sid: &str, body: &str) -> String {
    serde_urlencoded::to_string([
        ("MessageSid", sid),
        ("From", "whatsapp:+5585999990000"),
        ("Body", body),
        ("NumMedia", "0"),
    ])
    .unwrap()
}

fn webhook_request(form: String, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/whatsapp")
        .header("content-type", "application/x-www-form-urlencoded");
    if let Some(sig) = signature {
        builder = builder.header("x-twilio-signature", sig);
    }
    builder.body(Body::from(form)).unwrap()
}

fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn webhook_acknowledges_and_replies_in_background() {
    let app = app(None);
    let (status, body) = app
        .send(webhook_request(webhook_form("SM1", "tem Corolla?"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Response/>"));

    app.drain().await;
    let sent = app.channel.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "whatsapp:+5585999990000");
    assert_eq!(sent[0].body, "Temos o Corolla 2024 disponível!");
}

#[tokio::test]
async fn redelivered_webhook_is_processed_once() {
    let app = app(None);
    for _ in 0..3 {
        let (status, _) = app
            .send(webhook_request(webhook_form("SM-dup", "tem Corolla?"), None))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    app.drain().await;
    assert_eq!(app.channel.sent_count().await, 1);
}

#[tokio::test]
async fn malformed_webhook_is_acknowledged_without_reply() {
    let app = app(None);
    let (status, _) = app
        .send(webhook_request("Body=oi".to_string(), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    app.drain().await;
    assert_eq!(app.channel.sent_count().await, 0);
}

#[tokio::test]
async fn signed_webhooks_are_enforced() {
    let validator = SignatureValidator::new("auth-token", WEBHOOK_URL);
    let app = app(Some(validator.clone()));

    let form = webhook_form("SM2", "oi");
    let (status, _) = app.send(webhook_request(form.clone(), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let params: Vec<(String, String)> = vec![
        ("MessageSid".into(), "SM2".into()),
        ("From".into(), "whatsapp:+5585999990000".into()),
        ("Body".into(), "oi".into()),
        ("NumMedia".into(), "0".into()),
    ];
    let signature = validator.sign(&params).unwrap();
    let (status, _) = app.send(webhook_request(form, Some(&signature))).await;
    assert_eq!(status, StatusCode::OK);

    app.drain().await;
    assert_eq!(app.channel.sent_count().await, 1);
}

#[tokio::test]
async fn api_requires_bearer_token() {
    let app = app(None);
    let request = Request::builder()
        .uri("/v1/conversations")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/v1/conversations")
        .header("authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn conversations_and_turns_are_listed() {
    let app = app(None);
    app.send(webhook_request(webhook_form("SM3", "tem Corolla?"), None))
        .await;
    app.drain().await;

    let (status, body) = app
        .send(authed("GET", "/v1/conversations?status=active", Body::empty()))
        .await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let conversations = json["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    let id = conversations[0]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(authed(
            "GET",
            &format!("/v1/conversations/{id}/turns"),
            Body::empty(),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let turns = json["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[1]["role"], "assistant");
}

#[tokio::test]
async fn unknown_status_filter_is_rejected() {
    let app = app(None);
    let (status, _) = app
        .send(authed("GET", "/v1/conversations?status=archived", Body::empty()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_conversation_is_404() {
    let app = app(None);
    let (status, _) = app
        .send(authed("GET", "/v1/conversations/nope/turns", Body::empty()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lead_creation_qualifies_and_persists() {
    let app = app(None);
    let body = serde_json::json!({
        "name": "Ana Souza",
        "phone": "(85) 99999-0000",
        "email": "ana@example.com",
        "interest": "Corolla"
    });
    let (status, response) = app
        .send(authed("POST", "/v1/leads", Body::from(body.to_string())))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let lead: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(lead["phone"], "85999990000");
    assert_eq!(lead["score"], 90);
    assert_eq!(lead["priority"], "hot");
    assert_eq!(app.storage.lead_count().await, 1);
}

#[tokio::test]
async fn lead_without_contact_is_unprocessable() {
    let app = app(None);
    let body = serde_json::json!({"name": "Ana"});
    let (status, _) = app
        .send(authed("POST", "/v1/leads", Body::from(body.to_string())))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let app = app(None);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["circuits"].is_array());

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("dealerline_up"));
}

#[tokio::test]
async fn circuit_reset_requires_known_service() {
    let app = app(None);
    let (status, _) = app
        .send(authed(
            "POST",
            "/v1/admin/circuits/anthropic/reset",
            Body::empty(),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.send(webhook_request(webhook_form("SM4", "tem Corolla?"), None))
        .await;
    app.drain().await;

    let (status, body) = app
        .send(authed(
            "POST",
            "/v1/admin/circuits/anthropic/reset",
            Body::empty(),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"state\":\"closed\""));
}
