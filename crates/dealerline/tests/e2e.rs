// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: webhook in, reply out, over a real SQLite file.
//!
//! Each test opens its own temp database; the agent and channel are mocks.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use dealerline_agent::{
    DeliveryLock, LeadService, Orchestrator, OrchestratorConfig, Pipeline, PipelineConfig,
    ToolRegistry,
};
use dealerline_config::model::{AgentConfig, DealerlineConfig, DedupConfig, StorageConfig};
use dealerline_core::StorageAdapter;
use dealerline_core::types::{ConversationFilter, Role};
use dealerline_gateway::{AuthConfig, GatewayState, HealthState, router};
use dealerline_resilience::CircuitBreakerRegistry;
use dealerline_storage::SqliteStorage;
use dealerline_test_utils::mock_agent::tool_call;
use dealerline_test_utils::{RecordingChannel, ScriptedAgent};

const SENDER: &str = "whatsapp:+5585988887777";

struct Stack {
    router: axum::Router,
    pipeline: Arc<Pipeline>,
    tracker: TaskTracker,
    storage: Arc<dyn StorageAdapter>,
    channel: Arc<RecordingChannel>,
}

async fn open_storage(path: &std::path::Path) -> Arc<dyn StorageAdapter> {
    let storage = SqliteStorage::new(StorageConfig {
        database_path: path.display().to_string(),
        ..StorageConfig::default()
    });
    storage.initialize().await.unwrap();
    Arc::new(storage)
}

fn stack(storage: Arc<dyn StorageAdapter>, agent: ScriptedAgent) -> Stack {
    let mut config = DealerlineConfig::default();
    config.storage.retry_backoff_ms = 1;

    let channel = Arc::new(RecordingChannel::new());
    let breakers = Arc::new(CircuitBreakerRegistry::default());
    let tools = Arc::new(ToolRegistry::with_builtins(
        Arc::clone(&storage),
        Duration::from_secs(2),
    ));
    let orchestrator = Orchestrator::new(
        Arc::new(agent),
        tools,
        Arc::clone(&breakers),
        OrchestratorConfig::from(&AgentConfig::default()),
    );
    let dedup = Arc::new(DeliveryLock::from_config(
        &DedupConfig::default(),
        Arc::clone(&storage),
    ));
    let pipeline = Pipeline::new(
        dedup,
        Arc::clone(&storage),
        orchestrator,
        channel.clone(),
        breakers,
        PipelineConfig::from(&config),
    );

    let pipeline = Arc::new(pipeline);
    let tracker = TaskTracker::new();
    let state = GatewayState {
        pipeline: Arc::clone(&pipeline),
        storage: Arc::clone(&storage),
        leads: Arc::new(LeadService::new(Arc::clone(&storage))),
        tracker: tracker.clone(),
        webhook_validator: None,
        auth: AuthConfig {
            bearer_token: Some("e2e".into()),
        },
        health: HealthState::default(),
    };

    Stack {
        router: router(state),
        pipeline,
        tracker,
        storage,
        channel,
    }
}

impl Stack {
    async fn webhook(&self, sid: &str, body: &str) -> StatusCode {
        let form = serde_urlencoded::to_string([
            ("MessageSid", sid),
            ("From", SENDER),
            ("Body", body),
            ("NumMedia", "0"),
        ])
        .unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/whatsapp")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap().status()
    }

    async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[tokio::test]
async fn reply_cycle_persists_both_turns() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&dir.path().join("e2e.db")).await;
    let stack = stack(storage, ScriptedAgent::terminal("Temos o HB20 a partir de R$ 80 mil."));

    assert_eq!(stack.webhook("SM-e2e-1", "quanto custa o HB20?").await, StatusCode::OK);
    stack.drain().await;

    let sent = stack.channel.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "Temos o HB20 a partir de R$ 80 mil.");

    let conversation = stack
        .storage
        .find_active_conversation(SENDER)
        .await
        .unwrap()
        .expect("conversation created");
    assert!(!conversation.awaiting_reply);
    assert_eq!(conversation.user_turns, 1);
    assert_eq!(conversation.assistant_turns, 1);

    let turns = stack.storage.get_turns(&conversation.id, None).await.unwrap();
    let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
}

#[tokio::test]
async fn redelivery_after_restart_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restart.db");

    {
        let storage = open_storage(&path).await;
        let first = stack(Arc::clone(&storage), ScriptedAgent::terminal("Olá!"));
        first.webhook("SM-restart", "tem SUV?").await;
        first.drain().await;
        assert_eq!(first.channel.sent_count().await, 1);
        storage.close().await.unwrap();
    }

    let storage = open_storage(&path).await;
    let second = stack(storage, ScriptedAgent::terminal("Olá de novo!"));
    second.webhook("SM-restart", "tem SUV?").await;
    second.drain().await;
    assert_eq!(second.channel.sent_count().await, 0);
}

#[tokio::test]
async fn tool_cycle_captures_lead_and_appointment() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&dir.path().join("tools.db")).await;

    let agent = ScriptedAgent::new();
    agent
        .push(tool_call(
            "capture_lead",
            serde_json::json!({"name": "Carlos", "interest": "Compass"}),
            None,
        ))
        .await;
    agent
        .push(tool_call(
            "schedule_visit",
            serde_json::json!({"preferred_date": "sábado", "vehicle": "Compass"}),
            None,
        ))
        .await;
    agent
        .push(dealerline_core::types::AgentReply::Terminal {
            text: "Visita agendada para sábado, Carlos!".into(),
        })
        .await;

    let stack = stack(storage, agent);
    stack
        .webhook("SM-tools", "sou o Carlos, quero ver o Compass sábado")
        .await;
    stack.drain().await;

    let sent = stack.channel.sent_messages().await;
    assert_eq!(sent[0].body, "Visita agendada para sábado, Carlos!");

    let appointments = stack
        .storage
        .list_conversations(&ConversationFilter {
            resulted_in_appointment: Some(true),
            ..ConversationFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(appointments.len(), 1);
    assert!(appointments[0].lead_id.is_some());

    let lead = stack
        .storage
        .find_lead_by_phone("5585988887777")
        .await
        .unwrap()
        .expect("lead captured from sender phone");
    assert_eq!(lead.name.as_deref(), Some("Carlos"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lead_form_and_chat_capture_race_to_one_lead() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_storage(&dir.path().join("leads.db")).await;
    let leads = Arc::new(LeadService::new(Arc::clone(&storage)));

    for round in 0..20 {
        let phone = format!("55859{round:08}");
        let tasks: Vec<_> = ["Compass", "Renegade"]
            .into_iter()
            .map(|interest| {
                let leads = Arc::clone(&leads);
                let phone = phone.clone();
                tokio::spawn(async move {
                    leads
                        .upsert(dealerline_core::types::LeadSubmission {
                            phone: Some(phone),
                            interest: Some(interest.into()),
                            ..Default::default()
                        })
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().expect("upsert succeeds").id);
        }
        assert_eq!(ids[0], ids[1], "round {round} produced two leads");
    }
}

#[tokio::test]
async fn interrupted_cycle_is_answered_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interrupted.db");

    // A run that recorded the question and died before replying.
    let conversation_id = {
        let storage = open_storage(&path).await;
        let conversation = dealerline_core::types::Conversation::start(SENDER, chrono::Utc::now());
        storage.create_conversation(&conversation).await.unwrap();
        let turn = dealerline_core::types::Turn::new(
            &conversation.id,
            Role::User,
            "o Pulse ainda está disponível?",
            chrono::Utc::now(),
        );
        storage.append_turn(&turn, true).await.unwrap();
        storage.close().await.unwrap();
        conversation.id
    };

    let storage = open_storage(&path).await;
    let stack = stack(storage, ScriptedAgent::terminal("Está sim! Quer agendar um test drive?"));

    assert_eq!(stack.pipeline.resume_interrupted().await, 1);

    let sent = stack.channel.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, SENDER);
    assert_eq!(sent[0].body, "Está sim! Quer agendar um test drive?");

    let conversation = stack
        .storage
        .get_conversation(&conversation_id)
        .await
        .unwrap()
        .expect("conversation persisted");
    assert!(!conversation.awaiting_reply);
    let roles: Vec<Role> = stack
        .storage
        .get_turns(&conversation_id, None)
        .await
        .unwrap()
        .iter()
        .map(|t| t.role)
        .collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);

    // Nothing left to resume on the next start.
    assert_eq!(stack.pipeline.resume_interrupted().await, 0);
    assert_eq!(stack.channel.sent_count().await, 1);
}
