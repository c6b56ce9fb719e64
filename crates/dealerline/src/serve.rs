// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dealerline serve` command implementation.
//!
//! Wires SQLite storage, the circuit breaker registry, the Anthropic agent,
//! the Twilio channel and the reply pipeline behind the axum gateway, answers
//! cycles a previous run left open, then serves until SIGTERM/SIGINT and
//! drains in-flight reply cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use dealerline_agent::shutdown;
use dealerline_agent::{
    DeliveryLock, LeadService, Orchestrator, OrchestratorConfig, Pipeline, PipelineConfig,
    ToolRegistry,
};
use dealerline_anthropic::AnthropicAgent;
use dealerline_config::model::{DealerlineConfig, WhatsAppConfig};
use dealerline_core::{DealerlineError, StorageAdapter};
use dealerline_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig, start_server};
use dealerline_prometheus::PrometheusExporter;
use dealerline_resilience::{CircuitBreakerConfig, CircuitBreakerRegistry};
use dealerline_storage::SqliteStorage;
use dealerline_whatsapp::{SignatureValidator, TwilioChannel};

/// How often expired delivery claims and idle conversation locks are purged.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

pub async fn run_serve(config: DealerlineConfig) -> Result<(), DealerlineError> {
    init_tracing(&config.agent.log_level);
    info!(agent = config.agent.name.as_str(), "starting dealerline serve");

    let exporter = if config.prometheus.enabled {
        Some(PrometheusExporter::install()?)
    } else {
        info!("prometheus metrics disabled");
        None
    };

    let sqlite = SqliteStorage::new(config.storage.clone());
    sqlite.initialize().await?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(sqlite);

    let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::from(
        &config.resilience,
    )));
    let tools = Arc::new(ToolRegistry::with_builtins(
        Arc::clone(&storage),
        Duration::from_secs(config.agent.tool_timeout_secs),
    ));
    info!(tools = ?tools.names(), "tool registry initialized");

    let agent = Arc::new(AnthropicAgent::new(&config, tools.tool_definitions()).await?);
    let channel = Arc::new(TwilioChannel::new(&config.whatsapp)?);

    let orchestrator = Orchestrator::new(
        agent,
        tools,
        Arc::clone(&breakers),
        OrchestratorConfig::from(&config.agent),
    );
    let dedup = Arc::new(DeliveryLock::from_config(&config.dedup, Arc::clone(&storage)));
    let pipeline = Arc::new(Pipeline::new(
        dedup,
        Arc::clone(&storage),
        orchestrator,
        channel,
        breakers,
        PipelineConfig::from(&config),
    ));

    let cancel = shutdown::install_signal_handler();
    spawn_maintenance(Arc::clone(&pipeline), cancel.clone());

    let tracker = TaskTracker::new();
    spawn_resume(Arc::clone(&pipeline), &tracker);
    let state = GatewayState {
        pipeline,
        storage: Arc::clone(&storage),
        leads: Arc::new(LeadService::new(Arc::clone(&storage))),
        tracker: tracker.clone(),
        webhook_validator: webhook_validator(&config.whatsapp)?,
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render: exporter.map(|exporter| {
                let exporter = Arc::new(exporter);
                Arc::new(move || exporter.render()) as Arc<dyn Fn() -> String + Send + Sync>
            }),
        },
    };
    if config.gateway.bearer_token.is_none() {
        warn!("gateway.bearer_token is not set -- /v1 API will reject every request");
    }

    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };
    start_server(&server_config, state, cancel.clone()).await?;

    // The server returns once the token is cancelled; make sure background
    // tasks see it too when the server stopped for another reason.
    cancel.cancel();
    shutdown::drain_in_flight(
        &tracker,
        Duration::from_secs(config.shutdown.drain_timeout_secs),
    )
    .await;

    storage.close().await?;
    info!("dealerline serve shutdown complete");
    Ok(())
}

/// Builds the webhook validator, or `None` when validation is disabled.
fn webhook_validator(
    config: &WhatsAppConfig,
) -> Result<Option<SignatureValidator>, DealerlineError> {
    if !config.validate_signatures {
        warn!("whatsapp webhook signature validation is disabled");
        return Ok(None);
    }
    match (&config.auth_token, &config.webhook_url) {
        (Some(token), Some(url)) => Ok(Some(SignatureValidator::new(token, url))),
        _ => Err(DealerlineError::Config(
            "whatsapp.auth_token and whatsapp.webhook_url are required to validate webhook signatures"
                .into(),
        )),
    }
}

/// Answers conversations a previous run recorded but never replied to,
/// e.g. after a crash or a drain timeout. Tracked so shutdown waits for it.
fn spawn_resume(pipeline: Arc<Pipeline>, tracker: &TaskTracker) {
    tracker.spawn(async move {
        let resumed = pipeline.resume_interrupted().await;
        if resumed > 0 {
            info!(resumed, "interrupted reply cycles answered");
        }
    });
}

fn spawn_maintenance(pipeline: Arc<Pipeline>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => pipeline.run_maintenance().await,
                _ = cancel.cancelled() => {
                    debug!("maintenance task shutting down");
                    break;
                }
            }
        }
    });
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dealerline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_disabled_when_configured_off() {
        let config = WhatsAppConfig {
            validate_signatures: false,
            ..WhatsAppConfig::default()
        };
        assert!(webhook_validator(&config).unwrap().is_none());
    }

    #[test]
    fn validator_requires_token_and_url() {
        let config = WhatsAppConfig {
            auth_token: Some("tok".into()),
            ..WhatsAppConfig::default()
        };
        assert!(matches!(
            webhook_validator(&config),
            Err(DealerlineError::Config(_))
        ));

        let config = WhatsAppConfig {
            auth_token: Some("tok".into()),
            webhook_url: Some("https://dealer.example/webhooks/whatsapp".into()),
            ..WhatsAppConfig::default()
        };
        assert!(webhook_validator(&config).unwrap().is_some());
    }
}
