// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use dealerline_agent::{LeadService, Pipeline};
use dealerline_core::{DealerlineError, StorageAdapter};
use dealerline_whatsapp::SignatureValidator;

use crate::auth::{AuthConfig, auth_middleware};
use crate::{handlers, webhook};

/// State for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: std::time::Instant,
    /// Prometheus text renderer; `None` disables `/metrics`.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render: None,
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub pipeline: Arc<Pipeline>,
    pub storage: Arc<dyn StorageAdapter>,
    pub leads: Arc<LeadService>,
    /// Tracks spawned reply cycles so shutdown can drain them.
    pub tracker: TaskTracker,
    /// `None` accepts unsigned webhooks.
    pub webhook_validator: Option<SignatureValidator>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Builds the application router.
///
/// - POST /webhooks/whatsapp (provider signature)
/// - GET /health, GET /metrics (public)
/// - /v1/* (bearer token)
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .route("/webhooks/whatsapp", post(webhook::post_whatsapp))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/conversations", get(handlers::list_conversations))
        .route("/v1/conversations/{id}/turns", get(handlers::list_turns))
        .route("/v1/leads", post(handlers::create_lead))
        .route(
            "/v1/admin/circuits/{service}/reset",
            post(handlers::reset_circuit),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves until `shutdown` is cancelled.
///
/// Stops accepting connections on cancellation; in-flight reply cycles are
/// drained separately through the state's task tracker.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), DealerlineError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DealerlineError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| DealerlineError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_debug() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        assert!(format!("{config:?}").contains("127.0.0.1"));
    }

    #[test]
    fn health_state_defaults_without_metrics() {
        assert!(HealthState::default().prometheus_render.is_none());
    }
}
