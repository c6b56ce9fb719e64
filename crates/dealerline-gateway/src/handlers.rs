// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request handlers for the operational and `/v1` REST API.

use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use dealerline_core::DealerlineError;
use dealerline_core::types::{
    Conversation, ConversationFilter, ConversationStatus, HealthStatus, LeadSubmission, Turn,
};
use dealerline_resilience::{BreakerSnapshot, CircuitState};

use crate::server::GatewayState;

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps a domain error to a status and a generic JSON body.
pub(crate) fn error_response(err: &DealerlineError) -> Response {
    let (status, message) = match err {
        DealerlineError::NotFound { entity, .. } => {
            (StatusCode::NOT_FOUND, format!("{entity} not found"))
        }
        DealerlineError::Validation(message) => (StatusCode::UNPROCESSABLE_ENTITY, message.clone()),
        DealerlineError::CircuitOpen { .. } | DealerlineError::Timeout { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "service temporarily unavailable".to_string(),
        ),
        other => {
            error!(error = %other, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    };
    (status, Json(ErrorResponse { error: message })).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when storage is healthy and every circuit is closed, else `degraded`.
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub storage: String,
    pub circuits: Vec<BreakerSnapshot>,
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let storage = match state.storage.health_check().await {
        Ok(HealthStatus::Healthy) => "healthy".to_string(),
        Ok(HealthStatus::Degraded(reason)) => format!("degraded: {reason}"),
        Ok(HealthStatus::Unhealthy(reason)) => format!("unhealthy: {reason}"),
        Err(e) => format!("unhealthy: {e}"),
    };
    let circuits = state.pipeline.breakers().snapshot();
    let degraded =
        storage != "healthy" || circuits.iter().any(|c| c.state != CircuitState::Closed);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        storage,
        circuits,
    })
}

/// GET /metrics
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub appointment: Option<bool>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
}

/// GET /v1/conversations
pub async fn list_conversations(
    State(state): State<GatewayState>,
    Query(query): Query<ConversationQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        Some(raw) => match ConversationStatus::from_str(raw) {
            Ok(status) => Some(status),
            Err(_) => return bad_request(format!("unknown status `{raw}`")),
        },
        None => None,
    };
    let filter = ConversationFilter {
        status,
        resulted_in_appointment: query.appointment,
        limit: Some(query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)),
        offset: query.offset,
    };

    match state.storage.list_conversations(&filter).await {
        Ok(conversations) => Json(ConversationListResponse { conversations }).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Serialize)]
pub struct TurnListResponse {
    pub conversation_id: String,
    pub turns: Vec<Turn>,
}

/// GET /v1/conversations/{id}/turns
pub async fn list_turns(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    match state.storage.get_conversation(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(&DealerlineError::NotFound {
                entity: "conversation".into(),
                id,
            });
        }
        Err(e) => return error_response(&e),
    }

    match state.storage.get_turns(&id, None).await {
        Ok(turns) => Json(TurnListResponse {
            conversation_id: id,
            turns,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /v1/leads
pub async fn create_lead(
    State(state): State<GatewayState>,
    Json(submission): Json<LeadSubmission>,
) -> Response {
    match state.leads.upsert(submission).await {
        Ok(lead) => (StatusCode::CREATED, Json(lead)).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Serialize)]
pub struct CircuitResetResponse {
    pub service: String,
    pub state: CircuitState,
}

/// POST /v1/admin/circuits/{service}/reset
pub async fn reset_circuit(
    State(state): State<GatewayState>,
    Path(service): Path<String>,
) -> Response {
    let breakers = state.pipeline.breakers();
    if !breakers.reset(&service) {
        return error_response(&DealerlineError::NotFound {
            entity: "circuit".into(),
            id: service,
        });
    }
    tracing::info!(service = service.as_str(), "circuit reset by operator");
    let circuit_state = breakers.breaker(&service).state();
    Json(CircuitResetResponse {
        service,
        state: circuit_state,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn not_found_maps_to_404() {
        let response = error_response(&DealerlineError::NotFound {
            entity: "conversation".into(),
            id: "c-1".into(),
        });
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_422() {
        let response = error_response(&DealerlineError::Validation("no phone".into()));
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn open_circuit_maps_to_503() {
        let response = error_response(&DealerlineError::CircuitOpen {
            service: "anthropic".into(),
            retry_after: Duration::from_secs(5),
        });
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn storage_errors_are_generic() {
        let response = error_response(&DealerlineError::Internal("db path /secret".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn conversation_query_defaults() {
        let query: ConversationQuery = serde_json::from_str("{}").unwrap();
        assert!(query.status.is_none());
        assert!(query.limit.is_none());
    }
}
