// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! POST /webhooks/whatsapp
//!
//! Verifies the provider signature, claims the delivery inline and hands the
//! reply cycle to the task tracker so the provider gets its acknowledgement
//! well inside its retry timeout.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, warn};

use dealerline_whatsapp::signature::SIGNATURE_HEADER;
use dealerline_whatsapp::webhook::form_params;
use dealerline_whatsapp::{EMPTY_TWIML, SignatureValidator, TwilioWebhook};

use crate::server::GatewayState;

fn twiml_ack() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        EMPTY_TWIML,
    )
        .into_response()
}

fn signature_valid(validator: &SignatureValidator, headers: &HeaderMap, body: &[u8]) -> bool {
    let Ok(params) = form_params(body) else {
        return false;
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    validator.verify(signature, &params)
}

pub async fn post_whatsapp(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(validator) = &state.webhook_validator
        && !signature_valid(validator, &headers, &body)
    {
        warn!("rejecting webhook with invalid signature");
        return StatusCode::FORBIDDEN.into_response();
    }

    let delivery = match TwilioWebhook::from_form(&body).and_then(|w| w.into_delivery(Utc::now()))
    {
        Ok(delivery) => delivery,
        Err(e) => {
            // Acknowledged so the provider does not redeliver it.
            warn!(error = %e, "ignoring malformed webhook");
            dealerline_prometheus::record_delivery("ignored");
            return twiml_ack();
        }
    };

    if !state.pipeline.claim(&delivery).await {
        debug!(
            message_id = delivery.message_id.as_str(),
            "duplicate delivery acknowledged"
        );
        return twiml_ack();
    }

    let pipeline = Arc::clone(&state.pipeline);
    state.tracker.spawn(async move {
        pipeline.process(delivery).await;
    });

    twiml_ack()
}
