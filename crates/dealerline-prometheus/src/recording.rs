// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Registers every metric description. Called once after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "dealerline_deliveries_total",
        "Inbound webhook deliveries by outcome"
    );
    describe_counter!(
        "dealerline_replies_total",
        "Reply cycles by outcome (instant, completed, iteration_ceiling, fallback)"
    );
    describe_counter!(
        "dealerline_tool_invocations_total",
        "Tool invocations by tool and result"
    );
    describe_counter!(
        "dealerline_dedup_fail_open_total",
        "Deliveries processed without a durable dedup claim"
    );
    describe_counter!(
        "dealerline_dispatch_failures_total",
        "Replies the outbound channel failed to send"
    );
    describe_counter!(
        "dealerline_persistence_failures_total",
        "Turn writes that ultimately failed, by role"
    );
    describe_counter!(
        "dealerline_circuit_rejections_total",
        "Calls rejected by an open circuit breaker"
    );
    describe_gauge!(
        "dealerline_circuit_state",
        "Circuit state per service (0 closed, 1 open, 2 half-open)"
    );
    describe_histogram!(
        "dealerline_agent_latency_seconds",
        "Latency of agent calls in seconds"
    );
}

pub fn record_delivery(outcome: &str) {
    metrics::counter!("dealerline_deliveries_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_reply(outcome: &str) {
    metrics::counter!("dealerline_replies_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_tool_invocation(tool: &str, is_error: bool) {
    let result = if is_error { "error" } else { "ok" };
    metrics::counter!(
        "dealerline_tool_invocations_total",
        "tool" => tool.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_dedup_fail_open() {
    metrics::counter!("dealerline_dedup_fail_open_total").increment(1);
}

pub fn record_dispatch_failure() {
    metrics::counter!("dealerline_dispatch_failures_total").increment(1);
}

pub fn record_persistence_failure(role: &str) {
    metrics::counter!("dealerline_persistence_failures_total", "role" => role.to_string())
        .increment(1);
}

pub fn record_circuit_rejection(service: &str) {
    metrics::counter!("dealerline_circuit_rejections_total", "service" => service.to_string())
        .increment(1);
}

pub fn record_circuit_state(service: &str, value: f64) {
    metrics::gauge!("dealerline_circuit_state", "service" => service.to_string()).set(value);
}

pub fn record_agent_latency(seconds: f64) {
    metrics::histogram!("dealerline_agent_latency_seconds").record(seconds);
}
