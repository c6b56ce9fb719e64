// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Dealerline pipeline.
//!
//! Pipeline crates record through the helpers in [`recording`] using the
//! metrics-rs facade; without an installed recorder they are no-ops. The
//! gateway renders [`PrometheusExporter::render`] at `/metrics`.

pub mod recording;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use dealerline_core::DealerlineError;

pub use recording::{
    record_agent_latency, record_circuit_rejection, record_circuit_state, record_dedup_fail_open,
    record_delivery, record_dispatch_failure, record_persistence_failure, record_reply,
    record_tool_invocation,
};

/// Owns the global Prometheus recorder.
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Installs the recorder globally. Fails if one is already installed.
    pub fn install() -> Result<Self, DealerlineError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            DealerlineError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;
        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");
        Ok(Self { handle })
    }

    /// Wraps a handle from a recorder built elsewhere (tests build local ones).
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_recorder_renders_recorded_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let exporter = PrometheusExporter::from_handle(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            record_delivery("processed");
            record_reply("fallback");
            record_tool_invocation("capture_lead", false);
        });

        let text = exporter.render();
        assert!(text.contains("dealerline_deliveries_total"));
        assert!(text.contains("outcome=\"processed\""));
        assert!(text.contains("dealerline_replies_total"));
        assert!(text.contains("tool=\"capture_lead\""));
    }
}
