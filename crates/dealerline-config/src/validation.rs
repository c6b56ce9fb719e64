// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::DealerlineConfig;

/// Validates semantic constraints serde cannot express.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &DealerlineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation("storage.database_path must not be empty"));
    }
    if config.storage.assistant_write_attempts == 0 {
        errors.push(ConfigError::validation(
            "storage.assistant_write_attempts must be at least 1",
        ));
    }

    if config.resilience.failure_threshold == 0 {
        errors.push(ConfigError::validation(
            "resilience.failure_threshold must be at least 1",
        ));
    }
    if config.resilience.half_open_max_trials == 0 {
        errors.push(ConfigError::validation(
            "resilience.half_open_max_trials must be at least 1",
        ));
    }

    if config.agent.history_window == 0 {
        errors.push(ConfigError::validation("agent.history_window must be at least 1"));
    }
    if config.agent.request_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "agent.request_timeout_secs must be at least 1",
        ));
    }
    if config.agent.fallback_message.trim().is_empty() {
        errors.push(ConfigError::validation("agent.fallback_message must not be empty"));
    }

    if !(0.0..=1.0).contains(&config.anthropic.temperature) {
        errors.push(ConfigError::validation(format!(
            "anthropic.temperature must be between 0.0 and 1.0, got {}",
            config.anthropic.temperature
        )));
    }
    if config.anthropic.max_tokens == 0 {
        errors.push(ConfigError::validation("anthropic.max_tokens must be at least 1"));
    }

    if config.dedup.retention_secs == 0 {
        errors.push(ConfigError::validation("dedup.retention_secs must be at least 1"));
    }

    if config.gateway.host.trim().is_empty() {
        errors.push(ConfigError::validation("gateway.host must not be empty"));
    }

    // Signature checks need the token they are keyed with.
    if config.whatsapp.validate_signatures
        && config.whatsapp.auth_token.is_some()
        && config.whatsapp.webhook_url.is_none()
    {
        errors.push(ConfigError::validation(
            "whatsapp.webhook_url is required when whatsapp.validate_signatures is enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&DealerlineConfig::default()).is_ok());
    }

    #[test]
    fn zero_threshold_fails() {
        let mut config = DealerlineConfig::default();
        config.resilience.failure_threshold = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "failure_threshold"));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = DealerlineConfig::default();
        config.storage.database_path = " ".into();
        config.anthropic.temperature = 1.5;
        config.agent.history_window = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn signature_validation_needs_webhook_url() {
        let mut config = DealerlineConfig::default();
        config.whatsapp.auth_token = Some("tok".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "webhook_url"));

        config.whatsapp.validate_signatures = false;
        assert!(validate_config(&config).is_ok());
    }
}
