// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered config loading with Figment.
//!
//! `./dealerline.toml` > `~/.config/dealerline/dealerline.toml` > `/etc/dealerline/dealerline.toml`,
//! with `DEALERLINE_` environment variables overriding all files.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DealerlineConfig;

/// Sections recognised in `DEALERLINE_<SECTION>_<KEY>` variables.
const ENV_SECTIONS: &[&str] = &[
    "agent",
    "anthropic",
    "whatsapp",
    "storage",
    "resilience",
    "dedup",
    "gateway",
    "prometheus",
    "shutdown",
];

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/dealerline/dealerline.toml`
/// 3. `~/.config/dealerline/dealerline.toml`
/// 4. `./dealerline.toml`
/// 5. `DEALERLINE_*` environment variables
pub fn load_config() -> Result<DealerlineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DealerlineConfig::default()))
        .merge(Toml::file("/etc/dealerline/dealerline.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("dealerline/dealerline.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("dealerline.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<DealerlineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DealerlineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DealerlineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DealerlineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Maps `DEALERLINE_WHATSAPP_AUTH_TOKEN` to `whatsapp.auth_token`.
///
/// Only the first underscore after a known section name becomes a dot; keys
/// themselves keep their underscores.
fn env_provider() -> Env {
    Env::prefixed("DEALERLINE_").map(|key| {
        // Figment hands over the remainder as written, usually upper case.
        let key_str = key.as_str().to_ascii_lowercase();
        for section in ENV_SECTIONS {
            if let Some(rest) = key_str
                .strip_prefix(section)
                .and_then(|r| r.strip_prefix('_'))
            {
                return format!("{section}.{rest}").into();
            }
        }
        key_str.into()
    })
}
