use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ErrorCode;

/// Maximum allowed size (in bytes) of a single event payload by default (1 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1_048_576;

/// Maximum number of events in one append by default.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1_000;

/// Limits enforced by an event store on every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

const fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

const fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

/// Load a store config from a TOML file. A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_store_config(path: &Path) -> Result<StoreConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no store config, using defaults");
        return Ok(StoreConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_store_config(&content)
        .with_context(|| format!("{}: failed to parse {}", ErrorCode::ConfigParseError, path.display()))
}

/// Parse a store config from TOML text.
///
/// # Errors
///
/// Returns an error for invalid TOML or zero-valued limits.
pub fn parse_store_config(content: &str) -> Result<StoreConfig> {
    let config = toml::from_str::<StoreConfig>(content)?;
    if config.max_batch_size == 0 {
        anyhow::bail!("max_batch_size must be > 0");
    }
    Ok(config)
}
