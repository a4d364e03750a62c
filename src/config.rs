//! Gateway-wide configuration: the operator-supplied model table plus the
//! process-level knobs that govern retries, logging, and the two
//! passthrough environment names shared with the out-of-scope document
//! pipeline (§6).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::retry::RetryPolicy;
use crate::types::ModelConfigs;

/// `STORAGE_BASE_PATH` / `STORAGE_CACHE_PATH` are read by the document
/// pipeline, not by this crate — reserved here purely so a caller wiring
/// both subsystems from one `.env`/config file has a single place documenting
/// the names it must not collide with.
pub const STORAGE_BASE_PATH_ENV: &str = "STORAGE_BASE_PATH";
pub const STORAGE_CACHE_PATH_ENV: &str = "STORAGE_CACHE_PATH";

/// Top-level configuration for one [`crate::gateway::Gateway`] instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// `model_id → ModelConfig` table; see [`crate::types::ModelConfig`].
    pub models: ModelConfigs,

    /// Retry policy shared by every model's `RetryExecutor`. A future
    /// version could make this per-model; today it is process-wide.
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Directory the JSONL audit logs (§6) are written under. `None`
    /// disables the audit trail without error; `tracing` events still fire.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl GatewayConfig {
    /// Parses a TOML document shaped as one table per model, keyed by model
    /// id, under a top-level `[models.<id>]` section, plus optional
    /// top-level `retry_policy` and `log_dir` keys.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the document does not parse, or any
    /// model table carries an unknown key (`ModelConfig` is
    /// `#[serde(deny_unknown_fields)]`).
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        toml::from_str(source).map_err(|err| Error::Config(format!("invalid gateway config: {err}")))
    }

    #[must_use]
    pub fn new(models: ModelConfigs) -> Self {
        Self {
            models,
            retry_policy: RetryPolicy::default(),
            log_dir: None,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }
}
