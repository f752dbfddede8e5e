//! Typed configuration with YAML loading and environment interpolation.
//!
//! Every section has serde defaults, so a partial (or absent) file yields a
//! fully usable configuration. Secrets are referenced as `${ENV_VAR}` in the
//! file and resolved at load time; unset variables are hard errors so a
//! misconfigured deployment fails at startup, not at the first broker call.

mod broker;
mod breakers;
mod execution;
mod market;
mod notify;
mod persistence;
mod reconcile;
mod trading;

pub use broker::{AlpacaConfig, RetryConfig};
pub use breakers::BreakerConfig;
pub use execution::ExecutionConfig;
pub use market::MarketHoursConfig;
pub use notify::NotifyConfig;
pub use persistence::PersistenceConfig;
pub use reconcile::ReconcileConfig;
pub use trading::TradingConfig;

use serde::Deserialize;
use std::path::Path;

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for the expected shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// A `${VAR}` reference points at an unset environment variable.
    #[error("environment variable {0} referenced in config is not set")]
    MissingEnvVar(String),
}

/// Root configuration for the execution core.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Position and exposure limits enforced by the safety gate.
    #[serde(default)]
    pub trading: TradingConfig,
    /// Loss circuit breaker thresholds.
    #[serde(default)]
    pub breakers: BreakerConfig,
    /// Exchange session hours and entry timing buffers.
    #[serde(default)]
    pub market: MarketHoursConfig,
    /// Fill confirmation and exit order selection knobs.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Reconciler cadence and drift threshold.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    /// Broker API endpoints, credentials and retry policy.
    #[serde(default)]
    pub broker: AlpacaConfig,
    /// SQLite location.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Operator notifications.
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Config {
    /// Load configuration from a YAML file, resolving `${VAR}` references.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from a YAML string, resolving `${VAR}` references.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env(raw)?;
        Ok(serde_yaml_bw::from_str(&interpolated)?)
    }
}

/// Replace every `${VAR}` occurrence with the value of the environment
/// variable `VAR`.
fn interpolate_env(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // No closing brace; emit the remainder verbatim.
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        let value =
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
