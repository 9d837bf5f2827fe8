// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration of a [`FunctionManager`](crate::FunctionManager).
//!
//! Every section takes its defaults when omitted, so a RON document only
//! needs the values it changes:
//!
//! ```ron
//! (
//!     execution: (max_concurrent: 8, default_timeout_ms: 5000),
//!     circuit_breaker: (failure_threshold: 3),
//!     persistence: (path: Some("state/hestia.json")),
//! )
//! ```

use hestia_control::{
    BridgeConfig, CircuitBreakerConfig, ExecutionConfig, LifecycleConfig, RegistryConfig,
    StatisticsConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid RON for this configuration.
    #[error("invalid config: {0}")]
    Parse(String),
    /// The values are inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where and how often state is saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Snapshot file. `None` keeps state in memory only.
    pub path: Option<PathBuf>,
    /// Period of the autosave worker.
    pub autosave_interval_ms: u64,
    /// Save once more when the manager shuts down.
    pub save_on_shutdown: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: None,
            autosave_interval_ms: 30_000,
            save_on_shutdown: true,
        }
    }
}

/// The complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HestiaConfig {
    pub registry: RegistryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub execution: ExecutionConfig,
    pub lifecycle: LifecycleConfig,
    pub statistics: StatisticsConfig,
    pub bridge: BridgeConfig,
    pub persistence: PersistenceConfig,
}

impl HestiaConfig {
    /// Parses and validates a RON document.
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a RON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron_str(&source)?;
        log::info!("Configuration loaded from {}.", path.display());
        Ok(config)
    }

    /// Renders the configuration as pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty_config = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty_config)
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let exec = &self.execution;
        if exec.max_concurrent == 0 {
            return Err(ConfigError::Invalid("execution.max_concurrent must be at least 1".into()));
        }
        if exec.min_concurrent > exec.max_concurrent_limit {
            return Err(ConfigError::Invalid(format!(
                "execution.min_concurrent ({}) exceeds max_concurrent_limit ({})",
                exec.min_concurrent, exec.max_concurrent_limit
            )));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".into(),
            ));
        }
        let alpha = self.statistics.ema_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "statistics.ema_alpha must be in (0, 1], got {alpha}"
            )));
        }
        if self.bridge.tick_rate == 0 {
            return Err(ConfigError::Invalid("bridge.tick_rate must be at least 1".into()));
        }
        if self.lifecycle.evaluation_interval_ms == 0
            || self.persistence.autosave_interval_ms == 0
        {
            return Err(ConfigError::Invalid("intervals must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_control::OverflowPolicy;
    use hestia_core::FunctionCategory;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = HestiaConfig::from_ron_str("()").unwrap();
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.execution.max_concurrent, 4);
        assert_eq!(config.persistence.autosave_interval_ms, 30_000);
        assert!(config.persistence.path.is_none());
    }

    #[test]
    fn test_partial_document() {
        let config = HestiaConfig::from_ron_str(
            r#"(
                execution: (
                    max_concurrent: 8,
                    overflow: queue(max_waiting: 4, max_wait_ms: 250),
                ),
                lifecycle: (
                    idle_threshold_ms: 60000,
                    category_idle_threshold_ms: { monitoring: 5000 },
                ),
                persistence: (path: Some("state/hestia.json")),
            )"#,
        )
        .unwrap();

        assert_eq!(config.execution.max_concurrent, 8);
        assert_eq!(
            config.execution.overflow,
            OverflowPolicy::Queue {
                max_waiting: 4,
                max_wait_ms: 250
            }
        );
        assert_eq!(config.execution.default_timeout_ms, 30_000);
        assert_eq!(
            config
                .lifecycle
                .idle_threshold_for(FunctionCategory::Monitoring)
                .as_millis(),
            5000
        );
        assert_eq!(
            config.persistence.path.as_deref(),
            Some(Path::new("state/hestia.json"))
        );
    }

    #[test]
    fn test_rendered_config_parses_back() {
        let mut config = HestiaConfig::default();
        config.circuit_breaker.cooldown_ms = 1234;
        let text = config.to_ron_string().unwrap();
        let parsed = HestiaConfig::from_ron_str(&text).unwrap();
        assert_eq!(parsed.circuit_breaker.cooldown_ms, 1234);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            HestiaConfig::from_ron_str("(circuit_breaker: (failure_threshold: 0))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HestiaConfig::from_ron_str("(statistics: (ema_alpha: 1.5))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HestiaConfig::from_ron_str("(execution: [1, 2])"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = HestiaConfig::from_file("/nonexistent/hestia.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
