//! Reporting configuration: environment-scoped presets, runtime-updatable
//!
//! A preset is selected once at startup from the `FAULTLINE_ENV` flag;
//! runtime updates merge into the live config. Invalid values never abort an
//! update — the offending field is ignored with a warning.

use std::env;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable consulted for preset selection
pub const ENV_FLAG: &str = "FAULTLINE_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingConfig {
    pub enabled: bool,
    /// Fraction of errors transmitted, in `[0, 1]`
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyConfig {
    pub anonymize_ip: bool,
    pub include_username: bool,
}

/// One configured telemetry receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendTarget {
    pub name: String,
    /// Endpoint URL for HTTP receivers, or an opaque key for vendor ones
    pub endpoint_or_key: String,
    pub enabled: bool,
    /// Fallback sequencing; lower goes first
    pub order: u32,
}

/// Process-wide reporting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingConfig {
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub max_queue_size: usize,
    pub sampling: SamplingConfig,
    pub max_breadcrumbs: usize,
    pub privacy: PrivacyConfig,
    pub backends: Vec<BackendTarget>,
    /// Bound on teardown flush; a flush never hangs teardown past this
    pub flush_deadline_ms: u64,
}

/// Environment preset selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvPreset {
    Development,
    Staging,
    Production,
}

impl EnvPreset {
    /// Read the preset flag from the environment, defaulting to development
    pub fn from_env() -> Self {
        match env::var(ENV_FLAG).unwrap_or_default().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" => Self::Staging,
            _ => Self::Development,
        }
    }
}

impl ReportingConfig {
    pub fn preset(preset: EnvPreset) -> Self {
        let console = BackendTarget {
            name: "console".to_string(),
            endpoint_or_key: String::new(),
            enabled: true,
            order: 0,
        };
        match preset {
            EnvPreset::Development => Self {
                batch_size: 1,
                batch_timeout_ms: 1_000,
                max_queue_size: 200,
                sampling: SamplingConfig {
                    enabled: true,
                    rate: 1.0,
                },
                max_breadcrumbs: 100,
                privacy: PrivacyConfig {
                    anonymize_ip: false,
                    include_username: true,
                },
                backends: vec![console],
                flush_deadline_ms: 2_000,
            },
            EnvPreset::Staging => Self {
                batch_size: 5,
                batch_timeout_ms: 10_000,
                max_queue_size: 500,
                sampling: SamplingConfig {
                    enabled: true,
                    rate: 0.8,
                },
                max_breadcrumbs: 50,
                privacy: PrivacyConfig {
                    anonymize_ip: false,
                    include_username: true,
                },
                backends: vec![console],
                flush_deadline_ms: 2_000,
            },
            EnvPreset::Production => Self {
                batch_size: 10,
                batch_timeout_ms: 30_000,
                max_queue_size: 1_000,
                sampling: SamplingConfig {
                    enabled: true,
                    rate: 0.5,
                },
                max_breadcrumbs: 30,
                privacy: PrivacyConfig {
                    anonymize_ip: true,
                    include_username: false,
                },
                backends: vec![console],
                flush_deadline_ms: 2_000,
            },
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self::preset(EnvPreset::Development)
    }
}

/// Partial update merged into the live config by `ConfigManager::update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub batch_size: Option<usize>,
    pub batch_timeout_ms: Option<u64>,
    pub max_queue_size: Option<usize>,
    pub sampling_enabled: Option<bool>,
    pub sampling_rate: Option<f64>,
    pub max_breadcrumbs: Option<usize>,
    pub anonymize_ip: Option<bool>,
    pub include_username: Option<bool>,
    pub backends: Option<Vec<BackendTarget>>,
    pub flush_deadline_ms: Option<u64>,
}

/// Owner of the process-wide config
pub struct ConfigManager {
    inner: RwLock<ReportingConfig>,
}

impl ConfigManager {
    pub fn new(config: ReportingConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ReportingConfig::preset(EnvPreset::from_env()))
    }

    /// Snapshot of the current config
    pub fn get(&self) -> ReportingConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Merge a partial update into the live config. Each field is validated
    /// on its own; an out-of-range value is ignored with a warning, never an
    /// error.
    pub fn update(&self, patch: ConfigPatch) {
        let mut config = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(batch_size) = patch.batch_size {
            if batch_size >= 1 {
                config.batch_size = batch_size;
            } else {
                warn!(batch_size, "ignoring config update: batchSize must be >= 1");
            }
        }
        if let Some(timeout) = patch.batch_timeout_ms {
            if timeout >= 1 {
                config.batch_timeout_ms = timeout;
            } else {
                warn!(timeout, "ignoring config update: batchTimeoutMs must be >= 1");
            }
        }
        if let Some(max_queue_size) = patch.max_queue_size {
            if max_queue_size >= config.batch_size {
                config.max_queue_size = max_queue_size;
            } else {
                warn!(
                    max_queue_size,
                    batch_size = config.batch_size,
                    "ignoring config update: maxQueueSize must be >= batchSize"
                );
            }
        }
        if let Some(enabled) = patch.sampling_enabled {
            config.sampling.enabled = enabled;
        }
        if let Some(rate) = patch.sampling_rate {
            if (0.0..=1.0).contains(&rate) {
                config.sampling.rate = rate;
            } else {
                warn!(rate, "ignoring config update: samplingRate must be within [0, 1]");
            }
        }
        if let Some(max_breadcrumbs) = patch.max_breadcrumbs {
            if max_breadcrumbs >= 1 {
                config.max_breadcrumbs = max_breadcrumbs;
            } else {
                warn!(max_breadcrumbs, "ignoring config update: maxBreadcrumbs must be >= 1");
            }
        }
        if let Some(anonymize_ip) = patch.anonymize_ip {
            config.privacy.anonymize_ip = anonymize_ip;
        }
        if let Some(include_username) = patch.include_username {
            config.privacy.include_username = include_username;
        }
        if let Some(backends) = patch.backends {
            config.backends = backends;
        }
        if let Some(deadline) = patch.flush_deadline_ms {
            if deadline >= 1 {
                config.flush_deadline_ms = deadline;
            } else {
                warn!(deadline, "ignoring config update: flushDeadlineMs must be >= 1");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_differ_in_the_documented_knobs() {
        let dev = ReportingConfig::preset(EnvPreset::Development);
        let prod = ReportingConfig::preset(EnvPreset::Production);

        assert_eq!(dev.batch_size, 1);
        assert_eq!(dev.sampling.rate, 1.0);
        assert!(dev.privacy.include_username);

        assert_eq!(prod.batch_size, 10);
        assert_eq!(prod.sampling.rate, 0.5);
        assert!(prod.privacy.anonymize_ip);
        assert!(!prod.privacy.include_username);
        assert!(prod.max_breadcrumbs < dev.max_breadcrumbs);
        assert!(prod.batch_timeout_ms > dev.batch_timeout_ms);
    }

    #[test]
    fn test_update_merges_valid_fields() {
        let manager = ConfigManager::new(ReportingConfig::preset(EnvPreset::Development));
        manager.update(ConfigPatch {
            batch_size: Some(4),
            sampling_rate: Some(0.25),
            ..Default::default()
        });
        let config = manager.get();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.sampling.rate, 0.25);
    }

    #[test]
    fn test_update_ignores_invalid_fields_but_applies_the_rest() {
        let manager = ConfigManager::new(ReportingConfig::preset(EnvPreset::Development));
        manager.update(ConfigPatch {
            batch_size: Some(0),
            sampling_rate: Some(1.5),
            max_breadcrumbs: Some(10),
            ..Default::default()
        });
        let config = manager.get();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.sampling.rate, 1.0);
        assert_eq!(config.max_breadcrumbs, 10);
    }

    #[test]
    fn test_max_queue_size_must_cover_batch_size() {
        let manager = ConfigManager::new(ReportingConfig::preset(EnvPreset::Production));
        manager.update(ConfigPatch {
            max_queue_size: Some(3),
            ..Default::default()
        });
        assert_eq!(manager.get().max_queue_size, 1_000);
    }
}
