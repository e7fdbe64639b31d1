use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What happens when a MAC address already bound to one node is assigned to another
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MacPolicy {
    /// The previous holder silently loses the address
    #[default]
    Reassign,
    /// The assignment fails with a duplicate MAC error
    Reject,
}

/// Top-level configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub nodes: NodesConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(level) = &self.general.log_level {
            if level.parse::<log::LevelFilter>().is_err() {
                return Err(ValidationError::InvalidGeneral(format!(
                    "unknown log_level '{}'",
                    level
                )));
            }
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(ValidationError::InvalidStore(
                "path cannot be empty".to_string(),
            ));
        }
        if self.store.max_conflict_retries == 0 {
            return Err(ValidationError::InvalidStore(
                "max_conflict_retries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Retry settings for committing units of work
    pub fn retry_policy(&self) -> crate::store::RetryPolicy {
        crate::store::RetryPolicy {
            max_attempts: self.store.max_conflict_retries,
            backoff: self.store.retry_backoff,
        }
    }
}

/// Shared general configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Where inventory documents are kept and how commits are retried
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,
}

/// Node handling policies
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NodesConfig {
    #[serde(default)]
    pub mac_policy: MacPolicy,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid store configuration: {0}")]
    InvalidStore(String),
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/var/lib/clusterbook/store.json")
}

fn default_max_conflict_retries() -> u32 {
    16
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(5)
}

/// Default implementations
impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            max_conflict_retries: default_max_conflict_retries(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
general:
  log_level: debug
store:
  path: /tmp/inventory.json
  max_conflict_retries: 4
  retry_backoff: 20ms
nodes:
  mac_policy: reject
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.store.path, PathBuf::from("/tmp/inventory.json"));
        assert_eq!(config.nodes.mac_policy, MacPolicy::Reject);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.backoff, Duration::from_millis(20));
    }

    #[test]
    fn test_missing_sections_default() {
        let config: Config = serde_yaml::from_str("store:\n  path: ./store.json\n").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.max_conflict_retries, 16);
        assert_eq!(config.store.retry_backoff, Duration::from_millis(5));
        assert_eq!(config.nodes.mac_policy, MacPolicy::Reassign);
        // general is absent altogether, so the struct default applies
        assert_eq!(config.general.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.store.max_conflict_retries = 0;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidStore(_))));

        config.store.max_conflict_retries = 1;
        config.store.path = PathBuf::new();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidStore(_))));

        config.store.path = default_store_path();
        config.general.log_level = Some("chatty".to_string());
        assert!(matches!(config.validate(), Err(ValidationError::InvalidGeneral(_))));
    }

    #[test]
    fn test_unknown_mac_policy_rejected() {
        let yaml = "nodes:\n  mac_policy: shrug\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }
}
