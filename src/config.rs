//! Configuration
//!
//! YAML-backed settings for the cache engine and the service around it.
//!
//! ```yaml
//! engine:
//!   blob_store: buck_data
//!   forward_key_store: cache_keys
//!   reverse_key_store: reverse_cache_keys
//!   sequence: buck_sequence
//!   default_ttl_secs: 86400
//! sweep_interval_secs: 30
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Engine settings: which named stores and sequence to bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Store holding payloads by entry identifier
    pub blob_store: String,
    /// Store holding entry identifiers by logical key
    pub forward_key_store: String,
    /// Store holding key sets by entry identifier
    pub reverse_key_store: String,
    /// Cluster-wide counter allocating entry identifiers
    pub sequence: String,
    /// Value the sequence starts from when first created
    pub sequence_initial_value: u64,
    /// Expiry applied to writes that do not specify one (none if unset)
    pub default_ttl_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blob_store: "buck_data".to_string(),
            forward_key_store: "cache_keys".to_string(),
            reverse_key_store: "reverse_cache_keys".to_string(),
            sequence: "buck_sequence".to_string(),
            sequence_initial_value: 0,
            default_ttl_secs: None,
        }
    }
}

impl EngineConfig {
    /// Default expiry as a duration.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Reject empty or colliding store names.
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("blob_store", &self.blob_store),
            ("forward_key_store", &self.forward_key_store),
            ("reverse_key_store", &self.reverse_key_store),
            ("sequence", &self.sequence),
        ];

        for (field, name) in &names {
            if name.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", field)));
            }
        }

        let stores = &names[..3];
        for (i, (field_a, name_a)) in stores.iter().enumerate() {
            for (field_b, name_b) in &stores[i + 1..] {
                if name_a == name_b {
                    return Err(Error::Config(format!(
                        "{} and {} both use store name '{}'",
                        field_a, field_b, name_a
                    )));
                }
            }
        }

        if self.default_ttl_secs == Some(0) {
            return Err(Error::Config(
                "default_ttl_secs must be positive when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Service settings loaded by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Engine settings
    pub engine: EngineConfig,
    /// Interval between sweeps of expired records
    pub sweep_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            sweep_interval_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ServiceConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        self.engine.validate()
    }
}
