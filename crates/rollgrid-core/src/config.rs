//! rollgrid.toml configuration parser.
//!
//! Every section is optional; missing values fall back to the defaults
//! documented on each accessor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Minimum fuzzy-match score accepted by the service-registry fallback.
pub const DEFAULT_FUZZY_MIN_SCORE: f64 = 0.6;

/// Bonus added when one name contains the other.
pub const DEFAULT_FUZZY_CONTAINMENT_BONUS: f64 = 0.2;

/// Drain delay used when a request does not specify one.
pub const DEFAULT_DRAIN_DELAY_SECS: u64 = 300;

pub const DEFAULT_STORE_PATH: &str = "/var/lib/rollgrid/rollgrid.redb";

pub const DEFAULT_LOG_FILTER: &str = "info,rollgrid=debug";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollgridConfig {
    pub store: Option<StoreConfig>,
    pub mapping: Option<MappingSettings>,
    pub rollout: Option<RolloutConfig>,
    pub params: Option<ParamsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

/// Tunables for the reconciler's fuzzy-name fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingSettings {
    pub fuzzy_min_score: f64,
    pub fuzzy_containment_bonus: f64,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            fuzzy_min_score: DEFAULT_FUZZY_MIN_SCORE,
            fuzzy_containment_bonus: DEFAULT_FUZZY_CONTAINMENT_BONUS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    pub default_drain_delay_secs: Option<u64>,
}

/// Settings consumed by the orchestration assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerSettings {
    pub default_drain_delay_secs: u64,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            default_drain_delay_secs: DEFAULT_DRAIN_DELAY_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamsConfig {
    pub strict: Option<bool>,
    /// Extra names appended to the built-in known-variables registry.
    pub known_variables: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub json: Option<bool>,
}

impl RollgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RollgridConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Database location (default: `/var/lib/rollgrid/rollgrid.redb`).
    pub fn store_path(&self) -> PathBuf {
        self.store
            .as_ref()
            .and_then(|s| s.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
    }

    pub fn mapping_settings(&self) -> MappingSettings {
        self.mapping.unwrap_or_default()
    }

    pub fn assembler_settings(&self) -> AssemblerSettings {
        let default = AssemblerSettings::default();
        AssemblerSettings {
            default_drain_delay_secs: self
                .rollout
                .as_ref()
                .and_then(|r| r.default_drain_delay_secs)
                .unwrap_or(default.default_drain_delay_secs),
        }
    }

    pub fn strict_params(&self) -> bool {
        self.params.as_ref().and_then(|p| p.strict).unwrap_or(false)
    }

    /// Operator-declared variable names on top of the built-in registry.
    pub fn known_variables(&self) -> Vec<String> {
        self.params
            .as_ref()
            .and_then(|p| p.known_variables.clone())
            .unwrap_or_default()
    }

    pub fn log_filter(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.filter.clone())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
    }

    pub fn log_json(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}
