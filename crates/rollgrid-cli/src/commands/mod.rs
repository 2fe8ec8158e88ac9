//! Command implementations and the context they share.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use rollgrid_core::{RollgridConfig, SystemClock};
use rollgrid_mapping::Reconciler;
use rollgrid_params::ValidationReport;
use rollgrid_state::StateStore;
use serde::Serialize;
use tracing::debug;

pub mod inventory;
pub mod mapping;
pub mod params;
pub mod rollout;

/// Returned by `params validate` when the report has errors.
#[derive(Debug, thiserror::Error)]
#[error("parameter validation failed with {} error(s)", .0.errors.len())]
pub struct ValidationFailed(pub ValidationReport);

/// Parsed configuration plus global flags.
pub struct Context {
    pub config: RollgridConfig,
    store_override: Option<PathBuf>,
    pub json: bool,
}

impl Context {
    pub fn new(config: RollgridConfig, store_override: Option<PathBuf>, json: bool) -> Self {
        Self {
            config,
            store_override,
            json,
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_override
            .clone()
            .unwrap_or_else(|| self.config.store_path())
    }

    /// Open (creating if needed) the state database.
    pub fn open_store(&self) -> anyhow::Result<StateStore> {
        let path = self.store_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let store = StateStore::open(&path)?;
        debug!(path = %path.display(), "state store opened");
        Ok(store)
    }

    pub fn reconciler(&self) -> anyhow::Result<Reconciler> {
        Ok(Reconciler::new(
            self.open_store()?,
            self.config.mapping_settings(),
            Arc::new(SystemClock),
        ))
    }

    /// Print `value` as pretty JSON when `--json` is set, otherwise run `text`.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text(value);
        }
        Ok(())
    }
}
