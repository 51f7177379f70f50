//! Configuration file support for the autosave layer.
//!
//! Every section is optional; an empty file (or no file at all) yields the
//! built-in defaults. Timing knobs live next to the component they tune.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::gate::GateConfig;
use crate::recovery::RecoveryConfig;
use crate::scheduler::SchedulerConfig;
use crate::snapshot::CompactionConfig;
use crate::store::StorageConfig;

/// Top-level autosave configuration, one section per component.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutosaveConfig {
    pub scheduler: SchedulerConfig,
    pub gate: GateConfig,
    pub compaction: CompactionConfig,
    pub recovery: RecoveryConfig,
    pub storage: StorageConfig,
}

/// Load and parse a config file.
pub async fn load_config(path: impl AsRef<Path>) -> Result<AutosaveConfig> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: AutosaveConfig =
        toml::from_str(&content).with_context(|| "Failed to parse autosave config")?;
    Ok(config)
}
