//! Engine configuration types
//!
//! Parsed from TOML. Every section and field has a default, so an empty file
//! (or no file at all) yields a working configuration.

use crate::runtime::spill::SpillSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluation settings
    pub engine: EngineSection,
    /// Rewrite engine settings
    pub rewrite: RewriteSection,
    /// Entries served to queries through the configuration provider
    pub conf: BTreeMap<String, String>,
}

/// Evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSection {
    /// Values held in memory per buffer before spilling to disk
    pub spill_threshold: usize,
    /// Directory for spill files
    pub spill_dir: Option<PathBuf>,
    /// Assert that every statement result matches its inferred schema
    pub check_schema: bool,
    /// Base seed for keyed random generators
    pub rng_seed: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            spill_threshold: SpillSettings::default().threshold,
            spill_dir: None,
            check_schema: true,
            rng_seed: 0,
        }
    }
}

/// Rewrite engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewriteSection {
    /// Upper bound on rewrite passes before giving up on reaching a fixpoint
    pub max_passes: usize,
}

impl Default for RewriteSection {
    fn default() -> Self {
        Self { max_passes: 32 }
    }
}

impl EngineConfig {
    pub fn spill_settings(&self) -> SpillSettings {
        SpillSettings {
            threshold: self.engine.spill_threshold,
            dir: self.engine.spill_dir.clone(),
        }
    }
}
