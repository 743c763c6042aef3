//! Configuration for the JSONQL engine
//!
//! Two concerns live here: the engine's own settings ([`EngineConfig`], read
//! from TOML) and the [`ConfigProvider`] that queries consult through
//! `readConf`. The provider is handed to the execution context explicitly;
//! there is no process-wide configuration.

pub mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Key/value lookup consulted by `readConf`.
pub trait ConfigProvider {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Provider backed by an in-memory table, usually the `[conf]` section.
#[derive(Debug, Clone, Default)]
pub struct MapConfigProvider {
    entries: BTreeMap<String, String>,
}

impl MapConfigProvider {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigProvider for MapConfigProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.engine.check_schema);
        assert_eq!(config.rewrite.max_passes, 32);
    }

    #[test]
    fn parses_all_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [engine]
            spill_threshold = 8
            rng_seed = 42

            [rewrite]
            max_passes = 4

            [conf]
            "job.name" = "nightly"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.spill_threshold, 8);
        assert_eq!(config.engine.rng_seed, 42);
        assert!(config.engine.check_schema);
        assert_eq!(config.rewrite.max_passes, 4);
        let provider = MapConfigProvider::new(config.conf.clone());
        assert_eq!(provider.lookup("job.name"), Some("nightly".to_string()));
        assert_eq!(provider.lookup("missing"), None);
    }

    #[test]
    fn rejects_wrong_types() {
        let err = EngineConfig::from_toml_str("[engine]\nspill_threshold = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let mut config = EngineConfig::default();
        config.engine.rng_seed = 9;
        config.conf.insert("k".to_string(), "v".to_string());
        config.save_to_file(&path).unwrap();
        assert_eq!(EngineConfig::load_from_file(&path).unwrap(), config);
    }
}
