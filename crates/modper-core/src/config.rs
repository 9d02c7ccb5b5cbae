//! Perceiver configuration – TOML file plus `MODPER_*` environment overrides.
//!
//! ```toml
//! seed = 0
//! cache_responses = true
//! max_query_depth = 64
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or saving a [`PerceiverConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Runtime settings of a [`ModularPerceiver`][crate::ModularPerceiver].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceiverConfig {
    /// Initial seed of every module's random number generator.
    #[serde(default)]
    pub seed: u64,

    /// Cache each module's responses until the next tick.
    #[serde(default = "default_cache_responses")]
    pub cache_responses: bool,

    /// Maximum number of nested queries in flight at once.  Must be at
    /// least 1: the outermost query already counts towards the limit.
    #[serde(default = "default_max_query_depth")]
    pub max_query_depth: usize,
}

fn default_cache_responses() -> bool {
    true
}
fn default_max_query_depth() -> usize {
    64
}

impl Default for PerceiverConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            cache_responses: default_cache_responses(),
            max_query_depth: default_max_query_depth(),
        }
    }
}

impl PerceiverConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when `max_query_depth` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_query_depth == 0 {
            let reason = "max_query_depth must be at least 1".to_string();
            return Err(ConfigError::Invalid(reason));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `MODPER_*` environment variable overrides.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `MODPER_SEED` | `seed` |
    /// | `MODPER_CACHE_RESPONSES` | `cache_responses` |
    /// | `MODPER_MAX_QUERY_DEPTH` | `max_query_depth` |
    ///
    /// Values that fail to parse are ignored, as is a zero query depth.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MODPER_SEED")
            && let Ok(seed) = v.parse::<u64>()
        {
            self.seed = seed;
        }
        if let Ok(v) = std::env::var("MODPER_CACHE_RESPONSES")
            && let Ok(cache) = v.parse::<bool>()
        {
            self.cache_responses = cache;
        }
        if let Ok(v) = std::env::var("MODPER_MAX_QUERY_DEPTH")
            && let Ok(depth) = v.parse::<usize>()
            && depth > 0
        {
            self.max_query_depth = depth;
        }
    }
}

/// Load the config from `path` and apply environment overrides.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<PerceiverConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut cfg = PerceiverConfig::from_toml_str(&raw)?;
    cfg.apply_env_overrides();
    Ok(Some(cfg))
}

/// Write the config to `path`, creating parent directories as needed.
pub fn save_to(cfg: &PerceiverConfig, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, cfg.to_toml_string()?).map_err(io_err)
}
