//! Locating and loading the perceiver configuration for the CLI.

use std::path::{Path, PathBuf};

use anyhow::Context;
use modper_core::PerceiverConfig;
use modper_core::config::load_from;

/// Return the path to `~/.modper/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".modper").join("config.toml")
}

/// Load the effective configuration.
///
/// An explicit `path` must exist; the default path may be missing, in which
/// case defaults (plus `MODPER_*` overrides) are used.
pub fn load(path: Option<&Path>) -> anyhow::Result<PerceiverConfig> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (config_path(), false),
    };
    let loaded = load_from(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    match loaded {
        Some(cfg) => Ok(cfg),
        None if required => anyhow::bail!("config file {} does not exist", path.display()),
        None => {
            let mut cfg = PerceiverConfig::default();
            cfg.apply_env_overrides();
            Ok(cfg)
        }
    }
}
