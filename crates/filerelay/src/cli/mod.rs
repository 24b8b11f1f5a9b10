//! CLI module for filerelay
//!
//! Each subcommand lives in its own module with an `Args` struct and a
//! `run` entry point.

pub mod drop;
pub mod init;
pub mod run;

use anyhow::{Context, Result};
use clap::Args;
use filerelay::RelayConfig;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "filerelay.toml";

/// Config file selection shared by all subcommands.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the TOML config file
    #[arg(short, long, env = "FILERELAY_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

impl ConfigArgs {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(&self) -> Result<RelayConfig> {
        load_or_default(&self.config)
    }
}

fn load_or_default(path: &Path) -> Result<RelayConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found; using defaults");
        return Ok(RelayConfig::default());
    }
    RelayConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_or_default(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_broken_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("filerelay.toml");
        std::fs::write(&path, "workers = \"many\"").unwrap();
        let err = load_or_default(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load config"));
    }
}
