//! Init command - write a starter config and create the directories

use super::ConfigArgs;
use anyhow::{bail, Context, Result};
use clap::Args;
use filerelay::{DirectoryLayout, RelayConfig};
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,

    /// Place the relay directories under DIR instead of ./target
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

/// Execute the init command
pub fn run(args: InitArgs) -> Result<()> {
    let path = &args.config.config;
    if path.exists() && !args.force {
        bail!(
            "{} already exists. TRY: pass --force to overwrite it",
            path.display()
        );
    }

    let layout = args
        .root
        .as_deref()
        .map(DirectoryLayout::under)
        .unwrap_or_default();
    let config = RelayConfig {
        fail_on: Some("explode".to_string()),
        ..RelayConfig::with_layout(layout)
    };
    config
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    config
        .layout
        .ensure()
        .context("Failed to create relay directories")?;

    println!("Wrote {}", path.display());
    for dir in [
        &config.layout.staging_dir,
        &config.layout.input_dir,
        &config.layout.output_dir,
        &config.layout.error_dir,
    ] {
        println!("  {}", dir.display());
    }
    Ok(())
}
