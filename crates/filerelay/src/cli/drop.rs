//! Drop command - safely write a file into the input directory

use super::ConfigArgs;
use anyhow::{bail, Context, Result};
use clap::Args;
use filerelay::SafeFileWriter;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct DropArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Name the file gets in the input directory
    pub name: String,

    /// Literal content
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub text: Option<String>,

    /// Read content from this file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Execute the drop command
pub fn run(args: DropArgs) -> Result<()> {
    let config = args.config.load()?;
    let writer = SafeFileWriter::from_layout(&config.layout);

    let written = match (&args.text, &args.file) {
        (Some(text), _) => writer.write(&args.name, text),
        (None, Some(file)) => writer.write_file(&args.name, file),
        (None, None) => bail!("Nothing to drop. TRY: pass --text or --file"),
    }
    .with_context(|| format!("Failed to drop {}", args.name))?;

    println!("{}", written.display());
    Ok(())
}
