//! Filerelay command-line launcher
//!
//! - `init`: write a starter config and create the four directories
//! - `run`: watch the input directory and route files until interrupted
//! - `drop`: stage a file and move it into the input directory

use clap::{Parser, Subcommand};
use filerelay_logging::{init_logging, LogConfig};
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "filerelay", about = "Route dropped files to out/ or errors/")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Log to stderr only, without the rolling log file
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter config and create the relay directories
    Init(cli::init::InitArgs),
    /// Watch the input directory and route files
    Run(cli::run::RunArgs),
    /// Safely write a file into the input directory
    Drop(cli::drop::DropArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "filerelay",
        verbose: cli.verbose,
        stderr_only: cli.no_log_file,
    }) {
        eprintln!("Warning: logging disabled: {e:#}");
    }

    let result = match cli.command {
        Commands::Init(args) => cli::init::run(args).map(|()| ExitCode::SUCCESS),
        Commands::Run(args) => cli::run::run(args).map(|summary| {
            // Files stuck in the input directory fail the run.
            if summary.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }),
        Commands::Drop(args) => cli::drop::run(args).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
