//! Run command - watch the input directory and route files

use super::ConfigArgs;
use anyhow::{Context, Result};
use clap::Args;
use filerelay::{CancellationToken, Relay, RelayConfig, RelayStats, RunSummary};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Staging directory override
    #[arg(long)]
    pub staging: Option<PathBuf>,

    /// Input directory override
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Output directory override
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Error directory override
    #[arg(long)]
    pub errors: Option<PathBuf>,

    /// Regex; matching content is routed to the error directory
    #[arg(long)]
    pub fail_on: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Number of worker threads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Route what is currently in the input directory, then exit
    #[arg(long)]
    pub once: bool,

    /// Print final statistics as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn resolve(&self) -> Result<RelayConfig> {
        let mut config = self.config.load()?;
        if let Some(dir) = &self.staging {
            config.layout.staging_dir = dir.clone();
        }
        if let Some(dir) = &self.input {
            config.layout.input_dir = dir.clone();
        }
        if let Some(dir) = &self.output {
            config.layout.output_dir = dir.clone();
        }
        if let Some(dir) = &self.errors {
            config.layout.error_dir = dir.clone();
        }
        if let Some(pattern) = &self.fail_on {
            config.fail_on = Some(pattern.clone());
        }
        if let Some(ms) = self.poll_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.validate().context("Invalid relay configuration")?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    stats: &'a RelayStats,
    relocation_failures: Vec<String>,
}

/// Execute the run command
///
/// The returned summary is clean only if every file reached a terminal directory.
pub fn run(args: RunArgs) -> Result<RunSummary> {
    let config = args.resolve()?;
    config
        .layout
        .ensure()
        .context("Failed to create relay directories")?;

    info!(
        input = %config.layout.input_dir.display(),
        output = %config.layout.output_dir.display(),
        errors = %config.layout.error_dir.display(),
        "Starting relay"
    );

    let relay = Relay::from_config(&config)?;
    let summary = if args.once {
        let mut relay = relay;
        let report = relay.run_once()?;
        RunSummary {
            stats: report.stats,
            relocation_failures: report.relocation_failures,
        }
    } else {
        let handle = relay.spawn()?;
        wait_for_shutdown_signal(handle.token())?;
        handle.shutdown()
    };

    let stats = summary.stats;
    for failure in &summary.relocation_failures {
        error!(error = %failure, "File left in input directory");
    }

    let report = RunReport {
        stats: &stats,
        relocation_failures: summary
            .relocation_failures
            .iter()
            .map(|e| e.to_string())
            .collect(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "ingested: {}  out: {}  errors: {}  stuck: {}",
            stats.ingested, stats.delivered, stats.failed, stats.relocation_errors
        );
        for failure in &report.relocation_failures {
            println!("  {failure}");
        }
    }

    Ok(summary)
}

/// Block until SIGINT/SIGTERM (or Ctrl+C on Windows) cancels `token`.
fn wait_for_shutdown_signal(token: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handler")?;
        let handler_token = token.clone();
        std::thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}, initiating shutdown...", sig);
                handler_token.cancel();
            }
        });
    }

    #[cfg(windows)]
    {
        let handler_token = token.clone();
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, initiating shutdown...");
            handler_token.cancel();
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    while !token.is_cancelled() {
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}
