//! Configuration for the relay

use crate::dispatcher::CollisionPolicy;
use crate::error::{RelayError, Result};
use crate::processor::FailureRule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The four directories the relay works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryLayout {
    /// Writer-only staging area, never watched
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Watched input directory
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Success sink
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Failure sink
    #[serde(default = "default_error_dir")]
    pub error_dir: PathBuf,
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("target/temp")
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("target/in")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target/out")
}

fn default_error_dir() -> PathBuf {
    PathBuf::from("target/errors")
}

impl Default for DirectoryLayout {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            error_dir: default_error_dir(),
        }
    }
}

impl DirectoryLayout {
    /// Layout with the conventional `temp`, `in`, `out`, `errors` children of `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            staging_dir: root.join("temp"),
            input_dir: root.join("in"),
            output_dir: root.join("out"),
            error_dir: root.join("errors"),
        }
    }

    fn all(&self) -> [(&'static str, &Path); 4] {
        [
            ("staging_dir", self.staging_dir.as_path()),
            ("input_dir", self.input_dir.as_path()),
            ("output_dir", self.output_dir.as_path()),
            ("error_dir", self.error_dir.as_path()),
        ]
    }

    /// Check that no two roles share a directory.
    pub fn validate(&self) -> Result<()> {
        let dirs = self.all();
        for (i, (name_a, a)) in dirs.iter().enumerate() {
            if a.as_os_str().is_empty() {
                return Err(RelayError::Config(format!("{name_a} must not be empty")));
            }
            for (name_b, b) in dirs.iter().skip(i + 1) {
                if a == b {
                    return Err(RelayError::Config(format!(
                        "{name_a} and {name_b} both point at {}",
                        a.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Create any missing directory. Existing contents are left alone.
    pub fn ensure(&self) -> Result<()> {
        for (_, dir) in self.all() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Main configuration for the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(flatten)]
    pub layout: DirectoryLayout,

    /// Delay between polls of the input directory when it is idle
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of threads processing and dispatching files
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bound on events queued between the watcher and the workers
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Pick up dot-files from the input directory
    #[serde(default)]
    pub include_hidden: bool,

    /// What to do when the destination name already exists
    #[serde(default)]
    pub collision: CollisionPolicy,

    /// Regex; content matching it is routed to the error directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_workers() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            layout: DirectoryLayout::default(),
            poll_interval_ms: default_poll_interval_ms(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            include_hidden: false,
            collision: CollisionPolicy::default(),
            fail_on: None,
        }
    }
}

impl RelayConfig {
    /// Config with default settings over the given layout.
    pub fn with_layout(layout: DirectoryLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig =
            toml::from_str(&content).map_err(|e| RelayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        if self.poll_interval_ms == 0 {
            return Err(RelayError::Config("poll_interval_ms must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(RelayError::Config("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(RelayError::Config("queue_capacity must be at least 1".into()));
        }
        self.failure_rule()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Compile `fail_on` into the rule the processor applies.
    pub fn failure_rule(&self) -> Result<FailureRule> {
        match self.fail_on.as_deref() {
            None => Ok(FailureRule::Never),
            Some(pattern) => FailureRule::matches(pattern),
        }
    }
}
