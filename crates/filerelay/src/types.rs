//! Core types for the relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

/// A single unit of work: one file picked up from the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// File name, unique within the input directory at ingestion time
    pub name: String,
    /// Full path of the file inside the input directory
    pub path: PathBuf,
    /// Content as read at ingestion
    pub content: Vec<u8>,
    /// When the watcher picked the file up
    pub detected_at: DateTime<Utc>,
}

impl FileEvent {
    pub fn new(name: impl Into<String>, path: PathBuf, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            path,
            content,
            detected_at: Utc::now(),
        }
    }

    /// Content as text, with invalid UTF-8 replaced.
    pub fn content_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Verdict of the processing step for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Success,
    Failure(String),
}

impl ProcessingOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        ProcessingOutcome::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success)
    }

    /// Sink this outcome routes to.
    pub fn sink(&self) -> Sink {
        match self {
            ProcessingOutcome::Success => Sink::Output,
            ProcessingOutcome::Failure(_) => Sink::Errors,
        }
    }
}

/// Terminal location of a relocated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sink {
    Output,
    Errors,
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Output => write!(f, "out"),
            Sink::Errors => write!(f, "errors"),
        }
    }
}

/// A completed relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub name: String,
    pub sink: Sink,
    pub destination: PathBuf,
    /// An older file of the same name was replaced at the destination
    pub replaced: bool,
    /// When the watcher picked the file up
    pub detected_at: DateTime<Utc>,
    pub relocated_at: DateTime<Utc>,
}

impl Delivery {
    /// Time from detection in the input directory to relocation.
    pub fn latency(&self) -> chrono::Duration {
        self.relocated_at - self.detected_at
    }
}

/// Counters for a sweep or a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Files handed out by the watcher
    pub ingested: u64,
    /// Files relocated to the output directory
    pub delivered: u64,
    /// Files relocated to the error directory
    pub failed: u64,
    /// Files whose relocation failed and are still in the input directory
    pub relocation_errors: u64,
    /// Files that could not be read during a poll
    pub read_errors: u64,
}

impl RelayStats {
    pub fn merge(&mut self, other: &RelayStats) {
        self.ingested += other.ingested;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.relocation_errors += other.relocation_errors;
        self.read_errors += other.read_errors;
    }

    /// Files that reached a terminal directory.
    pub fn relocated(&self) -> u64 {
        self.delivered + self.failed
    }
}
