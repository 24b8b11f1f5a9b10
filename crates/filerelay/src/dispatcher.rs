//! Relocation of processed files into their terminal directory
//!
//! Every move is a single `rename`. There is no copy-then-delete fallback:
//! a rename either completes or leaves the file where it was, so a file is
//! never observable in two places or in none. Renames across filesystems
//! fail and are reported as relocation errors.

use crate::config::DirectoryLayout;
use crate::error::{RelayError, Result};
use crate::types::{Delivery, FileEvent, ProcessingOutcome, Sink};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Behavior when the destination name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Atomically replace the existing file
    #[default]
    Overwrite,
    /// Fail the relocation and leave the file in the input directory
    Reject,
}

/// Moves files out of the input directory according to their outcome.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    output_dir: PathBuf,
    error_dir: PathBuf,
    collision: CollisionPolicy,
}

impl Dispatcher {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        error_dir: impl Into<PathBuf>,
        collision: CollisionPolicy,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            error_dir: error_dir.into(),
            collision,
        }
    }

    pub fn from_layout(layout: &DirectoryLayout, collision: CollisionPolicy) -> Self {
        Self::new(&layout.output_dir, &layout.error_dir, collision)
    }

    pub fn sink_dir(&self, sink: Sink) -> &Path {
        match sink {
            Sink::Output => &self.output_dir,
            Sink::Errors => &self.error_dir,
        }
    }

    /// Move `event`'s file to the sink chosen by `outcome`, keeping its name.
    pub fn dispatch(&self, event: &FileEvent, outcome: &ProcessingOutcome) -> Result<Delivery> {
        let sink = outcome.sink();
        let destination = self.sink_dir(sink).join(&event.name);

        let replaced = destination.exists();
        if replaced && self.collision == CollisionPolicy::Reject {
            error!(
                file = %event.name,
                destination = %destination.display(),
                "Destination already exists; file left in input directory"
            );
            return Err(RelayError::DestinationExists {
                name: event.name.clone(),
                destination,
            });
        }

        if let Err(source) = fs::rename(&event.path, &destination) {
            error!(
                file = %event.name,
                destination = %destination.display(),
                error = %source,
                "Relocation failed; file left in input directory"
            );
            return Err(RelayError::Relocation {
                name: event.name.clone(),
                destination,
                source,
            });
        }

        if replaced {
            warn!(file = %event.name, sink = %sink, "Replaced existing file at destination");
        }
        let delivery = Delivery {
            name: event.name.clone(),
            sink,
            destination,
            replaced,
            detected_at: event.detected_at,
            relocated_at: Utc::now(),
        };
        info!(
            file = %event.name,
            sink = %sink,
            latency_ms = delivery.latency().num_milliseconds(),
            "Relocated file"
        );
        Ok(delivery)
    }
}
