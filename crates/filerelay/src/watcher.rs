//! Input directory watching with polling-based change detection
//!
//! Polling rather than OS notifications keeps the watcher working on network
//! and FUSE filesystems, where inotify-style events are unreliable.
//!
//! # Delivery
//!
//! - Each file is handed out at most once per watcher. Handed-out files are
//!   remembered by name together with a [`FileStamp`]; a later file with the
//!   same name but a different stamp is a new file.
//! - Entries whose file has left the input directory are forgotten on the
//!   next poll. Relocation is what prevents redelivery across restarts.
//! - Within one poll, files are ordered by modification time, then name.
//!   There is no ordering guarantee across polls.

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::types::FileEvent;
use std::collections::{HashMap, VecDeque};
use std::fs::{self, Metadata};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Source of ingestion events.
///
/// [`PollingWatcher`] is the filesystem implementation; tests and embedders
/// may plug in their own.
pub trait EventSource: Send {
    /// Files that appeared since the previous call.
    fn poll(&mut self) -> Result<Vec<FileEvent>>;

    /// How long to wait after an empty poll.
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(500)
    }

    /// Files skipped so far because their content could not be read.
    fn read_errors(&self) -> u64 {
        0
    }

    /// Lazy, blocking, unbounded stream of events.
    ///
    /// Ends once `token` is cancelled.
    fn events(&mut self, token: CancellationToken) -> Events<'_, Self>
    where
        Self: Sized,
    {
        Events {
            source: self,
            token,
            pending: VecDeque::new(),
        }
    }
}

/// Identity of a file beyond its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    uid: Option<String>,
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            uid: strong_uid_from_metadata(metadata),
            modified: metadata.modified().ok(),
            len: metadata.len(),
        }
    }

    /// Whether both stamps describe the same file.
    ///
    /// The device/inode pair decides when both sides have one, so touching or
    /// appending to a queued file does not make it new. Otherwise modification
    /// time and length are compared.
    pub fn same_file(&self, other: &FileStamp) -> bool {
        match (&self.uid, &other.uid) {
            (Some(a), Some(b)) => a == b,
            _ => self.modified == other.modified && self.len == other.len,
        }
    }
}

fn strong_uid_from_metadata(metadata: &Metadata) -> Option<String> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(format!("unix:{}:{}", metadata.dev(), metadata.ino()))
    }

    #[cfg(not(unix))]
    {
        let _ = metadata;
        None
    }
}

/// Polls one directory for new regular files.
pub struct PollingWatcher {
    input_dir: PathBuf,
    poll_interval: Duration,
    include_hidden: bool,
    handed_out: HashMap<String, FileStamp>,
    read_errors: u64,
}

impl PollingWatcher {
    pub fn new(input_dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            input_dir: input_dir.into(),
            poll_interval,
            include_hidden: false,
            handed_out: HashMap::new(),
            read_errors: 0,
        }
    }

    /// Also pick up files whose name starts with a dot.
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Number of files handed out that are still present in the input directory.
    pub fn in_flight(&self) -> usize {
        self.handed_out.len()
    }

    fn list(&self) -> Result<Vec<(String, PathBuf, Metadata)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.input_dir)? {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "Skipping file with non UTF-8 name");
                continue;
            };
            if !self.include_hidden && name.starts_with('.') {
                continue;
            }
            found.push((name, entry.path(), metadata));
        }

        found.sort_by(|a, b| {
            let ma = a.2.modified().ok();
            let mb = b.2.modified().ok();
            ma.cmp(&mb).then_with(|| a.0.cmp(&b.0))
        });
        Ok(found)
    }
}

impl EventSource for PollingWatcher {
    fn poll(&mut self) -> Result<Vec<FileEvent>> {
        let listing = self.list()?;

        self.handed_out
            .retain(|name, _| listing.iter().any(|(listed, _, _)| listed == name));

        let mut events = Vec::new();
        for (name, path, metadata) in listing {
            let stamp = FileStamp::from_metadata(&metadata);
            if self
                .handed_out
                .get(&name)
                .is_some_and(|seen| seen.same_file(&stamp))
            {
                continue;
            }

            let content = match fs::read(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %name, "File vanished before it could be read");
                    continue;
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Failed to read input file; retrying next poll");
                    self.read_errors += 1;
                    continue;
                }
            };

            debug!(file = %name, bytes = content.len(), "Ingested file");
            self.handed_out.insert(name.clone(), stamp);
            events.push(FileEvent::new(name, path, content));
        }

        Ok(events)
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn read_errors(&self) -> u64 {
        self.read_errors
    }
}

/// Iterator returned by [`EventSource::events`].
pub struct Events<'a, S: EventSource> {
    source: &'a mut S,
    token: CancellationToken,
    pending: VecDeque<FileEvent>,
}

impl<S: EventSource> Iterator for Events<'_, S> {
    type Item = FileEvent;

    fn next(&mut self) -> Option<FileEvent> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let interval = self.source.poll_interval();
            match self.source.poll() {
                Ok(batch) if !batch.is_empty() => self.pending.extend(batch),
                Ok(_) => {
                    if !self.token.sleep(interval) {
                        return None;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Poll of input directory failed");
                    if !self.token.sleep(interval) {
                        return None;
                    }
                }
            }
        }
    }
}
