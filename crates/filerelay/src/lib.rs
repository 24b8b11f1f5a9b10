//! Filerelay - directory-watching file router
//!
//! Files dropped into an input directory are picked up, checked by a single
//! processing step, and moved to either the output directory (success) or the
//! error directory (failure). Never both, never neither.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ SafeFile-   │     │  Polling-   │     │    Rule-    │     │  Dispatcher  │
//! │ Writer      │────▶│  Watcher    │────▶│  Processor  │────▶│ (out|errors) │
//! │ (temp → in) │     │   (in)      │     │             │     │              │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────────────┘
//! ```
//!
//! Every hop between directories is a single `rename`; the filesystem is the
//! only coordination point between writer, watcher and dispatcher.
//!
//! # Known limitation
//!
//! Dropping a file whose name matches one still being relocated is undefined.
//! Producers must use unique names, or accept the configured
//! [`CollisionPolicy`] at the destination.

pub mod cancel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod processor;
pub mod relay;
pub mod types;
pub mod watcher;
pub mod writer;

// Re-exports for convenience
pub use cancel::CancellationToken;
pub use config::{DirectoryLayout, RelayConfig};
pub use dispatcher::{CollisionPolicy, Dispatcher};
pub use error::{RelayError, Result};
pub use processor::{FailureRule, FailureSubscriber, Processor, RecordingSubscriber, RuleProcessor};
pub use relay::{Relay, RelayHandle, RunSummary, SweepReport};
pub use types::{Delivery, FileEvent, ProcessingOutcome, RelayStats, Sink};
pub use watcher::{EventSource, Events, FileStamp, PollingWatcher};
pub use writer::SafeFileWriter;
