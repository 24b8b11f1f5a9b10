//! Ingestion → processing → dispatch, wired together
//!
//! [`Relay::run_once`] performs one sweep on the caller's thread.
//! [`Relay::spawn`] runs a watcher thread feeding a bounded queue that a pool
//! of worker threads drains, so slow processing never delays detection.
//!
//! Cancellation is only checked between files. A worker that has started a
//! relocation always finishes it, and the queue is drained before the
//! workers exit.

use crate::cancel::CancellationToken;
use crate::config::RelayConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{RelayError, Result};
use crate::processor::{panic_message, FailureSubscriber, Processor, RuleProcessor};
use crate::types::{Delivery, FileEvent, ProcessingOutcome, RelayStats, Sink};
use crate::watcher::{EventSource, PollingWatcher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Result of a single sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub stats: RelayStats,
    pub deliveries: Vec<Delivery>,
    /// Files that could not be relocated and remain in the input directory
    pub relocation_failures: Vec<RelayError>,
}

/// Final account of a background run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub stats: RelayStats,
    pub relocation_failures: Vec<RelayError>,
}

impl RunSummary {
    /// True when every ingested file reached a terminal directory.
    pub fn is_clean(&self) -> bool {
        self.relocation_failures.is_empty()
    }
}

/// File router over an [`EventSource`].
pub struct Relay<S: EventSource = PollingWatcher> {
    source: S,
    processor: Arc<dyn Processor>,
    dispatcher: Dispatcher,
    workers: usize,
    queue_capacity: usize,
}

impl Relay<PollingWatcher> {
    /// Build a polling relay from configuration, failing on `fail_on` matches.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Like [`Relay::from_config`], notifying `subscriber` of every failure.
    pub fn from_config_with_subscriber(
        config: &RelayConfig,
        subscriber: Arc<dyn FailureSubscriber>,
    ) -> Result<Self> {
        Self::build(config, Some(subscriber))
    }

    fn build(config: &RelayConfig, subscriber: Option<Arc<dyn FailureSubscriber>>) -> Result<Self> {
        config.validate()?;

        let mut processor = RuleProcessor::new(config.failure_rule()?);
        if let Some(subscriber) = subscriber {
            processor = processor.with_subscriber(subscriber);
        }
        let source = PollingWatcher::new(&config.layout.input_dir, config.poll_interval())
            .include_hidden(config.include_hidden);
        let dispatcher = Dispatcher::from_layout(&config.layout, config.collision);

        Ok(Relay::new(source, Arc::new(processor), dispatcher)
            .workers(config.workers)
            .queue_capacity(config.queue_capacity))
    }
}

impl<S: EventSource + 'static> Relay<S> {
    pub fn new(source: S, processor: Arc<dyn Processor>, dispatcher: Dispatcher) -> Self {
        Self {
            source,
            processor,
            dispatcher,
            workers: 1,
            queue_capacity: 64,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Poll once and route every file found, on the calling thread.
    ///
    /// Only a failed poll is an error; relocation failures are collected in
    /// the report.
    pub fn run_once(&mut self) -> Result<SweepReport> {
        let read_errors_before = self.source.read_errors();
        let events = self.source.poll()?;

        let mut report = SweepReport::default();
        report.stats.read_errors = self.source.read_errors().saturating_sub(read_errors_before);
        for event in events {
            report.stats.ingested += 1;
            match route(self.processor.as_ref(), &self.dispatcher, &event) {
                Ok(delivery) => {
                    count_delivery(&mut report.stats, &delivery);
                    report.deliveries.push(delivery);
                }
                Err(e) => {
                    report.stats.relocation_errors += 1;
                    report.relocation_failures.push(e);
                }
            }
        }
        Ok(report)
    }

    /// Start the watcher and worker threads.
    pub fn spawn(self) -> Result<RelayHandle> {
        let token = CancellationToken::new();
        let state = Arc::new(Mutex::new(RunSummary::default()));
        let (tx, rx) = mpsc::sync_channel::<FileEvent>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let mut threads = Vec::with_capacity(self.workers + 1);
        for id in 0..self.workers {
            let rx = Arc::clone(&rx);
            let state = Arc::clone(&state);
            let processor = Arc::clone(&self.processor);
            let dispatcher = self.dispatcher.clone();
            let handle = thread::Builder::new()
                .name(format!("filerelay-worker-{id}"))
                .spawn(move || worker_loop(id, &rx, processor.as_ref(), &dispatcher, &state))?;
            threads.push(handle);
        }

        let mut source = self.source;
        let watcher_token = token.clone();
        let watcher_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name("filerelay-watcher".to_string())
            .spawn(move || watcher_loop(&mut source, tx, &watcher_token, &watcher_state));
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                // Workers exit once the sender is dropped with the failed closure.
                for worker in threads {
                    let _ = worker.join();
                }
                return Err(e.into());
            }
        };
        threads.push(handle);

        info!(workers = self.workers, "Relay started");
        Ok(RelayHandle {
            token,
            threads,
            state,
        })
    }
}

/// Handle to a running relay.
pub struct RelayHandle {
    token: CancellationToken,
    threads: Vec<JoinHandle<()>>,
    state: Arc<Mutex<RunSummary>>,
}

impl RelayHandle {
    /// Snapshot of the counters so far.
    pub fn stats(&self) -> RelayStats {
        lock(&self.state).stats
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop watching, let workers finish queued files, and report.
    pub fn shutdown(self) -> RunSummary {
        self.token.cancel();
        for handle in self.threads {
            let name = handle.thread().name().unwrap_or("filerelay").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "Relay thread panicked");
            }
        }

        let mut state = lock(&self.state);
        let summary = std::mem::take(&mut *state);
        info!(
            ingested = summary.stats.ingested,
            delivered = summary.stats.delivered,
            failed = summary.stats.failed,
            relocation_errors = summary.stats.relocation_errors,
            "Relay stopped"
        );
        summary
    }
}

fn lock(state: &Mutex<RunSummary>) -> MutexGuard<'_, RunSummary> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn watcher_loop<S: EventSource>(
    source: &mut S,
    tx: mpsc::SyncSender<FileEvent>,
    token: &CancellationToken,
    state: &Mutex<RunSummary>,
) {
    debug!("Watcher loop started");
    while !token.is_cancelled() {
        let events = match source.poll() {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Poll of input directory failed");
                Vec::new()
            }
        };

        let idle = events.is_empty();
        {
            let mut state = lock(state);
            state.stats.ingested += events.len() as u64;
            state.stats.read_errors = source.read_errors();
        }
        for event in events {
            if tx.send(event).is_err() {
                warn!("All workers exited; watcher stopping");
                return;
            }
        }

        if idle && !token.sleep(source.poll_interval()) {
            break;
        }
    }
    debug!("Watcher loop stopped");
}

fn worker_loop(
    id: usize,
    rx: &Mutex<mpsc::Receiver<FileEvent>>,
    processor: &dyn Processor,
    dispatcher: &Dispatcher,
    state: &Mutex<RunSummary>,
) {
    debug!(worker = id, "Worker started");
    loop {
        let next = match rx.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => break,
        };
        let Ok(event) = next else {
            break;
        };

        let routed = route(processor, dispatcher, &event);
        let mut state = lock(state);
        match routed {
            Ok(delivery) => count_delivery(&mut state.stats, &delivery),
            Err(e) => {
                state.stats.relocation_errors += 1;
                state.relocation_failures.push(e);
            }
        }
    }
    debug!(worker = id, "Worker stopped");
}

/// Process one file and relocate it according to the outcome.
///
/// A panicking processor routes the file to the error directory.
pub fn route(
    processor: &dyn Processor,
    dispatcher: &Dispatcher,
    event: &FileEvent,
) -> Result<Delivery> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process(event)))
        .unwrap_or_else(|payload| {
            let reason = format!("processing panicked: {}", panic_message(payload.as_ref()));
            warn!(file = %event.name, reason = %reason, "Processing failed");
            ProcessingOutcome::Failure(reason)
        });
    dispatcher.dispatch(event, &outcome)
}

fn count_delivery(stats: &mut RelayStats, delivery: &Delivery) {
    match delivery.sink {
        Sink::Output => stats.delivered += 1,
        Sink::Errors => stats.failed += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryLayout;
    use crate::dispatcher::CollisionPolicy;
    use crate::processor::{FailureRule, RecordingSubscriber};
    use std::collections::VecDeque;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> RelayConfig {
        let layout = DirectoryLayout::under(temp.path());
        layout.ensure().unwrap();
        let mut config = RelayConfig::with_layout(layout);
        config.poll_interval_ms = 10;
        config.fail_on = Some("explode".to_string());
        config
    }

    /// Source that hands out a fixed list of events once.
    struct ScriptedSource {
        events: Vec<FileEvent>,
    }

    impl EventSource for ScriptedSource {
        fn poll(&mut self) -> Result<Vec<FileEvent>> {
            Ok(std::mem::take(&mut self.events))
        }

        fn poll_interval(&self) -> Duration {
            Duration::from_millis(5)
        }
    }

    #[test]
    fn test_run_once_routes_by_outcome() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        fs::write(config.layout.input_dir.join("fail.txt"), "This message will explode").unwrap();
        fs::write(config.layout.input_dir.join("pass.txt"), "fine").unwrap();

        let mut relay = Relay::from_config(&config).unwrap();
        let report = relay.run_once().unwrap();

        assert_eq!(report.stats.ingested, 2);
        assert_eq!(report.stats.delivered, 1);
        assert_eq!(report.stats.failed, 1);
        assert!(report.relocation_failures.is_empty());
        assert!(config.layout.error_dir.join("fail.txt").exists());
        assert!(config.layout.output_dir.join("pass.txt").exists());
        assert_eq!(fs::read_dir(&config.layout.input_dir).unwrap().count(), 0);

        let again = relay.run_once().unwrap();
        assert_eq!(again.stats, RelayStats::default());
    }

    #[test]
    fn test_run_once_collects_relocation_failures() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        fs::remove_dir(&config.layout.error_dir).unwrap();
        fs::write(config.layout.input_dir.join("fail.txt"), "explode").unwrap();
        fs::write(config.layout.input_dir.join("pass.txt"), "fine").unwrap();

        let report = Relay::from_config(&config).unwrap().run_once().unwrap();

        assert_eq!(report.stats.delivered, 1);
        assert_eq!(report.stats.relocation_errors, 1);
        assert_eq!(report.relocation_failures[0].file_name(), Some("fail.txt"));
        assert!(config.layout.input_dir.join("fail.txt").exists());
    }

    #[test]
    fn test_subscriber_from_config() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        fs::write(config.layout.input_dir.join("fail.txt"), "explode now").unwrap();
        let recorder = Arc::new(RecordingSubscriber::new());

        Relay::from_config_with_subscriber(&config, recorder.clone())
            .unwrap()
            .run_once()
            .unwrap();

        assert_eq!(
            recorder.notifications(),
            vec![("fail.txt".to_string(), b"explode now".to_vec())]
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp);
        config.fail_on = Some("[".to_string());
        assert!(Relay::from_config(&config).is_err());
    }

    #[test]
    fn test_spawned_relay_drains_scripted_events() {
        let temp = TempDir::new().unwrap();
        let layout = DirectoryLayout::under(temp.path());
        layout.ensure().unwrap();

        let mut events = Vec::new();
        for i in 0..20 {
            let name = format!("file-{i:02}.txt");
            let path: PathBuf = layout.input_dir.join(&name);
            let content = if i % 4 == 0 { "explode" } else { "ok" };
            fs::write(&path, content).unwrap();
            events.push(FileEvent::new(name, path, content.as_bytes().to_vec()));
        }

        let processor = Arc::new(RuleProcessor::new(FailureRule::Contains("explode".into())));
        let dispatcher = Dispatcher::from_layout(&layout, CollisionPolicy::Overwrite);
        let handle = Relay::new(ScriptedSource { events }, processor, dispatcher)
            .workers(4)
            .queue_capacity(2)
            .spawn()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.stats().relocated() < 20 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let summary = handle.shutdown();

        assert!(summary.is_clean());
        assert_eq!(summary.stats.ingested, 20);
        assert_eq!(summary.stats.failed, 5);
        assert_eq!(summary.stats.delivered, 15);
        assert_eq!(fs::read_dir(&layout.output_dir).unwrap().count(), 15);
        assert_eq!(fs::read_dir(&layout.error_dir).unwrap().count(), 5);
    }

    #[test]
    fn test_route_uses_processor_verdict() {
        struct AlwaysFail;
        impl Processor for AlwaysFail {
            fn process(&self, _: &FileEvent) -> ProcessingOutcome {
                ProcessingOutcome::failure("nope")
            }
        }

        let temp = TempDir::new().unwrap();
        let layout = DirectoryLayout::under(temp.path());
        layout.ensure().unwrap();
        let path = layout.input_dir.join("a.txt");
        fs::write(&path, "calm").unwrap();
        let event = FileEvent::new("a.txt", path, b"calm".to_vec());

        let delivery = route(
            &AlwaysFail,
            &Dispatcher::from_layout(&layout, CollisionPolicy::Overwrite),
            &event,
        )
        .unwrap();
        assert_eq!(delivery.sink, Sink::Errors);
    }

    #[test]
    fn test_route_contains_processor_panic() {
        struct Brittle;
        impl Processor for Brittle {
            fn process(&self, event: &FileEvent) -> ProcessingOutcome {
                if event.content == b"poison" {
                    panic!("cannot digest {}", event.name);
                }
                ProcessingOutcome::Success
            }
        }

        let temp = TempDir::new().unwrap();
        let layout = DirectoryLayout::under(temp.path());
        layout.ensure().unwrap();
        let dispatcher = Dispatcher::from_layout(&layout, CollisionPolicy::Overwrite);
        let path = layout.input_dir.join("bad.txt");
        fs::write(&path, "poison").unwrap();
        let event = FileEvent::new("bad.txt", path, b"poison".to_vec());

        let delivery = route(&Brittle, &dispatcher, &event).unwrap();
        assert_eq!(delivery.sink, Sink::Errors);
        assert!(layout.error_dir.join("bad.txt").exists());
    }

    /// Source whose read error counter follows a script, one value per poll.
    struct ReadErrorSource {
        script: VecDeque<u64>,
        current: u64,
    }

    impl EventSource for ReadErrorSource {
        fn poll(&mut self) -> Result<Vec<FileEvent>> {
            if let Some(next) = self.script.pop_front() {
                self.current = next;
            }
            Ok(Vec::new())
        }

        fn read_errors(&self) -> u64 {
            self.current
        }
    }

    #[test]
    fn test_run_once_reports_read_errors_of_the_sweep() {
        let temp = TempDir::new().unwrap();
        let layout = DirectoryLayout::under(temp.path());
        let source = ReadErrorSource {
            script: VecDeque::from([3, 5, 1]),
            current: 0,
        };
        let processor = Arc::new(RuleProcessor::new(FailureRule::Never));
        let dispatcher = Dispatcher::from_layout(&layout, CollisionPolicy::Overwrite);
        let mut relay = Relay::new(source, processor, dispatcher);

        assert_eq!(relay.run_once().unwrap().stats.read_errors, 3);
        assert_eq!(relay.run_once().unwrap().stats.read_errors, 2);
        // A counter that goes backwards reports nothing rather than wrapping.
        assert_eq!(relay.run_once().unwrap().stats.read_errors, 0);
    }
}
