//! Processing step applied to every ingested file
//!
//! The step decides success or failure from content alone. What counts as a
//! failure is a [`FailureRule`] supplied by the caller; nothing is hard-coded.
//! A panic raised while evaluating the rule is caught and becomes a failure,
//! so one poisoned file cannot stop the relay.

use crate::error::{RelayError, Result};
use crate::types::{FileEvent, ProcessingOutcome};
use regex::Regex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Decides the outcome for one file.
pub trait Processor: Send + Sync {
    fn process(&self, event: &FileEvent) -> ProcessingOutcome;
}

/// Observer notified with `(file_name, content)` whenever processing fails.
///
/// Notification never influences routing.
pub trait FailureSubscriber: Send + Sync {
    fn on_failure(&self, file_name: &str, content: &[u8]);
}

impl<F> FailureSubscriber for F
where
    F: Fn(&str, &[u8]) + Send + Sync,
{
    fn on_failure(&self, file_name: &str, content: &[u8]) {
        self(file_name, content)
    }
}

type CustomRule = Arc<dyn Fn(&FileEvent) -> Option<String> + Send + Sync>;

/// Predicate deciding which content fails.
#[derive(Clone)]
pub enum FailureRule {
    /// Every file succeeds
    Never,
    /// Content contains the given text
    Contains(String),
    /// Content, read as UTF-8 with replacement, matches the regex
    Matches(Regex),
    /// Content is not valid UTF-8
    NotUtf8,
    /// Caller-supplied check returning the failure reason
    Custom(CustomRule),
}

impl FailureRule {
    /// Compile a regex rule.
    pub fn matches(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(FailureRule::Matches)
            .map_err(|e| RelayError::Config(format!("invalid fail_on pattern '{pattern}': {e}")))
    }

    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&FileEvent) -> Option<String> + Send + Sync + 'static,
    {
        FailureRule::Custom(Arc::new(check))
    }

    /// Failure reason for `event`, or `None` if it passes.
    pub fn evaluate(&self, event: &FileEvent) -> Option<String> {
        match self {
            FailureRule::Never => None,
            FailureRule::Contains(needle) => event
                .content_lossy()
                .contains(needle.as_str())
                .then(|| format!("content contains '{needle}'")),
            FailureRule::Matches(re) => re
                .is_match(&event.content_lossy())
                .then(|| format!("content matches /{}/", re.as_str())),
            FailureRule::NotUtf8 => std::str::from_utf8(&event.content)
                .err()
                .map(|e| format!("content is not valid UTF-8: {e}")),
            FailureRule::Custom(check) => check(event),
        }
    }
}

impl fmt::Debug for FailureRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureRule::Never => write!(f, "Never"),
            FailureRule::Contains(needle) => f.debug_tuple("Contains").field(needle).finish(),
            FailureRule::Matches(re) => f.debug_tuple("Matches").field(&re.as_str()).finish(),
            FailureRule::NotUtf8 => write!(f, "NotUtf8"),
            FailureRule::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Processor applying a single [`FailureRule`].
pub struct RuleProcessor {
    rule: FailureRule,
    subscriber: Option<Arc<dyn FailureSubscriber>>,
}

impl RuleProcessor {
    pub fn new(rule: FailureRule) -> Self {
        Self {
            rule,
            subscriber: None,
        }
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn FailureSubscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    fn notify(&self, event: &FileEvent) {
        let Some(subscriber) = self.subscriber.as_ref() else {
            return;
        };
        let notified = panic::catch_unwind(AssertUnwindSafe(|| {
            subscriber.on_failure(&event.name, &event.content)
        }));
        if notified.is_err() {
            warn!(file = %event.name, "Failure subscriber panicked");
        }
    }
}

impl Processor for RuleProcessor {
    fn process(&self, event: &FileEvent) -> ProcessingOutcome {
        let verdict = panic::catch_unwind(AssertUnwindSafe(|| self.rule.evaluate(event)));
        let outcome = match verdict {
            Ok(None) => ProcessingOutcome::Success,
            Ok(Some(reason)) => ProcessingOutcome::Failure(reason),
            Err(payload) => ProcessingOutcome::Failure(format!(
                "processing panicked: {}",
                panic_message(payload.as_ref())
            )),
        };

        match &outcome {
            ProcessingOutcome::Success => debug!(file = %event.name, "Processing succeeded"),
            ProcessingOutcome::Failure(reason) => {
                warn!(file = %event.name, reason = %reason, "Processing failed");
                self.notify(event);
            }
        }
        outcome
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Subscriber that records every notification, in order.
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    seen: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    pub fn notifications(&self) -> Vec<(String, Vec<u8>)> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }
}

impl FailureSubscriber for RecordingSubscriber {
    fn on_failure(&self, file_name: &str, content: &[u8]) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((file_name.to_string(), content.to_vec()));
        }
    }
}
