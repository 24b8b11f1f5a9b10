//! Polling helpers for asserting on asynchronous relay effects.

use crate::layout::{Role, TestLayout};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default timeout for a relay to pick up and route files
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between checks
const CHECK_INTERVAL: Duration = Duration::from_millis(20);

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition was met.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            debug!(?timeout, "Condition not met before timeout");
            return false;
        }
        std::thread::sleep(CHECK_INTERVAL);
    }
}

/// Wait until the input directory is empty and `expected` files have
/// reached the output and error directories combined.
pub fn wait_for_quiescence(layout: &TestLayout, expected: usize, timeout: Duration) -> bool {
    wait_for(timeout, || {
        let input = layout.files(Role::Input).map(|f| f.len()).unwrap_or(usize::MAX);
        let routed = layout.files(Role::Output).map(|f| f.len()).unwrap_or(0)
            + layout.files(Role::Errors).map(|f| f.len()).unwrap_or(0);
        input == 0 && routed >= expected
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_wait_for_immediate_and_timeout() {
        assert!(wait_for(Duration::from_millis(10), || true));
        assert!(!wait_for(Duration::from_millis(50), || false));
    }

    #[test]
    fn test_wait_for_eventually() {
        let mut calls = 0;
        assert!(wait_for(Duration::from_secs(1), || {
            calls += 1;
            calls >= 3
        }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_quiescence_counts_both_sinks() {
        let layout = TestLayout::new().unwrap();
        fs::write(layout.path(Role::Output, "a.txt"), "a").unwrap();
        fs::write(layout.path(Role::Errors, "b.txt"), "b").unwrap();
        assert!(wait_for_quiescence(&layout, 2, Duration::from_millis(50)));

        fs::write(layout.path(Role::Input, "c.txt"), "c").unwrap();
        assert!(!wait_for_quiescence(&layout, 2, Duration::from_millis(50)));
    }
}
