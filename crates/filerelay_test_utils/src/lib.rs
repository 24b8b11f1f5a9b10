//! Filerelay Test Utilities
//!
//! Isolated directory layouts and polling helpers for tests that drive a
//! relay through the filesystem.
//!
//! # Usage
//!
//! ```rust,ignore
//! use filerelay_test_utils::{wait_for, Role, TestLayout, DEFAULT_TIMEOUT};
//!
//! let layout = TestLayout::new().unwrap();
//! let handle = filerelay::Relay::from_config(&layout.config()).unwrap().spawn().unwrap();
//!
//! layout.writer().write("a.txt", "hello").unwrap();
//! assert!(wait_for(DEFAULT_TIMEOUT, || layout.contains(Role::Output, "a.txt")));
//!
//! handle.shutdown();
//! // Directories are removed when `layout` drops
//! ```

pub mod layout;
pub mod wait;

// Re-exports for convenience
pub use layout::{Role, TestLayout};
pub use wait::{wait_for, wait_for_quiescence, DEFAULT_TIMEOUT};
