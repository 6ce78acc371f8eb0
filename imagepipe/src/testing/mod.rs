//! Testing utilities for producers and request contexts.
//!
//! This module provides:
//! - A request context fixture with test-friendly defaults
//! - Callbacks that count cancellation deliveries

mod fixtures;

pub use fixtures::{CountingCallbacks, TestRequest, TEST_IMAGE_URI};
