//! Cooperative cancellation for a single request.
//!
//! This module provides:
//! - `CancellationSignal`, the one-way flag with exactly-once callback delivery
//! - `ProducerContextCallbacks`, the hook trait producers implement
//! - `FnCallbacks` for closure-based hooks

mod callbacks;
mod signal;

pub use callbacks::{FnCallbacks, ProducerContextCallbacks};
pub use signal::{CallbackFault, CancellationSignal, DeliveryReport, SharedCallbacks};
