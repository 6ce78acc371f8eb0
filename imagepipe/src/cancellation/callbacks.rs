//! Lifecycle hooks producers attach to a request.

use parking_lot::Mutex;
use std::fmt;

/// Hooks executed at various points during the processing of a request.
///
/// Only `on_cancellation_requested` is ever triggered by the request context
/// itself; the remaining hooks have no-op defaults so implementors can be
/// reused by contexts whose parameters are mutable.
pub trait ProducerContextCallbacks: Send + Sync {
    /// Name used to identify this callback in logs and fault reports.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Called exactly once when cancellation of the request is requested.
    fn on_cancellation_requested(&self);

    /// Called when the request's prefetch flag changes.
    fn on_is_prefetch_changed(&self) {}

    /// Called when the request's priority changes.
    fn on_priority_changed(&self) {}

    /// Called when the intermediate-results flag changes.
    fn on_is_intermediate_result_expected_changed(&self) {}
}

/// Adapts a closure into [`ProducerContextCallbacks`].
///
/// The closure is `FnOnce`; the signal guarantees it runs at most once.
pub struct FnCallbacks {
    name: String,
    on_cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl FnCallbacks {
    /// Creates a named callback running `on_cancel` on cancellation.
    pub fn new<F>(name: impl Into<String>, on_cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: name.into(),
            on_cancel: Mutex::new(Some(Box::new(on_cancel))),
        }
    }

    /// Returns true if the closure has not run yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.on_cancel.lock().is_some()
    }
}

impl ProducerContextCallbacks for FnCallbacks {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_cancellation_requested(&self) {
        // Take before calling so the lock is not held across user code.
        let callback = self.on_cancel.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl fmt::Debug for FnCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCallbacks")
            .field("name", &self.name)
            .field("pending", &self.is_pending())
            .finish()
    }
}
