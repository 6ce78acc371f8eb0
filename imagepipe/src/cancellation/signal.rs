//! One-way cancellation signal with exactly-once callback delivery.

use super::ProducerContextCallbacks;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// A callback set shared between the signal and whoever registered it.
pub type SharedCallbacks = Arc<dyn ProducerContextCallbacks>;

/// A callback that panicked during delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFault {
    /// Name reported by the faulty callback.
    pub callback_name: String,
    /// Panic message, if one could be extracted.
    pub message: String,
}

/// Outcome of delivering cancellation to a batch of callbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    delivered: Vec<String>,
    faults: Vec<CallbackFault>,
}

impl DeliveryReport {
    /// Names of callbacks that ran to completion.
    #[must_use]
    pub fn delivered(&self) -> &[String] {
        &self.delivered
    }

    /// Callbacks that panicked.
    #[must_use]
    pub fn faults(&self) -> &[CallbackFault] {
        &self.faults
    }

    /// Total number of callbacks invoked, faulty ones included.
    #[must_use]
    pub fn invoked_count(&self) -> usize {
        self.delivered.len() + self.faults.len()
    }

    /// Returns true if no callback was invoked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invoked_count() == 0
    }

    /// Returns true if at least one callback panicked.
    #[must_use]
    pub fn has_faults(&self) -> bool {
        !self.faults.is_empty()
    }

    fn merge(&mut self, other: Self) {
        self.delivered.extend(other.delivered);
        self.faults.extend(other.faults);
    }
}

/// Cancellation state shared by every producer of one request.
///
/// The flag moves from active to cancelled at most once and never back.
/// Every registered callback runs exactly once: at the transition if it was
/// registered before, or immediately on registration if it arrives late.
pub struct CancellationSignal {
    /// Fast-path flag. Only written while `callbacks` is locked.
    requested: AtomicBool,
    /// Callbacks awaiting delivery.
    callbacks: Mutex<Vec<SharedCallbacks>>,
    /// Mirrors `requested` for async waiters.
    state: watch::Sender<bool>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            requested: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            state,
        }
    }
}

impl CancellationSignal {
    /// Creates a new, active signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Requests cancellation.
    ///
    /// Only the first call performs the transition and delivers the registered
    /// callbacks; later calls return `None`. Callbacks run on the calling
    /// thread after the registration lock is released, so they may call back
    /// into the signal. Panics are caught per callback.
    pub fn request_cancellation(&self) -> Option<DeliveryReport> {
        let pending = {
            let mut callbacks = self.callbacks.lock();
            if self.requested.swap(true, Ordering::SeqCst) {
                return None;
            }
            self.state.send_replace(true);
            std::mem::take(&mut *callbacks)
        };

        debug!(callbacks = pending.len(), "Cancellation requested");
        Some(deliver(pending))
    }

    /// Registers a callback.
    ///
    /// If cancellation was already requested the callback runs immediately
    /// and the returned report describes that delivery.
    pub fn add_callback(&self, callback: SharedCallbacks) -> DeliveryReport {
        self.add_callbacks(std::iter::once(callback))
    }

    /// Registers a batch of callbacks with the same guarantee as
    /// [`add_callback`](Self::add_callback).
    pub fn add_callbacks<I>(&self, callbacks: I) -> DeliveryReport
    where
        I: IntoIterator<Item = SharedCallbacks>,
    {
        let late: Vec<SharedCallbacks> = {
            let mut registered = self.callbacks.lock();
            if self.requested.load(Ordering::SeqCst) {
                callbacks.into_iter().collect()
            } else {
                registered.extend(callbacks);
                return DeliveryReport::default();
            }
        };

        debug!(callbacks = late.len(), "Delivering late cancellation callbacks");
        deliver(late)
    }

    /// Returns a future resolving once cancellation is requested.
    ///
    /// Resolves immediately if the signal is already cancelled. If the signal
    /// is dropped while still active the future never resolves. Waiting does
    /// not register a callback, so dropping the future leaves nothing behind.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut state = self.state.subscribe();

        async move {
            let resolved = state.wait_for(|cancelled| *cancelled).await.is_ok();
            if !resolved {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Returns the number of callbacks still awaiting delivery.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.callbacks.lock().len()
    }
}

impl std::fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("cancelled", &self.is_cancellation_requested())
            .field("registered", &self.registered_count())
            .finish()
    }
}

fn deliver(callbacks: Vec<SharedCallbacks>) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for callback in callbacks {
        report.merge(deliver_one(callback.as_ref()));
    }
    report
}

fn deliver_one(callback: &dyn ProducerContextCallbacks) -> DeliveryReport {
    let name = callback.name().to_string();
    let mut report = DeliveryReport::default();

    match catch_unwind(AssertUnwindSafe(|| callback.on_cancellation_requested())) {
        Ok(()) => report.delivered.push(name),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(callback = %name, error = %message, "Cancellation callback panicked");
            report.faults.push(CallbackFault {
                callback_name: name,
                message,
            });
        }
    }

    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
