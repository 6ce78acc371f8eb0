//! Fan-out listener.

use super::{ExtraMap, ProducerListener};
use crate::context::RequestContext;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Forwards every event to a list of listeners.
///
/// A listener that panics is logged and skipped; the remaining listeners
/// still receive the event.
#[derive(Default, Clone)]
pub struct ForwardingProducerListener {
    listeners: Vec<Arc<dyn ProducerListener>>,
}

impl ForwardingProducerListener {
    /// Creates a forwarding listener over `listeners`.
    #[must_use]
    pub fn new(listeners: Vec<Arc<dyn ProducerListener>>) -> Self {
        Self { listeners }
    }

    /// Adds a listener.
    #[must_use]
    pub fn with(mut self, listener: Arc<dyn ProducerListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Returns the number of wrapped listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if no listener is wrapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn for_each(&self, method: &str, f: impl Fn(&dyn ProducerListener)) {
        for listener in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                warn!(method, "Producer listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for ForwardingProducerListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingProducerListener")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ProducerListener for ForwardingProducerListener {
    fn on_request_start(&self, ctx: &RequestContext) {
        self.for_each("on_request_start", |l| l.on_request_start(ctx));
    }

    fn on_producer_start(&self, ctx: &RequestContext, producer: &str) {
        self.for_each("on_producer_start", |l| l.on_producer_start(ctx, producer));
    }

    fn on_producer_event(&self, ctx: &RequestContext, producer: &str, event: &str) {
        self.for_each("on_producer_event", |l| l.on_producer_event(ctx, producer, event));
    }

    fn on_producer_finish_with_success(
        &self,
        ctx: &RequestContext,
        producer: &str,
        extras: Option<ExtraMap>,
    ) {
        self.for_each("on_producer_finish_with_success", |l| {
            l.on_producer_finish_with_success(ctx, producer, extras.clone());
        });
    }

    fn on_producer_finish_with_failure(
        &self,
        ctx: &RequestContext,
        producer: &str,
        error: &anyhow::Error,
        extras: Option<ExtraMap>,
    ) {
        self.for_each("on_producer_finish_with_failure", |l| {
            l.on_producer_finish_with_failure(ctx, producer, error, extras.clone());
        });
    }

    fn on_producer_finish_with_cancellation(
        &self,
        ctx: &RequestContext,
        producer: &str,
        extras: Option<ExtraMap>,
    ) {
        self.for_each("on_producer_finish_with_cancellation", |l| {
            l.on_producer_finish_with_cancellation(ctx, producer, extras.clone());
        });
    }

    fn on_ultimate_producer_reached(&self, ctx: &RequestContext, producer: &str, successful: bool) {
        self.for_each("on_ultimate_producer_reached", |l| {
            l.on_ultimate_producer_reached(ctx, producer, successful);
        });
    }

    fn on_request_cancellation(&self, ctx: &RequestContext) {
        self.for_each("on_request_cancellation", |l| l.on_request_cancellation(ctx));
    }

    fn requires_extra_map(&self, ctx: &RequestContext, producer: &str) -> bool {
        self.listeners
            .iter()
            .any(|l| l.requires_extra_map(ctx, producer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{CollectingProducerListener, NoOpProducerListener};
    use crate::testing::TestRequest;

    struct PanickingListener;

    impl ProducerListener for PanickingListener {
        fn on_producer_start(&self, _ctx: &RequestContext, _producer: &str) {
            panic!("listener bug");
        }
    }

    #[test]
    fn test_forwards_to_all() {
        let a = Arc::new(CollectingProducerListener::new());
        let b = Arc::new(CollectingProducerListener::new());
        let forwarding = ForwardingProducerListener::new(vec![a.clone() as Arc<dyn ProducerListener>, b.clone()]);
        let ctx = TestRequest::new().build();

        forwarding.on_producer_start(&ctx, "fetch");
        forwarding.on_request_cancellation(&ctx);

        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(forwarding.len(), 2);
    }

    #[test]
    fn test_panicking_listener_isolated() {
        let collecting = Arc::new(CollectingProducerListener::new());
        let forwarding = ForwardingProducerListener::default()
            .with(Arc::new(PanickingListener))
            .with(collecting.clone());
        let ctx = TestRequest::new().build();

        forwarding.on_producer_start(&ctx, "fetch");
        assert_eq!(collecting.len(), 1);
    }

    #[test]
    fn test_requires_extra_map_any() {
        let ctx = TestRequest::new().build();
        let noop_only = ForwardingProducerListener::default().with(Arc::new(NoOpProducerListener));
        assert!(!noop_only.requires_extra_map(&ctx, "fetch"));

        let mixed = noop_only.with(Arc::new(CollectingProducerListener::new()));
        assert!(mixed.requires_extra_map(&ctx, "fetch"));
    }
}
