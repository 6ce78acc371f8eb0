//! Test fixtures for producer and context testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cancellation::ProducerContextCallbacks;
use crate::config::PipelineConfig;
use crate::context::RequestContext;
use crate::core::{ImageRequest, Priority, RequestLevel};
use crate::listener::ProducerListener;

/// Default URI used by [`TestRequest`].
pub const TEST_IMAGE_URI: &str = "https://images.example.com/test.jpg";

/// A request context builder with test-friendly defaults.
#[derive(Default)]
pub struct TestRequest {
    uri: Option<String>,
    id: Option<String>,
    priority: Option<Priority>,
    level: Option<RequestLevel>,
    prefetch: bool,
    intermediate: bool,
    listener: Option<Arc<dyn ProducerListener>>,
    config: Option<PipelineConfig>,
}

impl TestRequest {
    /// Creates a new test request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Sets the request id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the lowest permitted level.
    #[must_use]
    pub fn with_level(mut self, level: RequestLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Marks the request as a prefetch.
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Sets whether intermediate results are expected.
    #[must_use]
    pub fn with_intermediate_results(mut self, expected: bool) -> Self {
        self.intermediate = expected;
        self
    }

    /// Sets the listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ProducerListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Returns the image request this fixture would use.
    #[must_use]
    pub fn image_request(&self) -> ImageRequest {
        ImageRequest::new(self.uri.clone().unwrap_or_else(|| TEST_IMAGE_URI.to_string()))
    }

    /// Builds the shared context.
    #[must_use]
    pub fn build(self) -> Arc<RequestContext> {
        let mut builder = RequestContext::builder(self.image_request())
            .prefetch(self.prefetch)
            .intermediate_results_expected(self.intermediate);

        if let Some(id) = self.id {
            builder = builder.id(id);
        }
        if let Some(priority) = self.priority {
            builder = builder.priority(priority);
        }
        if let Some(level) = self.level {
            builder = builder.lowest_permitted_level(level);
        }
        if let Some(listener) = self.listener {
            builder = builder.listener(listener);
        }
        if let Some(config) = self.config {
            builder = builder.config(Arc::new(config));
        }

        builder.build()
    }
}

/// Callbacks counting how often cancellation was delivered.
#[derive(Debug)]
pub struct CountingCallbacks {
    label: String,
    count: AtomicUsize,
}

impl CountingCallbacks {
    /// Creates a counter with the given name.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            count: AtomicUsize::new(0),
        }
    }

    /// Returns the number of deliveries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Returns the callback name.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl ProducerContextCallbacks for CountingCallbacks {
    fn name(&self) -> &str {
        &self.label
    }

    fn on_cancellation_requested(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
