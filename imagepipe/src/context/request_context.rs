//! The per-request context shared by every producer of a request.

use super::{keys, ExtraDataBag, HasExtraData};
use crate::cancellation::{CancellationSignal, DeliveryReport, SharedCallbacks};
use crate::config::PipelineConfig;
use crate::core::{EncodedImageOrigin, ImageRequest, Priority, RequestLevel};
use crate::listener::{NoOpProducerListener, ProducerListener};
use parking_lot::RwLock;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Opaque caller-supplied handle, never inspected by the pipeline.
pub type CallerContext = Arc<dyn Any + Send + Sync>;

/// Context passed to every producer working on one request.
///
/// Exactly one instance exists per client request. It is created by the
/// pipeline entry point through [`RequestContextBuilder`] and shared by
/// `Arc`; producers never build their own. All request parameters are
/// immutable; the mutable parts (encoded image origin, extras, cancellation)
/// are internally synchronized.
pub struct RequestContext {
    request: ImageRequest,
    id: String,
    ui_component_id: Option<String>,
    caller_context: Option<CallerContext>,
    priority: Priority,
    lowest_permitted_level: RequestLevel,
    is_prefetch: bool,
    is_intermediate_result_expected: bool,
    config: Arc<PipelineConfig>,
    listener: Arc<dyn ProducerListener>,
    encoded_image_origin: RwLock<EncodedImageOrigin>,
    extra_data: ExtraDataBag,
    cancellation: CancellationSignal,
}

impl RequestContext {
    /// Starts building a context for `request`.
    #[must_use]
    pub fn builder(request: ImageRequest) -> RequestContextBuilder {
        RequestContextBuilder::new(request)
    }

    /// Returns the image request being executed.
    #[must_use]
    pub fn image_request(&self) -> &ImageRequest {
        &self.request
    }

    /// Returns the id of this request.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the id of the UI component requesting the image, if any.
    #[must_use]
    pub fn ui_component_id(&self) -> Option<&str> {
        self.ui_component_id.as_deref()
    }

    /// Returns the caller's opaque context handle.
    #[must_use]
    pub fn caller_context(&self) -> Option<&CallerContext> {
        self.caller_context.as_ref()
    }

    /// Downcasts the caller context to a concrete type.
    #[must_use]
    pub fn caller_context_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.caller_context.as_deref()?.downcast_ref::<T>()
    }

    /// Returns the priority of the request.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the lowest permitted request level.
    #[must_use]
    pub fn lowest_permitted_request_level(&self) -> RequestLevel {
        self.lowest_permitted_level
    }

    /// Returns true if the request is a prefetch.
    #[must_use]
    pub fn is_prefetch(&self) -> bool {
        self.is_prefetch
    }

    /// Returns true if the request's owner expects intermediate results.
    #[must_use]
    pub fn is_intermediate_result_expected(&self) -> bool {
        self.is_intermediate_result_expected
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn image_pipeline_config(&self) -> &Arc<PipelineConfig> {
        &self.config
    }

    /// Returns the listener producers report their events to.
    #[must_use]
    pub fn producer_listener(&self) -> &Arc<dyn ProducerListener> {
        &self.listener
    }

    /// Returns where the current encoded bytes came from.
    #[must_use]
    pub fn encoded_image_origin(&self) -> EncodedImageOrigin {
        *self.encoded_image_origin.read()
    }

    /// Records where the current encoded bytes came from. Last writer wins.
    pub fn set_encoded_image_origin(&self, origin: EncodedImageOrigin) {
        *self.encoded_image_origin.write() = origin;
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.cancellation.is_cancellation_requested()
    }

    /// Returns a future resolving once the request is cancelled.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        self.cancellation.cancelled()
    }

    /// Returns the number of callbacks still awaiting cancellation.
    ///
    /// The signal itself stays private: stages register through
    /// [`add_callbacks`](Self::add_callbacks) and cancel through
    /// [`cancel`](Self::cancel) so faults reach the listener.
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.cancellation.registered_count()
    }

    /// Registers lifecycle callbacks.
    ///
    /// If the request is already cancelled the callbacks run immediately.
    /// A panicking callback is reported to the listener.
    pub fn add_callbacks(&self, callbacks: SharedCallbacks) {
        let report = self.cancellation.add_callback(callbacks);
        self.report_faults(&report);
    }

    /// Registers several callbacks at once.
    pub fn add_callbacks_all<I>(&self, callbacks: I)
    where
        I: IntoIterator<Item = SharedCallbacks>,
    {
        let report = self.cancellation.add_callbacks(callbacks);
        self.report_faults(&report);
    }

    /// Requests cancellation of the request.
    ///
    /// Returns true if this call performed the transition. Later calls are
    /// no-ops returning false.
    pub fn cancel(&self) -> bool {
        let Some(report) = self.cancellation.request_cancellation() else {
            return false;
        };

        debug!(
            request_id = %self.id,
            callbacks = report.invoked_count(),
            faults = report.faults().len(),
            "Request cancelled"
        );
        self.report_faults(&report);
        self.listener.on_request_cancellation(self);
        true
    }

    fn report_faults(&self, report: &DeliveryReport) {
        for fault in report.faults() {
            self.listener.on_producer_event(
                self,
                &fault.callback_name,
                &self.config.callback_fault_event_name,
            );
        }
    }
}

impl HasExtraData for RequestContext {
    fn extra_data(&self) -> &ExtraDataBag {
        &self.extra_data
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("source_uri", &self.request.source_uri())
            .field("priority", &self.priority)
            .field("lowest_permitted_level", &self.lowest_permitted_level)
            .field("is_prefetch", &self.is_prefetch)
            .field("encoded_image_origin", &self.encoded_image_origin())
            .field("cancelled", &self.is_cancellation_requested())
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestContext`].
///
/// Everything but the image request has a default: a fresh UUID id, the
/// request's own priority and level, no prefetch, no intermediate results,
/// a no-op listener and the default configuration.
pub struct RequestContextBuilder {
    request: ImageRequest,
    id: Option<String>,
    ui_component_id: Option<String>,
    caller_context: Option<CallerContext>,
    priority: Option<Priority>,
    lowest_permitted_level: RequestLevel,
    is_prefetch: bool,
    is_intermediate_result_expected: bool,
    config: Option<Arc<PipelineConfig>>,
    listener: Option<Arc<dyn ProducerListener>>,
}

impl RequestContextBuilder {
    /// Creates a builder for `request`.
    #[must_use]
    pub fn new(request: ImageRequest) -> Self {
        Self {
            request,
            id: None,
            ui_component_id: None,
            caller_context: None,
            priority: None,
            lowest_permitted_level: RequestLevel::FullFetch,
            is_prefetch: false,
            is_intermediate_result_expected: false,
            config: None,
            listener: None,
        }
    }

    /// Sets the request id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the UI component id.
    #[must_use]
    pub fn ui_component_id(mut self, id: impl Into<String>) -> Self {
        self.ui_component_id = Some(id.into());
        self
    }

    /// Sets the opaque caller context.
    #[must_use]
    pub fn caller_context(mut self, caller_context: CallerContext) -> Self {
        self.caller_context = Some(caller_context);
        self
    }

    /// Overrides the request's priority.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the caller's lowest permitted level.
    ///
    /// The effective level is the more restrictive of this and the request's.
    #[must_use]
    pub fn lowest_permitted_level(mut self, level: RequestLevel) -> Self {
        self.lowest_permitted_level = level;
        self
    }

    /// Marks the request as a prefetch.
    #[must_use]
    pub fn prefetch(mut self, is_prefetch: bool) -> Self {
        self.is_prefetch = is_prefetch;
        self
    }

    /// Sets whether intermediate results are expected.
    #[must_use]
    pub fn intermediate_results_expected(mut self, expected: bool) -> Self {
        self.is_intermediate_result_expected = expected;
        self
    }

    /// Sets the pipeline configuration.
    #[must_use]
    pub fn config(mut self, config: Arc<PipelineConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the listener.
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn ProducerListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Builds the shared context and seeds the id and source extras.
    #[must_use]
    pub fn build(self) -> Arc<RequestContext> {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let priority = self.priority.unwrap_or_else(|| self.request.priority());
        let lowest_permitted_level = RequestLevel::max(
            self.request.lowest_permitted_request_level(),
            self.lowest_permitted_level,
        );

        let extra_data = ExtraDataBag::new();
        extra_data.put(keys::ID, id.clone());
        extra_data.put(keys::URI_SOURCE, self.request.source_uri());

        Arc::new(RequestContext {
            request: self.request,
            id,
            ui_component_id: self.ui_component_id,
            caller_context: self.caller_context,
            priority,
            lowest_permitted_level,
            is_prefetch: self.is_prefetch,
            is_intermediate_result_expected: self.is_intermediate_result_expected,
            config: self.config.unwrap_or_default(),
            listener: self
                .listener
                .unwrap_or_else(|| Arc::new(NoOpProducerListener) as Arc<dyn ProducerListener>),
            encoded_image_origin: RwLock::new(EncodedImageOrigin::Unknown),
            extra_data,
            cancellation: CancellationSignal::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::MockProducerListener;
    use crate::testing::CountingCallbacks;
    use serde_json::json;

    fn request() -> ImageRequest {
        ImageRequest::new("https://cdn.example.com/cat.jpg")
    }

    #[test]
    fn test_builder_defaults() {
        let ctx = RequestContext::builder(request()).build();

        assert!(Uuid::parse_str(ctx.id()).is_ok());
        assert_eq!(ctx.priority(), Priority::High);
        assert_eq!(ctx.lowest_permitted_request_level(), RequestLevel::FullFetch);
        assert!(!ctx.is_prefetch());
        assert!(!ctx.is_intermediate_result_expected());
        assert!(ctx.ui_component_id().is_none());
        assert!(ctx.caller_context().is_none());
        assert_eq!(ctx.encoded_image_origin(), EncodedImageOrigin::Unknown);
        assert!(!ctx.is_cancellation_requested());
    }

    #[test]
    fn test_builder_seeds_extras() {
        let ctx = RequestContext::builder(request()).id("req-1").build();

        assert_eq!(ctx.get_extra(keys::ID), Some(json!("req-1")));
        assert_eq!(
            ctx.get_extra(keys::URI_SOURCE),
            Some(json!("https://cdn.example.com/cat.jpg"))
        );
    }

    #[test]
    fn test_lowest_level_is_most_restrictive() {
        let ctx = RequestContext::builder(
            request().with_lowest_permitted_request_level(RequestLevel::DiskCache),
        )
        .lowest_permitted_level(RequestLevel::FullFetch)
        .build();
        assert_eq!(ctx.lowest_permitted_request_level(), RequestLevel::DiskCache);

        let ctx = RequestContext::builder(request())
            .lowest_permitted_level(RequestLevel::BitmapMemoryCache)
            .build();
        assert_eq!(ctx.lowest_permitted_request_level(), RequestLevel::BitmapMemoryCache);
    }

    #[test]
    fn test_caller_context_downcast() {
        #[derive(Debug, PartialEq)]
        struct Screen(&'static str);

        let ctx = RequestContext::builder(request())
            .caller_context(Arc::new(Screen("feed")))
            .build();

        assert_eq!(ctx.caller_context_as::<Screen>(), Some(&Screen("feed")));
        assert!(ctx.caller_context_as::<String>().is_none());
    }

    #[test]
    fn test_encoded_image_origin_last_writer_wins() {
        let ctx = RequestContext::builder(request()).build();
        ctx.set_encoded_image_origin(EncodedImageOrigin::Disk);
        ctx.set_encoded_image_origin(EncodedImageOrigin::Network);
        assert_eq!(ctx.encoded_image_origin(), EncodedImageOrigin::Network);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let ctx = RequestContext::builder(request()).build();
        let cb = Arc::new(CountingCallbacks::new("stage"));
        ctx.add_callbacks(cb.clone());

        assert!(ctx.cancel());
        assert!(!ctx.cancel());
        assert!(ctx.is_cancellation_requested());
        assert_eq!(cb.count(), 1);
    }

    #[test]
    fn test_callback_fault_reported_to_listener() {
        let mut listener = MockProducerListener::new();
        listener.expect_on_request_cancellation().times(1).return_const(());
        listener
            .expect_on_producer_event()
            .withf(|_, producer, event| producer == "broken" && event == "cancellation_callback_failed")
            .times(1)
            .return_const(());

        let ctx = RequestContext::builder(request())
            .listener(Arc::new(listener))
            .build();

        ctx.add_callbacks(Arc::new(crate::cancellation::FnCallbacks::new("broken", || {
            panic!("broken callback");
        })));
        let healthy = Arc::new(CountingCallbacks::new("healthy"));
        ctx.add_callbacks(healthy.clone());

        assert!(ctx.cancel());
        assert_eq!(healthy.count(), 1);
    }

    #[test]
    fn test_late_callback_fault_reported_to_listener() {
        let mut listener = MockProducerListener::new();
        listener.expect_on_request_cancellation().times(1).return_const(());
        listener
            .expect_on_producer_event()
            .withf(|_, producer, _| producer == "late")
            .times(1)
            .return_const(());

        let ctx = RequestContext::builder(request())
            .listener(Arc::new(listener))
            .build();
        ctx.cancel();

        ctx.add_callbacks(Arc::new(crate::cancellation::FnCallbacks::new("late", || {
            panic!("late failure");
        })));
    }

    #[test]
    fn test_debug_does_not_expose_caller_context() {
        let ctx = RequestContext::builder(request()).id("dbg").build();
        let debug = format!("{ctx:?}");
        assert!(debug.contains("dbg"));
        assert!(debug.contains("cat.jpg"));
    }
}
