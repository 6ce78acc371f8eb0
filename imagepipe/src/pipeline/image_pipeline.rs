//! Entry point that turns image requests into running producer chains.

use super::handle::RequestHandle;
use crate::cancellation::FnCallbacks;
use crate::config::PipelineConfig;
use crate::context::{CallerContext, RequestContext};
use crate::core::{ImageRequest, Priority, RequestLevel};
use crate::errors::PipelineResult;
use crate::listener::ProducerListener;
use crate::producers::{ChannelConsumer, Consumer, Producer, ReportingConsumer};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Per-fetch parameters supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Id of the UI component that issued the request.
    pub ui_component_id: Option<String>,
    /// Opaque caller handle passed through to producers.
    pub caller_context: Option<CallerContext>,
    /// Priority override; the request's own priority otherwise.
    pub priority: Option<Priority>,
    /// Lowest level the caller accepts.
    pub lowest_permitted_level: RequestLevel,
    /// Whether this is a prefetch.
    pub is_prefetch: bool,
    /// Whether the caller wants intermediate results.
    pub is_intermediate_result_expected: bool,
}

impl FetchOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a prefetch request.
    #[must_use]
    pub fn prefetch() -> Self {
        Self {
            is_prefetch: true,
            priority: Some(Priority::Low),
            ..Self::default()
        }
    }

    /// Sets the UI component id.
    #[must_use]
    pub fn with_ui_component_id(mut self, id: impl Into<String>) -> Self {
        self.ui_component_id = Some(id.into());
        self
    }

    /// Sets the caller context.
    #[must_use]
    pub fn with_caller_context(mut self, caller_context: CallerContext) -> Self {
        self.caller_context = Some(caller_context);
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
    pub fn with_lowest_permitted_level(mut self, level: RequestLevel) -> Self {
        self.lowest_permitted_level = level;
        self
    }

    /// Requests intermediate results.
    #[must_use]
    pub fn with_intermediate_results(mut self) -> Self {
        self.is_intermediate_result_expected = true;
        self
    }
}

/// Runs producers for image requests.
///
/// Every call to [`fetch`](Self::fetch) builds exactly one
/// [`RequestContext`] and hands it to the producer on a tokio task.
pub struct ImagePipeline {
    config: Arc<PipelineConfig>,
    listener: Arc<dyn ProducerListener>,
    permits: Arc<Semaphore>,
}

impl ImagePipeline {
    /// Creates a pipeline after validating `config`.
    pub fn new(config: PipelineConfig, listener: Arc<dyn ProducerListener>) -> PipelineResult<Self> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_requests));
        Ok(Self {
            config: Arc::new(config),
            listener,
            permits,
        })
    }

    /// Returns the configuration shared with every request.
    #[must_use]
    pub fn config(&self) -> &Arc<PipelineConfig> {
        &self.config
    }

    /// Returns the number of requests that could start right now.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Starts `producer` for `request`.
    ///
    /// Must be called from within a tokio runtime. Prefetch requests are
    /// cancelled up front when prefetching is disabled.
    pub fn fetch<T>(
        &self,
        request: ImageRequest,
        producer: Arc<dyn Producer<T>>,
        options: FetchOptions,
    ) -> RequestHandle<T>
    where
        T: Send + 'static,
    {
        let ctx = self.build_context(request, options);
        self.listener.on_request_start(&ctx);

        let (channel, events) = ChannelConsumer::<T>::new();
        let consumer = Arc::new(ReportingConsumer::new(
            Arc::new(channel) as Arc<dyn Consumer<T>>,
            ctx.clone(),
            producer.name(),
        ));

        let weak = Arc::downgrade(&consumer);
        ctx.add_callbacks(Arc::new(FnCallbacks::new("request-handle", move || {
            if let Some(consumer) = weak.upgrade() {
                consumer.on_cancellation();
            }
        })));

        let handle = RequestHandle::new(ctx.clone(), events);

        if ctx.is_prefetch() && !self.config.prefetch_enabled {
            debug!(request_id = %ctx.id(), "Prefetch disabled, cancelling request");
            ctx.cancel();
            return handle;
        }

        debug!(
            request_id = %ctx.id(),
            producer = %producer.name(),
            priority = %ctx.priority(),
            "Request started"
        );

        let permits = self.permits.clone();
        tokio::spawn(async move {
            let permit = tokio::select! {
                permit = permits.acquire_owned() => permit,
                () = ctx.cancelled() => return,
            };
            let Ok(_permit) = permit else {
                return;
            };
            if ctx.is_cancellation_requested() || !consumer.start() {
                return;
            }

            producer.produce_results(consumer as Arc<dyn Consumer<T>>, ctx).await;
        });

        handle
    }

    fn build_context(&self, request: ImageRequest, options: FetchOptions) -> Arc<RequestContext> {
        let mut builder = RequestContext::builder(request)
            .lowest_permitted_level(options.lowest_permitted_level)
            .prefetch(options.is_prefetch)
            .intermediate_results_expected(options.is_intermediate_result_expected)
            .config(self.config.clone())
            .listener(self.listener.clone());

        if let Some(id) = options.ui_component_id {
            builder = builder.ui_component_id(id);
        }
        if let Some(caller_context) = options.caller_context {
            builder = builder.caller_context(caller_context);
        }
        if let Some(priority) = options.priority {
            builder = builder.priority(priority);
        }

        builder.build()
    }
}

impl std::fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePipeline")
            .field("config", &self.config)
            .field("available_permits", &self.available_permits())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::NoOpProducerListener;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = PipelineConfig::new().with_max_concurrent_requests(0);
        assert!(ImagePipeline::new(config, Arc::new(NoOpProducerListener)).is_err());
    }

    #[test]
    fn test_permits_follow_config() {
        let config = PipelineConfig::new().with_max_concurrent_requests(3);
        let pipeline = ImagePipeline::new(config, Arc::new(NoOpProducerListener)).unwrap();
        assert_eq!(pipeline.available_permits(), 3);
        assert_eq!(pipeline.config().max_concurrent_requests, 3);
    }

    #[test]
    fn test_prefetch_options() {
        let options = FetchOptions::prefetch();
        assert!(options.is_prefetch);
        assert_eq!(options.priority, Some(Priority::Low));
        assert!(!options.is_intermediate_result_expected);
    }
}
