//! Producer listener trait and implementations.

use crate::context::RequestContext;
use crate::observability::SpanTimer;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn, Level};

/// Extras passed along with producer completion events.
pub type ExtraMap = HashMap<String, serde_json::Value>;

/// Notification channel producers use to report their lifecycle.
///
/// Every method has a no-op default. The request context never interprets
/// these events; it only hands the same listener to every producer and
/// reports cancellation-callback faults through
/// [`on_producer_event`](Self::on_producer_event).
#[cfg_attr(test, mockall::automock)]
pub trait ProducerListener: Send + Sync {
    /// Called once when the pipeline accepts a request.
    fn on_request_start(&self, _ctx: &RequestContext) {}

    /// Called when a producer starts working on the request.
    fn on_producer_start(&self, _ctx: &RequestContext, _producer: &str) {}

    /// Called for intermediate producer events.
    fn on_producer_event(&self, _ctx: &RequestContext, _producer: &str, _event: &str) {}

    /// Called when a producer finishes successfully.
    fn on_producer_finish_with_success(
        &self,
        _ctx: &RequestContext,
        _producer: &str,
        _extras: Option<ExtraMap>,
    ) {
    }

    /// Called when a producer fails.
    fn on_producer_finish_with_failure(
        &self,
        _ctx: &RequestContext,
        _producer: &str,
        _error: &anyhow::Error,
        _extras: Option<ExtraMap>,
    ) {
    }

    /// Called when a producer stops because the request was cancelled.
    fn on_producer_finish_with_cancellation(
        &self,
        _ctx: &RequestContext,
        _producer: &str,
        _extras: Option<ExtraMap>,
    ) {
    }

    /// Called when the last producer in the chain is reached.
    fn on_ultimate_producer_reached(&self, _ctx: &RequestContext, _producer: &str, _successful: bool) {}

    /// Called once when the request transitions to cancelled.
    fn on_request_cancellation(&self, _ctx: &RequestContext) {}

    /// Returns true if producers should build an extras map for this listener.
    fn requires_extra_map(&self, _ctx: &RequestContext, _producer: &str) -> bool {
        false
    }
}

/// A listener that discards all events.
///
/// Used as the default when no listener is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProducerListener;

impl ProducerListener for NoOpProducerListener {}

/// Default bound on producer timers awaiting a finish event.
pub const DEFAULT_MAX_PENDING_TIMERS: usize = 1024;

/// A listener that logs events using the tracing framework.
///
/// Producer durations are measured between `on_producer_start` and the
/// matching finish event. Timers of a cancelled request are dropped with it,
/// and at most `max_pending_timers` are kept; the oldest is evicted first.
#[derive(Debug)]
pub struct LoggingProducerListener {
    level: Level,
    max_pending_timers: usize,
    timers: RwLock<HashMap<(String, String), SpanTimer>>,
}

impl Default for LoggingProducerListener {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LoggingProducerListener {
    /// Creates a new logging listener with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self {
            level,
            max_pending_timers: DEFAULT_MAX_PENDING_TIMERS,
            timers: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the bound on timers awaiting a finish event.
    #[must_use]
    pub fn with_max_pending_timers(mut self, max: usize) -> Self {
        self.max_pending_timers = max.max(1);
        self
    }

    /// Returns the number of producers started but not yet finished.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.read().len()
    }

    fn start_timer(&self, ctx: &RequestContext, producer: &str) {
        let key = (ctx.id().to_string(), producer.to_string());
        let mut timers = self.timers.write();
        if timers.len() >= self.max_pending_timers && !timers.contains_key(&key) {
            let oldest = timers
                .iter()
                .max_by(|a, b| a.1.elapsed_ms().total_cmp(&b.1.elapsed_ms()))
                .map(|(key, _)| key.clone());
            if let Some(evicted) = oldest {
                timers.remove(&evicted);
                debug!(request_id = %evicted.0, producer = %evicted.1, "Evicted producer timer");
            }
        }
        timers.insert(key, SpanTimer::start(producer));
    }

    /// Creates a debug-level logging listener.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging listener.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn finish_timer(&self, ctx: &RequestContext, producer: &str) -> Option<f64> {
        self.timers
            .write()
            .remove(&(ctx.id().to_string(), producer.to_string()))
            .map(SpanTimer::finish)
    }

    fn log(&self, ctx: &RequestContext, producer: Option<&str>, event: &str, duration_ms: Option<f64>) {
        let producer = producer.unwrap_or("-");
        if self.level == Level::DEBUG {
            debug!(
                request_id = %ctx.id(),
                producer = %producer,
                duration_ms = ?duration_ms,
                "Producer event: {}", event
            );
        } else {
            info!(
                request_id = %ctx.id(),
                producer = %producer,
                duration_ms = ?duration_ms,
                "Producer event: {}", event
            );
        }
    }
}

impl ProducerListener for LoggingProducerListener {
    fn on_request_start(&self, ctx: &RequestContext) {
        self.log(ctx, None, "request_start", None);
    }

    fn on_producer_start(&self, ctx: &RequestContext, producer: &str) {
        self.start_timer(ctx, producer);
        self.log(ctx, Some(producer), "producer_start", None);
    }

    fn on_producer_event(&self, ctx: &RequestContext, producer: &str, event: &str) {
        self.log(ctx, Some(producer), event, None);
    }

    fn on_producer_finish_with_success(
        &self,
        ctx: &RequestContext,
        producer: &str,
        _extras: Option<ExtraMap>,
    ) {
        let duration = self.finish_timer(ctx, producer);
        self.log(ctx, Some(producer), "producer_success", duration);
    }

    fn on_producer_finish_with_failure(
        &self,
        ctx: &RequestContext,
        producer: &str,
        error: &anyhow::Error,
        _extras: Option<ExtraMap>,
    ) {
        let duration = self.finish_timer(ctx, producer);
        warn!(
            request_id = %ctx.id(),
            producer = %producer,
            duration_ms = ?duration,
            error = %error,
            "Producer failed"
        );
    }

    fn on_producer_finish_with_cancellation(
        &self,
        ctx: &RequestContext,
        producer: &str,
        _extras: Option<ExtraMap>,
    ) {
        let duration = self.finish_timer(ctx, producer);
        self.log(ctx, Some(producer), "producer_cancellation", duration);
    }

    fn on_ultimate_producer_reached(&self, ctx: &RequestContext, producer: &str, successful: bool) {
        let event = if successful {
            "ultimate_producer_reached"
        } else {
            "ultimate_producer_failed"
        };
        self.log(ctx, Some(producer), event, None);
    }

    fn on_request_cancellation(&self, ctx: &RequestContext) {
        self.timers.write().retain(|(request_id, _), _| request_id != ctx.id());
        self.log(ctx, None, "request_cancellation", None);
    }

    fn requires_extra_map(&self, _ctx: &RequestContext, _producer: &str) -> bool {
        true
    }
}

/// Kind of a recorded listener event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListenerEventKind {
    /// `on_request_start`.
    RequestStart,
    /// `on_producer_start`.
    ProducerStart,
    /// `on_producer_event`.
    ProducerEvent {
        /// Event name.
        name: String,
    },
    /// `on_producer_finish_with_success`.
    ProducerSuccess,
    /// `on_producer_finish_with_failure`.
    ProducerFailure {
        /// Rendered error.
        error: String,
    },
    /// `on_producer_finish_with_cancellation`.
    ProducerCancellation,
    /// `on_ultimate_producer_reached`.
    UltimateProducerReached {
        /// Whether the producer succeeded.
        successful: bool,
    },
    /// `on_request_cancellation`.
    RequestCancellation,
}

/// A recorded listener event.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerEvent {
    /// Id of the request.
    pub request_id: String,
    /// Producer name, absent for request-level events.
    pub producer: Option<String>,
    /// What happened.
    pub kind: ListenerEventKind,
    /// Extras passed with the event, if any.
    pub extras: Option<ExtraMap>,
    /// When the event was recorded.
    pub at: DateTime<Utc>,
}

/// A collecting listener for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingProducerListener {
    events: RwLock<Vec<ListenerEvent>>,
}

impl CollectingProducerListener {
    /// Creates a new collecting listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the kinds of all events for one producer, in order.
    #[must_use]
    pub fn kinds_for(&self, producer: &str) -> Vec<ListenerEventKind> {
        self.events
            .read()
            .iter()
            .filter(|e| e.producer.as_deref() == Some(producer))
            .map(|e| e.kind.clone())
            .collect()
    }

    /// Counts events matching `predicate`.
    pub fn count_where(&self, predicate: impl Fn(&ListenerEvent) -> bool) -> usize {
        self.events.read().iter().filter(|e| predicate(e)).count()
    }

    fn record(
        &self,
        ctx: &RequestContext,
        producer: Option<&str>,
        kind: ListenerEventKind,
        extras: Option<ExtraMap>,
    ) {
        self.events.write().push(ListenerEvent {
            request_id: ctx.id().to_string(),
            producer: producer.map(String::from),
            kind,
            extras,
            at: Utc::now(),
        });
    }
}

impl ProducerListener for CollectingProducerListener {
    fn on_request_start(&self, ctx: &RequestContext) {
        self.record(ctx, None, ListenerEventKind::RequestStart, None);
    }

    fn on_producer_start(&self, ctx: &RequestContext, producer: &str) {
        self.record(ctx, Some(producer), ListenerEventKind::ProducerStart, None);
    }

    fn on_producer_event(&self, ctx: &RequestContext, producer: &str, event: &str) {
        self.record(
            ctx,
            Some(producer),
            ListenerEventKind::ProducerEvent {
                name: event.to_string(),
            },
            None,
        );
    }

    fn on_producer_finish_with_success(
        &self,
        ctx: &RequestContext,
        producer: &str,
        extras: Option<ExtraMap>,
    ) {
        self.record(ctx, Some(producer), ListenerEventKind::ProducerSuccess, extras);
    }

    fn on_producer_finish_with_failure(
        &self,
        ctx: &RequestContext,
        producer: &str,
        error: &anyhow::Error,
        extras: Option<ExtraMap>,
    ) {
        self.record(
            ctx,
            Some(producer),
            ListenerEventKind::ProducerFailure {
                error: error.to_string(),
            },
            extras,
        );
    }

    fn on_producer_finish_with_cancellation(
        &self,
        ctx: &RequestContext,
        producer: &str,
        extras: Option<ExtraMap>,
    ) {
        self.record(ctx, Some(producer), ListenerEventKind::ProducerCancellation, extras);
    }

    fn on_ultimate_producer_reached(&self, ctx: &RequestContext, producer: &str, successful: bool) {
        self.record(
            ctx,
            Some(producer),
            ListenerEventKind::UltimateProducerReached { successful },
            None,
        );
    }

    fn on_request_cancellation(&self, ctx: &RequestContext) {
        self.record(ctx, None, ListenerEventKind::RequestCancellation, None);
    }

    fn requires_extra_map(&self, _ctx: &RequestContext, _producer: &str) -> bool {
        true
    }
}
