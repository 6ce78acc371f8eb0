//! Consumers receive the results producers generate.

use crate::context::{HasExtraData, RequestContext};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Flags attached to a delivered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumerStatus {
    /// This is the final result; the consumer finishes.
    pub is_last: bool,
    /// The result is a low-quality stand-in for the real image.
    pub is_placeholder: bool,
}

impl ConsumerStatus {
    /// Status of a final result.
    pub const LAST: Self = Self {
        is_last: true,
        is_placeholder: false,
    };

    /// Status of an intermediate result.
    pub const INTERMEDIATE: Self = Self {
        is_last: false,
        is_placeholder: false,
    };

    /// Status of a placeholder result.
    pub const PLACEHOLDER: Self = Self {
        is_last: false,
        is_placeholder: true,
    };
}

/// Output sink of a producer.
///
/// A consumer finishes after a final result, a failure or a cancellation.
/// Implementations ignore anything delivered after that.
pub trait Consumer<T>: Send + Sync {
    /// Delivers a new result.
    fn on_new_result(&self, result: T, status: ConsumerStatus);

    /// Reports that the producer failed.
    fn on_failure(&self, error: anyhow::Error);

    /// Reports that the producer stopped because of cancellation.
    fn on_cancellation(&self);

    /// Reports progress in `[0.0, 1.0]`.
    fn on_progress_update(&self, _progress: f32) {}
}

/// An event forwarded by [`ChannelConsumer`].
#[derive(Debug)]
pub enum ConsumerEvent<T> {
    /// `on_new_result`.
    Result {
        /// The result.
        value: T,
        /// Its status flags.
        status: ConsumerStatus,
    },
    /// `on_failure`.
    Failure(anyhow::Error),
    /// `on_cancellation`.
    Cancellation,
    /// `on_progress_update`.
    Progress(f32),
}

impl<T> ConsumerEvent<T> {
    /// Returns true if this event finishes the consumer.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Result { status, .. } => status.is_last,
            Self::Failure(_) | Self::Cancellation => true,
            Self::Progress(_) => false,
        }
    }
}

/// A consumer that forwards every event into a channel.
pub struct ChannelConsumer<T> {
    tx: mpsc::UnboundedSender<ConsumerEvent<T>>,
    finished: AtomicBool,
}

impl<T: Send + 'static> ChannelConsumer<T> {
    /// Creates a consumer and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConsumerEvent<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                finished: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Returns true once a terminal event was forwarded.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn forward(&self, event: ConsumerEvent<T>) {
        if event.is_terminal() {
            if self.finished.swap(true, Ordering::SeqCst) {
                return;
            }
        } else if self.is_finished() {
            return;
        }
        // The receiver may be gone if the caller stopped listening.
        let _ = self.tx.send(event);
    }
}

impl<T: Send + 'static> Consumer<T> for ChannelConsumer<T> {
    fn on_new_result(&self, result: T, status: ConsumerStatus) {
        self.forward(ConsumerEvent::Result {
            value: result,
            status,
        });
    }

    fn on_failure(&self, error: anyhow::Error) {
        self.forward(ConsumerEvent::Failure(error));
    }

    fn on_cancellation(&self) {
        self.forward(ConsumerEvent::Cancellation);
    }

    fn on_progress_update(&self, progress: f32) {
        self.forward(ConsumerEvent::Progress(progress.clamp(0.0, 1.0)));
    }
}

/// Wraps a consumer and reports its terminal events to the request's
/// listener on behalf of one producer.
///
/// Reporting begins with [`start`](Self::start). A cancellation that arrives
/// before the producer started is forwarded to the inner consumer without a
/// listener event, so every reported cancellation has a matching start.
pub struct ReportingConsumer<T> {
    inner: Arc<dyn Consumer<T>>,
    ctx: Arc<RequestContext>,
    producer: String,
    state: AtomicU8,
}

const IDLE: u8 = 0;
const STARTED: u8 = 1;
const FINISHED: u8 = 2;

impl<T> ReportingConsumer<T> {
    /// Wraps `inner` for `producer`.
    #[must_use]
    pub fn new(inner: Arc<dyn Consumer<T>>, ctx: Arc<RequestContext>, producer: impl Into<String>) -> Self {
        Self {
            inner,
            ctx,
            producer: producer.into(),
            state: AtomicU8::new(IDLE),
        }
    }

    /// Reports the producer start to the listener.
    ///
    /// Returns false without reporting if the producer already started or the
    /// consumer already finished.
    pub fn start(&self) -> bool {
        if self
            .state
            .compare_exchange(IDLE, STARTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.ctx.producer_listener().on_producer_start(&self.ctx, &self.producer);
        true
    }

    fn is_finished(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FINISHED
    }

    /// Moves to finished. Returns whether the producer had started, or `None`
    /// if the consumer was already finished.
    fn finish(&self) -> Option<bool> {
        match self.state.swap(FINISHED, Ordering::SeqCst) {
            FINISHED => None,
            previous => Some(previous == STARTED),
        }
    }

    fn extras(&self) -> Option<crate::listener::ExtraMap> {
        self.ctx
            .producer_listener()
            .requires_extra_map(&self.ctx, &self.producer)
            .then(|| self.ctx.extras())
    }
}

impl<T: Send> Consumer<T> for ReportingConsumer<T> {
    fn on_new_result(&self, result: T, status: ConsumerStatus) {
        if status.is_last {
            if self.finish().is_none() {
                return;
            }
            let listener = self.ctx.producer_listener();
            listener.on_producer_finish_with_success(&self.ctx, &self.producer, self.extras());
            listener.on_ultimate_producer_reached(&self.ctx, &self.producer, true);
        } else if self.is_finished() {
            return;
        }
        self.inner.on_new_result(result, status);
    }

    fn on_failure(&self, error: anyhow::Error) {
        if self.finish().is_none() {
            return;
        }
        let listener = self.ctx.producer_listener();
        listener.on_producer_finish_with_failure(&self.ctx, &self.producer, &error, self.extras());
        listener.on_ultimate_producer_reached(&self.ctx, &self.producer, false);
        self.inner.on_failure(error);
    }

    fn on_cancellation(&self) {
        let Some(started) = self.finish() else {
            return;
        };
        if started {
            self.ctx
                .producer_listener()
                .on_producer_finish_with_cancellation(&self.ctx, &self.producer, self.extras());
        }
        self.inner.on_cancellation();
    }

    fn on_progress_update(&self, progress: f32) {
        if !self.is_finished() {
            self.inner.on_progress_update(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{CollectingProducerListener, ListenerEventKind};
    use crate::testing::TestRequest;

    #[tokio::test]
    async fn test_channel_consumer_forwards_until_terminal() {
        let (consumer, mut rx) = ChannelConsumer::<u32>::new();

        consumer.on_progress_update(0.5);
        consumer.on_new_result(1, ConsumerStatus::INTERMEDIATE);
        consumer.on_new_result(2, ConsumerStatus::LAST);
        consumer.on_new_result(3, ConsumerStatus::LAST);
        consumer.on_failure(anyhow::anyhow!("ignored"));
        assert!(consumer.is_finished());
        drop(consumer);

        assert!(matches!(rx.recv().await, Some(ConsumerEvent::Progress(p)) if (p - 0.5).abs() < f32::EPSILON));
        assert!(matches!(
            rx.recv().await,
            Some(ConsumerEvent::Result { value: 1, status }) if !status.is_last
        ));
        assert!(matches!(
            rx.recv().await,
            Some(ConsumerEvent::Result { value: 2, status }) if status.is_last
        ));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_consumer_clamps_progress() {
        let (consumer, mut rx) = ChannelConsumer::<()>::new();
        consumer.on_progress_update(4.0);
        assert!(matches!(rx.recv().await, Some(ConsumerEvent::Progress(p)) if (p - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_terminal_events() {
        assert!(ConsumerEvent::<()>::Cancellation.is_terminal());
        assert!(ConsumerEvent::<()>::Failure(anyhow::anyhow!("x")).is_terminal());
        assert!(!ConsumerEvent::<()>::Progress(0.1).is_terminal());
        assert!(!ConsumerEvent::Result {
            value: (),
            status: ConsumerStatus::PLACEHOLDER
        }
        .is_terminal());
    }

    #[tokio::test]
    async fn test_reporting_consumer_reports_success_once() {
        let listener = Arc::new(CollectingProducerListener::new());
        let ctx = TestRequest::new().with_listener(listener.clone()).build();
        let (inner, mut rx) = ChannelConsumer::<&'static str>::new();
        let consumer = ReportingConsumer::<&'static str>::new(Arc::new(inner), ctx, "decode");
        assert!(consumer.start());
        assert!(!consumer.start());

        consumer.on_new_result("partial", ConsumerStatus::INTERMEDIATE);
        consumer.on_new_result("final", ConsumerStatus::LAST);
        consumer.on_cancellation();

        assert_eq!(
            listener.kinds_for("decode"),
            vec![
                ListenerEventKind::ProducerStart,
                ListenerEventKind::ProducerSuccess,
                ListenerEventKind::UltimateProducerReached { successful: true },
            ]
        );
        let success = &listener.events()[1];
        assert!(success.extras.as_ref().is_some_and(|e| e.contains_key("uri_source")));

        assert!(matches!(rx.recv().await, Some(ConsumerEvent::Result { value: "partial", .. })));
        assert!(matches!(rx.recv().await, Some(ConsumerEvent::Result { value: "final", .. })));
    }

    #[tokio::test]
    async fn test_reporting_consumer_failure() {
        let listener = Arc::new(CollectingProducerListener::new());
        let ctx = TestRequest::new().with_listener(listener.clone()).build();
        let (inner, mut rx) = ChannelConsumer::<u8>::new();
        let consumer = ReportingConsumer::<u8>::new(Arc::new(inner), ctx, "fetch");
        consumer.start();

        consumer.on_failure(anyhow::anyhow!("404"));

        assert_eq!(
            listener.kinds_for("fetch"),
            vec![
                ListenerEventKind::ProducerStart,
                ListenerEventKind::ProducerFailure {
                    error: "404".to_string()
                },
                ListenerEventKind::UltimateProducerReached { successful: false },
            ]
        );
        assert!(matches!(rx.recv().await, Some(ConsumerEvent::Failure(_))));
    }

    #[test]
    fn test_reporting_consumer_cancellation() {
        let listener = Arc::new(CollectingProducerListener::new());
        let ctx = TestRequest::new().with_listener(listener.clone()).build();
        let (inner, _rx) = ChannelConsumer::<u8>::new();
        let consumer = ReportingConsumer::<u8>::new(Arc::new(inner), ctx, "resize");
        consumer.start();

        consumer.on_cancellation();
        consumer.on_cancellation();
        consumer.on_new_result(1, ConsumerStatus::LAST);

        assert_eq!(
            listener.kinds_for("resize"),
            vec![
                ListenerEventKind::ProducerStart,
                ListenerEventKind::ProducerCancellation
            ]
        );
    }

    #[tokio::test]
    async fn test_cancellation_before_start_is_not_reported() {
        let listener = Arc::new(CollectingProducerListener::new());
        let ctx = TestRequest::new().with_listener(listener.clone()).build();
        let (inner, mut rx) = ChannelConsumer::<u8>::new();
        let consumer = ReportingConsumer::<u8>::new(Arc::new(inner), ctx, "queued");

        consumer.on_cancellation();
        assert!(!consumer.start());

        assert!(listener.kinds_for("queued").is_empty());
        assert!(matches!(rx.recv().await, Some(ConsumerEvent::Cancellation)));
    }
}
