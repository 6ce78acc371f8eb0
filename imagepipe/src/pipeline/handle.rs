//! Caller-side handle of a running request.

use crate::context::RequestContext;
use crate::errors::{PipelineError, PipelineResult};
use crate::producers::ConsumerEvent;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Handle returned by [`ImagePipeline::fetch`](super::ImagePipeline::fetch).
///
/// Dropping the handle does not cancel the request.
pub struct RequestHandle<T> {
    ctx: Arc<RequestContext>,
    events: mpsc::UnboundedReceiver<ConsumerEvent<T>>,
}

impl<T> RequestHandle<T> {
    pub(crate) fn new(ctx: Arc<RequestContext>, events: mpsc::UnboundedReceiver<ConsumerEvent<T>>) -> Self {
        Self { ctx, events }
    }

    /// Returns the request's context.
    #[must_use]
    pub fn context(&self) -> &Arc<RequestContext> {
        &self.ctx
    }

    /// Returns the request id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.ctx.id()
    }

    /// Cancels the request. Returns false if it was already cancelled.
    pub fn cancel(&self) -> bool {
        self.ctx.cancel()
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_cancellation_requested()
    }

    /// Waits for the next consumer event.
    ///
    /// Returns `None` once the producer is done and all events were read.
    pub async fn next_event(&mut self) -> Option<ConsumerEvent<T>> {
        self.events.recv().await
    }

    /// Waits for the final result, skipping intermediate results and
    /// progress updates.
    pub async fn result(mut self) -> PipelineResult<T> {
        while let Some(event) = self.events.recv().await {
            match event {
                ConsumerEvent::Result { value, status } if status.is_last => return Ok(value),
                ConsumerEvent::Result { .. } | ConsumerEvent::Progress(_) => {}
                ConsumerEvent::Failure(error) => return Err(PipelineError::Producer(error)),
                ConsumerEvent::Cancellation => return Err(PipelineError::cancelled(self.ctx.id())),
            }
        }

        if self.ctx.is_cancellation_requested() {
            Err(PipelineError::cancelled(self.ctx.id()))
        } else {
            Err(PipelineError::ChannelClosed {
                request_id: self.ctx.id().to_string(),
            })
        }
    }
}

impl<T> Stream for RequestHandle<T> {
    type Item = ConsumerEvent<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for RequestHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.ctx.id())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
