//! Producer trait and implementations.

use super::consumer::{Consumer, ConsumerStatus};
use crate::context::RequestContext;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

/// One stage of an image request.
///
/// A producer delivers its output to `consumer` and reads request
/// parameters from `ctx`. Cancellation is cooperative: producers check
/// [`RequestContext::is_cancellation_requested`] or register callbacks and
/// then call [`Consumer::on_cancellation`].
#[async_trait]
pub trait Producer<T: Send + 'static>: Send + Sync {
    /// Returns the name used in listener events.
    fn name(&self) -> &str;

    /// Starts producing results for the request.
    async fn produce_results(&self, consumer: Arc<dyn Consumer<T>>, ctx: Arc<RequestContext>);
}

/// A producer built from an async closure.
pub struct FnProducer<F> {
    name: String,
    func: F,
}

impl<F> FnProducer<F> {
    /// Creates a new function-based producer.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnProducer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProducer")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T, F, Fut> Producer<T> for FnProducer<F>
where
    T: Send + 'static,
    F: Fn(Arc<dyn Consumer<T>>, Arc<RequestContext>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_results(&self, consumer: Arc<dyn Consumer<T>>, ctx: Arc<RequestContext>) {
        (self.func)(consumer, ctx).await;
    }
}

/// A producer that immediately delivers a fixed value as its final result.
#[derive(Debug, Clone)]
pub struct ValueProducer<T> {
    name: String,
    value: T,
}

impl<T> ValueProducer<T> {
    /// Creates a producer that always yields `value`.
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[async_trait]
impl<T> Producer<T> for ValueProducer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce_results(&self, consumer: Arc<dyn Consumer<T>>, ctx: Arc<RequestContext>) {
        if ctx.is_cancellation_requested() {
            consumer.on_cancellation();
        } else {
            consumer.on_new_result(self.value.clone(), ConsumerStatus::LAST);
        }
    }
}
