//! Producer listener system for observability.
//!
//! The listener is the notification channel every producer of a request
//! reports its lifecycle to. The request context exposes it unchanged.

mod forwarding;
mod producer_listener;

pub use forwarding::ForwardingProducerListener;
pub use producer_listener::{
    CollectingProducerListener, ExtraMap, ListenerEvent, ListenerEventKind,
    LoggingProducerListener, NoOpProducerListener, ProducerListener, DEFAULT_MAX_PENDING_TIMERS,
};

#[cfg(test)]
pub use producer_listener::MockProducerListener;
