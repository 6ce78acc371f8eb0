//! Producers and consumers.
//!
//! Producers are the stages of an image request. Each one hands its output
//! to a consumer and shares one `RequestContext` with the rest of the chain.

mod consumer;
mod producer;

pub use consumer::{ChannelConsumer, Consumer, ConsumerEvent, ConsumerStatus, ReportingConsumer};
pub use producer::{FnProducer, Producer, ValueProducer};
