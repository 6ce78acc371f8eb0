//! Observability utilities.

mod subscriber;
mod tracing;

pub use subscriber::{env_filter, init_tracing, LogFormat, LOG_ENV_VAR};
pub use tracing::{RequestSpanAttributes, SpanTimer};
