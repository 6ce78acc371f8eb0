//! Request context for producer chains.
//!
//! This module provides:
//! - The per-request `RequestContext` shared by every producer
//! - The thread-safe `ExtraDataBag` for diagnostic and provenance metadata
//! - The `HasExtraData` trait and well-known extra keys

mod extra;
mod request_context;

pub use extra::{keys, ExtraDataBag, HasExtraData};
pub use request_context::{CallerContext, RequestContext, RequestContextBuilder};
