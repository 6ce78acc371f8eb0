//! Pipeline entry point.
//!
//! This module provides:
//! - `ImagePipeline`, which builds one context per request and runs its producer
//! - `FetchOptions` for caller-supplied request parameters
//! - `RequestHandle` for awaiting or cancelling a running request

mod handle;
mod image_pipeline;

pub use handle::RequestHandle;
pub use image_pipeline::{FetchOptions, ImagePipeline};
