//! # Imagepipe
//!
//! Per-request context for image-retrieval producer chains.
//!
//! Every image request gets exactly one [`RequestContext`](context::RequestContext),
//! shared by all producers working on it. The context carries:
//!
//! - **Request parameters**: source, priority, lowest permitted level, prefetch flag
//! - **Cancellation**: a one-way signal delivering callbacks exactly once,
//!   including callbacks registered after cancellation
//! - **Metadata**: a thread-safe bag of diagnostic extras and the encoded image origin
//! - **Observability**: the producer listener every stage reports to
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use imagepipe::prelude::*;
//!
//! let pipeline = ImagePipeline::new(PipelineConfig::default(), Arc::new(LoggingProducerListener::info()))?;
//! let handle = pipeline.fetch(
//!     ImageRequest::new("https://images.example.com/cat.jpg"),
//!     Arc::new(NetworkFetchProducer::new()),
//!     FetchOptions::new().with_priority(Priority::High),
//! );
//!
//! // Somewhere else, e.g. when the view scrolls off screen
//! handle.cancel();
//!
//! let image = handle.result().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod listener;
pub mod observability;
pub mod pipeline;
pub mod producers;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{
        CancellationSignal, DeliveryReport, FnCallbacks, ProducerContextCallbacks, SharedCallbacks,
    };
    pub use crate::config::PipelineConfig;
    pub use crate::context::{keys, ExtraDataBag, HasExtraData, RequestContext, RequestContextBuilder};
    pub use crate::core::{EncodedImageOrigin, ImageRequest, Priority, RequestLevel, SourceType};
    pub use crate::errors::{PipelineError, PipelineResult};
    pub use crate::listener::{
        LoggingProducerListener, NoOpProducerListener, ProducerListener,
    };
    pub use crate::pipeline::{FetchOptions, ImagePipeline, RequestHandle};
    pub use crate::producers::{Consumer, ConsumerEvent, ConsumerStatus, FnProducer, Producer};
}
