//! Core domain model types for imagepipe.
//!
//! This module contains the request descriptor and the small enums every
//! producer reads from the request context:
//! - Priority and lowest permitted request level
//! - Encoded image origin
//! - The immutable image request

mod priority;
mod request;

pub use priority::{EncodedImageOrigin, Priority, RequestLevel};
pub use request::{ImageRequest, ResizeOptions, SourceType};
