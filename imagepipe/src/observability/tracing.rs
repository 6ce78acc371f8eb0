//! Span attributes and timing for request tracing.

use crate::context::RequestContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Span attributes describing one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSpanAttributes {
    /// Request id.
    pub request_id: String,
    /// Source URI.
    pub source_uri: String,
    /// Source type.
    pub source_type: String,
    /// Priority.
    pub priority: String,
    /// Lowest permitted level.
    pub lowest_permitted_level: String,
    /// Whether the request is a prefetch.
    pub is_prefetch: bool,
    /// UI component id, if any.
    pub ui_component_id: Option<String>,
    /// Encoded image origin at capture time.
    pub encoded_image_origin: Option<String>,
    /// Whether cancellation had been requested at capture time.
    pub cancelled: bool,
}

impl RequestSpanAttributes {
    /// Captures the current state of a context.
    #[must_use]
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            request_id: ctx.id().to_string(),
            source_uri: ctx.image_request().source_uri().to_string(),
            source_type: ctx.image_request().source_type().to_string(),
            priority: ctx.priority().to_string(),
            lowest_permitted_level: ctx.lowest_permitted_request_level().to_string(),
            is_prefetch: ctx.is_prefetch(),
            ui_component_id: ctx.ui_component_id().map(String::from),
            encoded_image_origin: Some(ctx.encoded_image_origin().to_string()),
            cancelled: ctx.is_cancellation_requested(),
        }
    }

    /// Converts to OpenTelemetry attributes.
    #[must_use]
    pub fn to_otel_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        attrs.insert("request.id".to_string(), self.request_id.clone());
        attrs.insert("request.source_uri".to_string(), self.source_uri.clone());
        attrs.insert("request.source_type".to_string(), self.source_type.clone());
        attrs.insert("request.priority".to_string(), self.priority.clone());
        attrs.insert(
            "request.lowest_permitted_level".to_string(),
            self.lowest_permitted_level.clone(),
        );
        attrs.insert("request.is_prefetch".to_string(), self.is_prefetch.to_string());
        attrs.insert("request.cancelled".to_string(), self.cancelled.to_string());

        if let Some(ref v) = self.ui_component_id {
            attrs.insert("request.ui_component_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.encoded_image_origin {
            attrs.insert("image.encoded_origin".to_string(), v.clone());
        }

        attrs
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EncodedImageOrigin;
    use crate::testing::TestRequest;

    #[test]
    fn test_request_span_attributes() {
        let ctx = TestRequest::new().with_id("req-42").with_prefetch(true).build();
        ctx.set_encoded_image_origin(EncodedImageOrigin::Disk);

        let attrs = RequestSpanAttributes::from_context(&ctx).to_otel_attributes();
        assert_eq!(attrs.get("request.id"), Some(&"req-42".to_string()));
        assert_eq!(attrs.get("request.source_type"), Some(&"network".to_string()));
        assert_eq!(attrs.get("request.is_prefetch"), Some(&"true".to_string()));
        assert_eq!(attrs.get("image.encoded_origin"), Some(&"disk".to_string()));
        assert!(!attrs.contains_key("request.ui_component_id"));
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("test_span");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "test_span");
        let duration = timer.finish();
        assert!(duration >= 10.0);
    }
}
