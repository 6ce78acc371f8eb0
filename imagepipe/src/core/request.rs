//! Immutable description of an image to fetch.

use super::{Priority, RequestLevel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of source an image URI points at, derived from its scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// `http` or `https`.
    Network,
    /// `file` or a bare absolute path.
    LocalFile,
    /// `asset`.
    LocalAsset,
    /// `content`.
    LocalContent,
    /// Inline `data` URI.
    Data,
    /// `res`, a resource bundled with the application.
    QualifiedResource,
    /// Anything else.
    Unknown,
}

impl SourceType {
    /// Classifies a URI by its scheme.
    #[must_use]
    pub fn from_uri(uri: &str) -> Self {
        if uri.starts_with('/') {
            return Self::LocalFile;
        }
        let Some((scheme, _)) = uri.split_once(':') else {
            return Self::Unknown;
        };
        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Self::Network,
            "file" => Self::LocalFile,
            "asset" => Self::LocalAsset,
            "content" => Self::LocalContent,
            "data" => Self::Data,
            "res" => Self::QualifiedResource,
            _ => Self::Unknown,
        }
    }

    /// Returns true for sources that never leave the device.
    #[must_use]
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Network | Self::Unknown)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::LocalFile => write!(f, "local_file"),
            Self::LocalAsset => write!(f, "local_asset"),
            Self::LocalContent => write!(f, "local_content"),
            Self::Data => write!(f, "data"),
            Self::QualifiedResource => write!(f, "qualified_resource"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Target dimensions for downsampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeOptions {
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
}

impl ResizeOptions {
    /// Creates resize options for the given dimensions.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Description of what to fetch.
///
/// Shared read-only by every producer working on the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    source_uri: String,
    source_type: SourceType,
    #[serde(default)]
    lowest_permitted_request_level: RequestLevel,
    #[serde(default)]
    requested_priority: Priority,
    #[serde(default)]
    progressive_rendering_enabled: bool,
    #[serde(default)]
    resize: Option<ResizeOptions>,
    #[serde(default = "enabled")]
    disk_cache_enabled: bool,
    #[serde(default = "enabled")]
    memory_cache_enabled: bool,
}

fn enabled() -> bool {
    true
}

impl ImageRequest {
    /// Creates a request for the given URI with default options.
    #[must_use]
    pub fn new(source_uri: impl Into<String>) -> Self {
        let source_uri = source_uri.into();
        Self {
            source_type: SourceType::from_uri(&source_uri),
            source_uri,
            lowest_permitted_request_level: RequestLevel::default(),
            requested_priority: Priority::default(),
            progressive_rendering_enabled: false,
            resize: None,
            disk_cache_enabled: true,
            memory_cache_enabled: true,
        }
    }

    /// Sets the lowest permitted request level.
    #[must_use]
    pub fn with_lowest_permitted_request_level(mut self, level: RequestLevel) -> Self {
        self.lowest_permitted_request_level = level;
        self
    }

    /// Sets the requested priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.requested_priority = priority;
        self
    }

    /// Enables progressive rendering.
    #[must_use]
    pub fn with_progressive_rendering(mut self, enabled: bool) -> Self {
        self.progressive_rendering_enabled = enabled;
        self
    }

    /// Sets the resize target.
    #[must_use]
    pub fn with_resize(mut self, resize: ResizeOptions) -> Self {
        self.resize = Some(resize);
        self
    }

    /// Disables the disk cache for this request.
    #[must_use]
    pub fn without_disk_cache(mut self) -> Self {
        self.disk_cache_enabled = false;
        self
    }

    /// Disables the memory caches for this request.
    #[must_use]
    pub fn without_memory_cache(mut self) -> Self {
        self.memory_cache_enabled = false;
        self
    }

    /// Returns the source URI.
    #[must_use]
    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    /// Returns the source type.
    #[must_use]
    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    /// Returns the lowest permitted request level.
    #[must_use]
    pub fn lowest_permitted_request_level(&self) -> RequestLevel {
        self.lowest_permitted_request_level
    }

    /// Returns the requested priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.requested_priority
    }

    /// Returns true if progressive rendering is enabled.
    #[must_use]
    pub fn progressive_rendering_enabled(&self) -> bool {
        self.progressive_rendering_enabled
    }

    /// Returns the resize target, if any.
    #[must_use]
    pub fn resize(&self) -> Option<ResizeOptions> {
        self.resize
    }

    /// Returns true if the disk cache may be used.
    #[must_use]
    pub fn disk_cache_enabled(&self) -> bool {
        self.disk_cache_enabled
    }

    /// Returns true if the memory caches may be used.
    #[must_use]
    pub fn memory_cache_enabled(&self) -> bool {
        self.memory_cache_enabled
    }
}
