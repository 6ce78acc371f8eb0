//! Request priority, request level and encoded image origin enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority of an image request.
///
/// Variants are declared in ascending order so `Ord` compares by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work, e.g. prefetches.
    Low,
    /// Default for requests not immediately visible.
    Medium,
    /// Requests for content currently on screen.
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::High
    }
}

impl Priority {
    /// Returns the more urgent of two priorities.
    #[must_use]
    pub fn higher(a: Self, b: Self) -> Self {
        a.max(b)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// The cheapest data source permitted to satisfy a request.
///
/// Ordered from least to most restrictive: `FullFetch` allows going to the
/// network, `BitmapMemoryCache` only accepts an already decoded bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestLevel {
    /// Fetch from any source, including the network.
    FullFetch,
    /// Disk cache or memory caches only.
    DiskCache,
    /// Encoded or bitmap memory cache only.
    EncodedMemoryCache,
    /// Bitmap memory cache only.
    BitmapMemoryCache,
}

impl Default for RequestLevel {
    fn default() -> Self {
        Self::FullFetch
    }
}

impl RequestLevel {
    /// Returns the more restrictive of two levels.
    #[must_use]
    pub fn max(a: Self, b: Self) -> Self {
        Ord::max(a, b)
    }

    /// Returns true if fetching from `source` is allowed at this level.
    #[must_use]
    pub fn permits(&self, source: Self) -> bool {
        source >= *self
    }
}

impl fmt::Display for RequestLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullFetch => write!(f, "full_fetch"),
            Self::DiskCache => write!(f, "disk_cache"),
            Self::EncodedMemoryCache => write!(f, "encoded_memory_cache"),
            Self::BitmapMemoryCache => write!(f, "bitmap_memory_cache"),
        }
    }
}

/// Where the encoded bytes currently held for a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodedImageOrigin {
    /// Provenance not yet known.
    Unknown,
    /// Downloaded from the network.
    Network,
    /// Read from the disk cache.
    Disk,
    /// Served from the encoded memory cache.
    MemoryEncoded,
    /// Served from the bitmap memory cache.
    MemoryBitmap,
    /// Read from a local file, asset or content provider.
    Local,
}

impl Default for EncodedImageOrigin {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for EncodedImageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Network => write!(f, "network"),
            Self::Disk => write!(f, "disk"),
            Self::MemoryEncoded => write!(f, "memory_encoded"),
            Self::MemoryBitmap => write!(f, "memory_bitmap"),
            Self::Local => write!(f, "local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert_eq!(Priority::higher(Priority::Low, Priority::Medium), Priority::Medium);
        assert_eq!(Priority::higher(Priority::High, Priority::Low), Priority::High);
    }

    #[test]
    fn test_priority_display() {
        assert_eq!(Priority::Low.to_string(), "low");
        assert_eq!(Priority::High.to_string(), "high");
    }

    #[test]
    fn test_request_level_max() {
        assert_eq!(
            RequestLevel::max(RequestLevel::FullFetch, RequestLevel::DiskCache),
            RequestLevel::DiskCache
        );
        assert_eq!(
            RequestLevel::max(RequestLevel::BitmapMemoryCache, RequestLevel::DiskCache),
            RequestLevel::BitmapMemoryCache
        );
    }

    #[test]
    fn test_request_level_permits() {
        let level = RequestLevel::DiskCache;
        assert!(!level.permits(RequestLevel::FullFetch));
        assert!(level.permits(RequestLevel::DiskCache));
        assert!(level.permits(RequestLevel::BitmapMemoryCache));
    }

    #[test]
    fn test_origin_serialize() {
        let json = serde_json::to_string(&EncodedImageOrigin::MemoryEncoded).unwrap();
        assert_eq!(json, r#""memory_encoded""#);

        let origin: EncodedImageOrigin = serde_json::from_str(r#""disk""#).unwrap();
        assert_eq!(origin, EncodedImageOrigin::Disk);
        assert_eq!(EncodedImageOrigin::default(), EncodedImageOrigin::Unknown);
    }
}
