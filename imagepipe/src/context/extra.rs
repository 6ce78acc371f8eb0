//! Thread-safe metadata bag attached to every request.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Well-known extra-data keys written by producers.
pub mod keys {
    /// Request id.
    pub const ID: &str = "id";
    /// Source URI of the request.
    pub const URI_SOURCE: &str = "uri_source";
    /// Data source that produced the image.
    pub const ORIGIN: &str = "origin";
    /// Finer classification of `origin`.
    pub const ORIGIN_SUBCATEGORY: &str = "origin_subcategory";
    /// Detected image format.
    pub const IMAGE_FORMAT: &str = "image_format";
    /// Width of the encoded image.
    pub const ENCODED_WIDTH: &str = "encoded_width";
    /// Height of the encoded image.
    pub const ENCODED_HEIGHT: &str = "encoded_height";
    /// Size of the encoded image in bytes.
    pub const ENCODED_SIZE: &str = "encoded_size";
    /// Last progressive scan decoded.
    pub const LAST_SCAN_NUMBER: &str = "last_scan_number";
    /// URI actually fetched after rewriting.
    pub const MODIFIED_URL: &str = "modified_url";
    /// Decode error that did not fail the request.
    pub const NON_FATAL_DECODE_ERROR: &str = "non_fatal_decode_error";
}

/// A thread-safe bag of diagnostic and provenance metadata.
///
/// Writes overwrite, last writer wins. Every operation runs under a single
/// lock, so multi-key helpers are atomic with respect to readers.
#[derive(Debug, Default)]
pub struct ExtraDataBag {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl ExtraDataBag {
    /// Creates a new empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a value.
    pub fn put(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Inserts every entry of `entries` under one lock.
    pub fn put_all<I, K>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        let mut data = self.data.write();
        for (key, value) in entries {
            data.insert(key.into(), value);
        }
    }

    /// Gets a value from the bag.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data.read().get(key).cloned()
    }

    /// Gets a value and deserializes it, returning `None` on absence or
    /// type mismatch.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Removes a value, returning it if present.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.data.write().remove(key)
    }

    /// Sets the origin and its subcategory together.
    ///
    /// A `None` subcategory clears any subcategory left by an earlier call so
    /// a new origin is never paired with a stale subcategory. A `None` origin
    /// clears the origin.
    pub fn put_origin_extra(&self, origin: Option<&str>, subcategory: Option<&str>) {
        let mut data = self.data.write();
        match origin {
            Some(origin) => {
                data.insert(keys::ORIGIN.to_string(), origin.into());
            }
            None => {
                data.remove(keys::ORIGIN);
            }
        }
        match subcategory {
            Some(subcategory) => {
                data.insert(keys::ORIGIN_SUBCATEGORY.to_string(), subcategory.into());
            }
            None => {
                data.remove(keys::ORIGIN_SUBCATEGORY);
            }
        }
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Returns a copy of all data.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, serde_json::Value> {
        self.data.read().clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

/// Types carrying an [`ExtraDataBag`].
pub trait HasExtraData {
    /// Returns the underlying bag.
    fn extra_data(&self) -> &ExtraDataBag;

    /// Inserts or overwrites an extra.
    fn put_extra(&self, key: &str, value: serde_json::Value) {
        self.extra_data().put(key, value);
    }

    /// Inserts several extras atomically.
    fn put_extras(&self, extras: HashMap<String, serde_json::Value>) {
        self.extra_data().put_all(extras);
    }

    /// Gets an extra.
    fn get_extra(&self, key: &str) -> Option<serde_json::Value> {
        self.extra_data().get(key)
    }

    /// Returns a snapshot of all extras.
    fn extras(&self) -> HashMap<String, serde_json::Value> {
        self.extra_data().to_map()
    }

    /// Sets [`keys::ORIGIN`] and [`keys::ORIGIN_SUBCATEGORY`].
    fn put_origin_extra(&self, origin: Option<&str>, subcategory: Option<&str>) {
        self.extra_data().put_origin_extra(origin, subcategory);
    }
}

impl HasExtraData for ExtraDataBag {
    fn extra_data(&self) -> &ExtraDataBag {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_put_and_get() {
        let bag = ExtraDataBag::new();
        bag.put("key", "value");

        assert_eq!(bag.get("key"), Some(json!("value")));
        assert!(bag.contains_key("key"));
        assert!(!bag.contains_key("other"));
        assert_eq!(bag.get("other"), None);
    }

    #[test]
    fn test_put_overwrites() {
        let bag = ExtraDataBag::new();
        bag.put("key", 1);
        bag.put("key", 2);

        assert_eq!(bag.get("key"), Some(json!(2)));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_get_as() {
        let bag = ExtraDataBag::new();
        bag.put(keys::ENCODED_WIDTH, 640);
        bag.put(keys::IMAGE_FORMAT, "jpeg");

        assert_eq!(bag.get_as::<u32>(keys::ENCODED_WIDTH), Some(640));
        assert_eq!(bag.get_as::<String>(keys::IMAGE_FORMAT), Some("jpeg".to_string()));
        assert_eq!(bag.get_as::<u32>(keys::IMAGE_FORMAT), None);
    }

    #[test]
    fn test_put_all_and_to_map() {
        let bag = ExtraDataBag::new();
        bag.put_all(vec![("a", json!(1)), ("b", json!(2))]);

        let mut expected = HashMap::new();
        expected.insert("a".to_string(), json!(1));
        expected.insert("b".to_string(), json!(2));
        assert_eq!(bag.to_map(), expected);
    }

    #[test]
    fn test_remove() {
        let bag = ExtraDataBag::new();
        bag.put("key", true);
        assert_eq!(bag.remove("key"), Some(json!(true)));
        assert!(bag.is_empty());
    }

    #[test]
    fn test_origin_omitted_subcategory_clears_previous() {
        let bag = ExtraDataBag::new();
        bag.put_origin_extra(Some("net"), None);
        bag.put_origin_extra(Some("net"), Some("warm"));
        assert_eq!(bag.get(keys::ORIGIN_SUBCATEGORY), Some(json!("warm")));

        bag.put_origin_extra(Some("disk"), None);

        assert_eq!(bag.get(keys::ORIGIN), Some(json!("disk")));
        assert_eq!(bag.get(keys::ORIGIN_SUBCATEGORY), None);
    }

    #[test]
    fn test_origin_none_clears_origin() {
        let bag = ExtraDataBag::new();
        bag.put_origin_extra(Some("memory_bitmap"), Some("hit"));
        bag.put_origin_extra(None, None);

        assert!(!bag.contains_key(keys::ORIGIN));
        assert!(!bag.contains_key(keys::ORIGIN_SUBCATEGORY));
    }

    #[test]
    fn test_concurrent_distinct_keys_no_loss() {
        let bag = Arc::new(ExtraDataBag::new());

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let bag = bag.clone();
                thread::spawn(move || bag.put(format!("key-{i}"), i))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(bag.len(), 100);
        for i in 0..100 {
            assert_eq!(bag.get(&format!("key-{i}")), Some(json!(i)));
        }
    }

    #[test]
    fn test_concurrent_same_key_one_winner() {
        let bag = Arc::new(ExtraDataBag::new());
        let b1 = bag.clone();
        let b2 = bag.clone();

        let t1 = thread::spawn(move || b1.put("shared", json!({"writer": "v1", "n": 1})));
        let t2 = thread::spawn(move || b2.put("shared", json!({"writer": "v2", "n": 2})));
        t1.join().unwrap();
        t2.join().unwrap();

        let value = bag.get("shared").unwrap();
        assert!(
            value == json!({"writer": "v1", "n": 1}) || value == json!({"writer": "v2", "n": 2}),
            "unexpected value {value}"
        );
    }

    #[test]
    fn test_has_extra_data_defaults() {
        let bag = ExtraDataBag::new();
        bag.put_extra("x", json!(1));
        bag.put_origin_extra(Some("network"), Some("cdn"));

        assert_eq!(bag.get_extra("x"), Some(json!(1)));
        assert_eq!(bag.extras().len(), 3);
    }
}
