//! String key/value metadata attached to a call.

use std::collections::HashMap;

use axum::http::HeaderMap;

/// Call metadata. Keys are stored lower-cased.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata(HashMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous one for the same key.
    pub fn insert<K: AsRef<str>, V: Into<String>>(&mut self, key: K, value: V) -> Option<String> {
        self.0.insert(key.as_ref().to_ascii_lowercase(), value.into())
    }

    /// Look up a value. The key is matched case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build metadata from HTTP headers, skipping values that are not UTF-8.
    ///
    /// Repeated headers keep their last value.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut metadata = Self::new();
        for (name, value) in headers {
            match value.to_str() {
                Ok(value) => {
                    metadata.insert(name.as_str(), value);
                }
                Err(e) => {
                    tracing::debug!(
                        key = name.as_str(),
                        error = %e,
                        "non-UTF-8 header value, metadata dropped"
                    );
                }
            }
        }
        metadata
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}
