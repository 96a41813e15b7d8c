//! Ordered multi-valued header metadata.

use serde::{Deserialize, Serialize};

/// An ordered multi-map of header name to one or more values.
///
/// Names are compared case-insensitively and stored lowercased, matching
/// how HTTP/1.1 and gRPC treat header names. Insertion order of distinct
/// names is preserved, as is the order of values under one name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    entries: Vec<(String, Vec<String>)>,
}

impl Metadata {
    /// Create empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(key))
    }

    /// Append a value under `key`, keeping any existing values.
    pub fn append(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref();
        match self.position(key) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self
                .entries
                .push((key.to_ascii_lowercase(), vec![value.into()])),
        }
    }

    /// Replace every value under `key` with a single value.
    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref();
        match self.position(key) {
            Some(idx) => self.entries[idx].1 = vec![value.into()],
            None => self
                .entries
                .push((key.to_ascii_lowercase(), vec![value.into()])),
        }
    }

    /// All values stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.position(key).map(|idx| self.entries[idx].1.as_slice())
    }

    /// The first value stored under `key`.
    #[must_use]
    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether any value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Remove `key` and its values. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over names and their values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Flatten into one header per name, joining multiple values with `, `.
    #[must_use]
    pub fn to_headers(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(name, values)| (name.clone(), values.join(", ")))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        metadata.extend(iter);
        metadata
    }
}

impl<K, V> Extend<(K, V)> for Metadata
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.append(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_append_is_case_insensitive() {
        let mut metadata = Metadata::new();
        metadata.append("Grpc-Timeout", "1S");
        metadata.append("grpc-timeout", "2S");

        assert_eq!(metadata.len(), 1);
        assert_eq!(
            metadata.get("GRPC-TIMEOUT"),
            Some(&["1S".to_string(), "2S".to_string()][..])
        );
    }

    #[test]
    fn test_to_headers_joins_values() {
        let metadata: Metadata = [("accept", "a"), ("x-user", "u"), ("accept", "b")]
            .into_iter()
            .collect();

        assert_eq!(
            metadata.to_headers(),
            vec![
                ("accept".to_string(), "a, b".to_string()),
                ("x-user".to_string(), "u".to_string()),
            ]
        );
    }

    #[test]
    fn test_set_and_remove() {
        let mut metadata = Metadata::new();
        metadata.append("a", "1");
        metadata.append("a", "2");
        metadata.set("A", "3");
        assert_eq!(metadata.get_first("a"), Some("3"));

        assert!(metadata.remove("a"));
        assert!(!metadata.remove("a"));
        assert!(metadata.is_empty());
    }
}
