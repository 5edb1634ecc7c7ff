pub mod codec;
pub mod escape;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An argument line count at or above this marks the peer as malicious.
pub const MAX_ARG_LINES: usize = 20;

/// Longest single protocol line accepted from the daemon (1MB).
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line terminating every request, response and hook event.
pub const DONE_LINE: &str = "done";

/// First response line of a successful command.
pub const OK_LINE: &str = "ok";

/// Payload of requests, responses and hook events: each key maps to one or
/// more values whose order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl ArgumentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all values for `key`. An empty `values` removes the key,
    /// since every key carries at least one value.
    pub fn insert<K, I, V>(&mut self, key: K, values: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let key = key.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, values);
        }
    }

    /// Append a single value to `key`, creating it if needed.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_default().push(value.into());
    }

    /// Builder form of [`ArgumentMap::push`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// The primary (first) value for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ArgumentMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.push(key, value);
        }
        map
    }
}
