//! Case-insensitive string-keyed collections.
//!
//! Every entity kind in a data set is addressed by a case-insensitive key.
//! `KeyedMap` normalizes keys to lowercase for lookup while remembering the
//! key's original spelling for iteration and display.

use std::collections::HashMap;

/// A string-keyed map with case-insensitive lookup.
#[derive(Debug, Clone)]
pub struct KeyedMap<T> {
    entries: HashMap<String, Entry<T>>,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    key: String,
    value: T,
}

impl<T> KeyedMap<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn fold(key: &str) -> String {
        key.to_lowercase()
    }

    /// Insert a value, replacing and returning any previous entry for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: T) -> Option<T> {
        let key = key.into();
        self.entries
            .insert(
                Self::fold(&key),
                Entry { key, value },
            )
            .map(|e| e.value)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(&Self::fold(key)).map(|e| &e.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&Self::fold(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        self.entries.remove(&Self::fold(key)).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(original key, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.values().map(|e| (e.key.as_str(), &e.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|e| e.key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values().map(|e| &e.value)
    }

    /// The original spelling of some key still present in the map, if any.
    ///
    /// Used by the binder to drain a registry in arbitrary order.
    pub fn any_key(&self) -> Option<String> {
        self.entries.values().next().map(|e| e.key.clone())
    }
}

impl<T> Default for KeyedMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
