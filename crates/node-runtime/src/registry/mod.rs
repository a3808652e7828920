//! # Value Registry
//!
//! The URIs this node hosts, mapped to their live state. Survey handlers,
//! the pub/sub handler and metadata events all resolve URIs here.

use crate::value::ValueCore;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ValueRegistry {
    values: RwLock<HashMap<String, Arc<ValueCore>>>,
}

impl ValueRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Host a value, replacing any previous value under the same URI.
    pub fn insert(&self, core: Arc<ValueCore>) -> Option<Arc<ValueCore>> {
        self.values.write().insert(core.uri().to_string(), core)
    }

    /// Remove `uri` only while it still maps to `core`.
    pub fn remove_if(&self, uri: &str, core: &Arc<ValueCore>) -> bool {
        let mut values = self.values.write();
        match values.get(uri) {
            Some(current) if Arc::ptr_eq(current, core) => {
                values.remove(uri);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Arc<ValueCore>> {
        self.values.read().get(uri).cloned()
    }

    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.values.read().contains_key(uri)
    }

    /// Sorted list of hosted URIs.
    #[must_use]
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.values.read().keys().cloned().collect();
        uris.sort();
        uris
    }

    /// Hosted URIs in which `pattern` matches anywhere.
    #[must_use]
    pub fn matching(&self, pattern: &Regex) -> Vec<String> {
        self.uris().into_iter().filter(|uri| pattern.is_match(uri)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}
