//! Per-client session storage.
//!
//! The host owns session persistence; the pipeline only needs a key/value
//! view with interior mutability so plugins can update it through a shared
//! reference.

use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

/// Key/value session store for the current client.
pub trait Session: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value.
    fn set(&self, key: &str, value: Value);

    /// Delete a value, returning it.
    fn remove(&self, key: &str) -> Option<Value>;
}

/// In-memory [`Session`] implementation.
#[derive(Debug, Default)]
pub struct MemorySession {
    values: Mutex<HashMap<String, Value>>,
}

impl MemorySession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the session is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Session for MemorySession {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}
