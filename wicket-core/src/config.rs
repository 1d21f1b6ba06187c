//! Hierarchical configuration.
//!
//! Options live in a chain of [`ConfigNode`]s: the service owns the root node
//! and every registered method owns a child of it. Lookups fall back to the
//! parent; a child value shadows its parent's. Nodes stay mutable after
//! creation and nothing is cached, so a later change to the service node is
//! visible to every method on its next request.
//!
//! Each execution works on a [`Options`] snapshot produced by
//! [`ConfigNode::flattened`]; plugins may rewrite the snapshot without
//! touching the nodes.

use crate::error::ConfigError;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::{
    collections::BTreeSet,
    sync::{Arc, LazyLock, PoisonError, RwLock},
};

static OPTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("option name pattern"));

/// Whether `name` is acceptable as an option name.
pub fn is_valid_name(name: &str) -> bool {
    OPTION_NAME.is_match(name)
}

/// One level of the configuration hierarchy.
#[derive(Debug, Default)]
pub struct ConfigNode {
    parent: Option<Arc<ConfigNode>>,
    values: RwLock<IndexMap<String, Value>>,
}

impl ConfigNode {
    /// Create a root node.
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a node that falls back to `parent`.
    pub fn child(parent: &Arc<ConfigNode>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            values: RwLock::default(),
        })
    }

    /// The parent node, if any.
    pub fn parent(&self) -> Option<&Arc<ConfigNode>> {
        self.parent.as_ref()
    }

    /// Set a single option on this node.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        if !is_valid_name(name) {
            return Err(ConfigError::InvalidName(name.to_string()));
        }
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.into());
        Ok(())
    }

    /// Set several options at once.
    ///
    /// Names are validated before anything is written, so a rejected batch
    /// leaves the node unchanged. Returns `self` for chaining.
    pub fn configure<I, K, V>(&self, options: I) -> Result<&Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let batch: Vec<(String, Value)> = options
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if let Some((name, _)) = batch.iter().find(|(name, _)| !is_valid_name(name)) {
            return Err(ConfigError::InvalidName(name.clone()));
        }
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(batch);
        Ok(self)
    }

    /// Remove an option from this node only, returning its value.
    pub fn unset(&self, name: &str) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(name)
    }

    /// Look an option up, falling back through the parents.
    pub fn get(&self, name: &str) -> Result<Value, ConfigError> {
        let mut node = Some(self);
        while let Some(current) = node {
            let values = current.values.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = values.get(name) {
                return Ok(value.clone());
            }
            node = current.parent.as_deref();
        }
        Err(ConfigError::NotFound(name.to_string()))
    }

    /// Whether any node in the chain defines `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Union of option names over the whole chain.
    pub fn option_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut node = Some(self);
        while let Some(current) = node {
            let values = current.values.read().unwrap_or_else(PoisonError::into_inner);
            names.extend(values.keys().cloned());
            node = current.parent.as_deref();
        }
        names
    }

    /// Snapshot of every visible option, the nearest node winning.
    ///
    /// Keys appear in root-first definition order.
    pub fn flattened(&self) -> Options {
        let mut chain = Vec::new();
        let mut node = Some(self);
        while let Some(current) = node {
            chain.push(current);
            node = current.parent.as_deref();
        }

        let mut merged = IndexMap::new();
        for current in chain.into_iter().rev() {
            let values = current.values.read().unwrap_or_else(PoisonError::into_inner);
            for (name, value) in values.iter() {
                merged.insert(name.clone(), value.clone());
            }
        }
        Options(merged)
    }
}

/// A flattened, per-execution copy of the configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Options(IndexMap<String, Value>);

impl Options {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw option value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Boolean option, `default` when absent or not a boolean.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.0.get(name).and_then(Value::as_bool).unwrap_or(default)
    }

    /// String option, `None` when absent or not a string.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Overwrite an option in this snapshot only.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    /// Whether the snapshot defines `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no options.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Options(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
