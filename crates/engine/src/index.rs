//! Named key/value indexes over nodes or relationships
//!
//! An index maps `(key, value)` to a set of entity ids. Values are stored by
//! their canonical [`PropertyValue::index_key`], so lookups use exact typed
//! equality.

use graphd_core::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which entity type an index covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Node index
    Node,
    /// Relationship index
    Relationship,
}

impl IndexKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            IndexKind::Node => "node",
            IndexKind::Relationship => "relationship",
        }
    }
}

/// One named index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EntityIndex {
    entries: BTreeMap<String, BTreeMap<String, BTreeSet<u64>>>,
}

impl EntityIndex {
    pub(crate) fn add(&mut self, id: u64, key: &str, value: &PropertyValue) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .entry(value.index_key())
            .or_default()
            .insert(id);
    }

    /// Remove `id` from the entries selected by `key` / `value`.
    ///
    /// `None` widens the selection: no key removes the entity everywhere,
    /// no value removes it under every value of `key`.
    pub(crate) fn remove(&mut self, id: u64, key: Option<&str>, value: Option<&PropertyValue>) {
        match (key, value) {
            (Some(key), Some(value)) => {
                if let Some(values) = self.entries.get_mut(key) {
                    if let Some(ids) = values.get_mut(&value.index_key()) {
                        ids.remove(&id);
                    }
                }
            }
            (Some(key), None) => {
                if let Some(values) = self.entries.get_mut(key) {
                    for ids in values.values_mut() {
                        ids.remove(&id);
                    }
                }
            }
            (None, _) => {
                for values in self.entries.values_mut() {
                    for ids in values.values_mut() {
                        ids.remove(&id);
                    }
                }
            }
        }
        self.prune();
    }

    pub(crate) fn get(&self, key: &str, value: &PropertyValue) -> Vec<u64> {
        self.entries
            .get(key)
            .and_then(|values| values.get(&value.index_key()))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn prune(&mut self) {
        for values in self.entries.values_mut() {
            values.retain(|_, ids| !ids.is_empty());
        }
        self.entries.retain(|_, values| !values.is_empty());
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
