//! Immutable snapshots of voices and engines
//!
//! A snapshot is built once from a native payload and never mutated; when new
//! data arrives the client replaces the whole list.

use super::voice::{Engine, Voice};
use log::{error, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Fixed-length, zero-indexed snapshot
///
/// Clones share the same backing storage.
#[derive(Debug, PartialEq)]
pub struct SnapshotList<T> {
    items: Arc<[T]>,
}

impl<T> Clone for SnapshotList<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

/// Snapshot of the voices an engine offers
pub type VoiceList = SnapshotList<Voice>;

/// Snapshot of installed engines
pub type EngineList = SnapshotList<Engine>;

impl<T> SnapshotList<T> {
    /// An empty snapshot
    pub fn empty() -> Self {
        Self {
            items: Arc::from(Vec::new()),
        }
    }

    /// Number of items, fixed at construction
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `index`, or `None` outside `[0, len)`
    pub fn item(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: DeserializeOwned> SnapshotList<T> {
    /// Build from a native payload
    ///
    /// A payload that is absent or not an array is an empty snapshot. Elements
    /// that fail to deserialize are logged and skipped; the rest are kept in
    /// order.
    pub fn from_payload(payload: &Value) -> Self {
        let Some(array) = payload.as_array() else {
            warn!("Payload is not an array, using empty snapshot");
            return Self::empty();
        };

        let items: Vec<T> = array
            .iter()
            .enumerate()
            .filter_map(|(index, v)| match serde_json::from_value(v.clone()) {
                Ok(item) => Some(item),
                Err(e) => {
                    error!("Skipping malformed record {}: {}", index, e);
                    None
                }
            })
            .collect();
        Self::from(items)
    }
}

impl<T> Default for SnapshotList<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Vec<T>> for SnapshotList<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            items: Arc::from(items),
        }
    }
}

impl<'a, T> IntoIterator for &'a SnapshotList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
