use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

use ratingflow_core::EntityId;
use ratingflow_events::{AverageEntry, EnrichedRecord, MetadataRecord};

/// Outcome of an upsert.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// The key was not present before.
    Inserted,
    /// A previous value for the key was replaced.
    Replaced,
}

impl Upsert {
    pub fn is_first_insert(self) -> bool {
        matches!(self, Upsert::Inserted)
    }
}

/// Last-write-wins key/value table.
///
/// `upsert` replaces unconditionally (no version check, no merge). There is no
/// delete: entries live as long as the process.
pub trait TableStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn upsert(&self, key: K, value: V) -> Upsert;
    fn list(&self) -> Vec<V>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, S> TableStore<K, V> for Arc<S>
where
    S: TableStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Option<V> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) -> Upsert {
        (**self).upsert(key, value)
    }

    fn list(&self) -> Vec<V> {
        (**self).list()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// In-memory table.
#[derive(Debug)]
pub struct InMemoryTableStore<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryTableStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTableStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TableStore<K, V> for InMemoryTableStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    fn upsert(&self, key: K, value: V) -> Upsert {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match map.insert(key, value) {
            None => Upsert::Inserted,
            Some(_) => Upsert::Replaced,
        }
    }

    fn list(&self) -> Vec<V> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Reference table cache: latest catalog metadata per entity.
pub type ReferenceTable = InMemoryTableStore<EntityId, MetadataRecord>;

/// Average table cache: latest computed average per entity.
pub type AverageTable = InMemoryTableStore<EntityId, AverageEntry>;

/// Backing store for the queryable rated-movies view.
pub type EnrichedTable = InMemoryTableStore<EntityId, EnrichedRecord>;
