//! The spatial registry: authoritative in-memory cache of live stacked
//! objects.
//!
//! Two indices, identity (spatial key) and chunk bucket, are kept under a
//! single lock, so an insert or removal updates the pair atomically and
//! no reader ever observes one index without the other. Query methods
//! return snapshot vectors cloned under the read lock: a removal that races
//! an in-flight iteration is not observed by it.
//!
//! BTreeMaps keep iteration deterministic, which also makes the
//! closest-candidate tie-break reproducible (smallest spatial key wins).

use crate::object::StackRef;
use stackforge_core::{ChunkKey, ObjectClass, SpatialKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    by_key: BTreeMap<SpatialKey, StackRef>,
    by_chunk: BTreeMap<ChunkKey, BTreeSet<SpatialKey>>,
    chunk_of: HashMap<SpatialKey, ChunkKey>,
}

/// In-memory cache of all live stacked objects.
#[derive(Default)]
pub struct StackRegistry {
    inner: RwLock<Inner>,
}

impl StackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Identity lookup. Safe from any thread.
    pub fn get(&self, key: SpatialKey) -> Option<StackRef> {
        self.read().by_key.get(&key).cloned()
    }

    /// Whether a key is currently cached.
    pub fn contains(&self, key: SpatialKey) -> bool {
        self.read().by_key.contains_key(&key)
    }

    /// Insert an object under its key and chunk bucket. At most one object
    /// per key: an existing entry is replaced and returned.
    pub fn insert(&self, object: StackRef, chunk: ChunkKey) -> Option<StackRef> {
        let key = object.key();
        let mut inner = self.write();
        let previous = inner.by_key.insert(key, object);
        if let Some(old_chunk) = inner.chunk_of.insert(key, chunk) {
            Self::unbucket(&mut inner, old_chunk, key);
        }
        inner.by_chunk.entry(chunk).or_default().insert(key);
        previous
    }

    /// Remove an object from both indices together.
    pub fn remove(&self, key: SpatialKey) -> Option<StackRef> {
        let mut inner = self.write();
        let removed = inner.by_key.remove(&key)?;
        if let Some(chunk) = inner.chunk_of.remove(&key) {
            Self::unbucket(&mut inner, chunk, key);
        }
        Some(removed)
    }

    /// Move a mobile object to a new chunk bucket after it crossed a chunk
    /// border. No-op for unknown keys.
    pub fn reindex(&self, key: SpatialKey, new_chunk: ChunkKey) {
        let mut inner = self.write();
        if !inner.by_key.contains_key(&key) {
            return;
        }
        if let Some(old_chunk) = inner.chunk_of.insert(key, new_chunk) {
            if old_chunk == new_chunk {
                return;
            }
            Self::unbucket(&mut inner, old_chunk, key);
        }
        inner.by_chunk.entry(new_chunk).or_default().insert(key);
    }

    /// Chunk this key is currently bucketed under.
    pub fn chunk_of(&self, key: SpatialKey) -> Option<ChunkKey> {
        self.read().chunk_of.get(&key).copied()
    }

    /// Snapshot of every object bucketed in a chunk, in key order.
    pub fn all_in_chunk(&self, chunk: ChunkKey) -> Vec<StackRef> {
        let inner = self.read();
        match inner.by_chunk.get(&chunk) {
            Some(keys) => keys
                .iter()
                .filter_map(|key| inner.by_key.get(key).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot of every object of one class, in key order. Full-registry
    /// scan; the fallback path for radius searches without chunk bucketing.
    pub fn all_of_class(&self, class: ObjectClass) -> Vec<StackRef> {
        self.read()
            .by_key
            .values()
            .filter(|entry| entry.kind().class() == class)
            .cloned()
            .collect()
    }

    /// Snapshot of every cached object, in key order.
    pub fn all(&self) -> Vec<StackRef> {
        self.read().by_key.values().cloned().collect()
    }

    /// Number of cached objects.
    pub fn len(&self) -> usize {
        self.read().by_key.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.read().by_key.is_empty()
    }

    /// Drop every entry from memory, returning them so the caller can
    /// release per-object resources. No durable deletion happens here.
    pub fn clear(&self) -> Vec<StackRef> {
        let mut inner = self.write();
        inner.by_chunk.clear();
        inner.chunk_of.clear();
        std::mem::take(&mut inner.by_key).into_values().collect()
    }

    fn unbucket(inner: &mut Inner, chunk: ChunkKey, key: SpatialKey) {
        if let Some(bucket) = inner.by_chunk.get_mut(&chunk) {
            bucket.remove(&key);
            if bucket.is_empty() {
                inner.by_chunk.remove(&chunk);
            }
        }
    }
}
