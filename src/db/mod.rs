// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2026 ironftpd contributors

//! Persistent-store proxy (spec.md §2, §4.4): the write-through boundary
//! between the in-memory caches and the concrete document database,
//! which is out of scope here and consumed only through [`PersistentStore`].
//!
//! The proxy batches field-level mutations per record and returns them
//! as serialized documents so the replication tick (spec.md §4.4
//! "Replication") has something to ship to peers without re-reading the
//! whole record back out of the cache.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde_json::{Map, Value};

use crate::error::Error;

/// The document-database interface the core consumes. A concrete
/// implementation (e.g. a MongoDB/Sled client) lives outside this
/// crate's scope; tests and the default runtime use [`InMemoryStore`].
pub trait PersistentStore: Send + Sync {
    /// Upserts the full document for a user/group record.
    fn put(&self, collection: &str, id: i32, doc: Value) -> Result<(), Error>;
    /// Loads every document in a collection, for cache warm-up.
    fn load_all(&self, collection: &str) -> Result<Vec<Value>, Error>;
}

/// A process-local store backed by a map, used for tests and as the
/// default when no external database is configured.
#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, HashMap<i32, Value>>>,
}

impl PersistentStore for InMemoryStore {
    fn put(&self, collection: &str, id: i32, doc: Value) -> Result<(), Error> {
        let mut guard = self.collections.lock().map_err(|_| Error::Runtime("store poisoned".into()))?;
        guard.entry(collection.to_string()).or_default().insert(id, doc);
        Ok(())
    }

    fn load_all(&self, collection: &str) -> Result<Vec<Value>, Error> {
        let guard = self.collections.lock().map_err(|_| Error::Runtime("store poisoned".into()))?;
        Ok(guard.get(collection).map(|m| m.values().cloned().collect()).unwrap_or_default())
    }
}

/// Write-through wrapper around a [`PersistentStore`] that batches
/// field-level mutations per `(collection, id)` before flushing.
pub struct StoreProxy {
    store: Arc<dyn PersistentStore>,
    pending: Mutex<HashMap<(String, i32), Map<String, Value>>>,
}

impl StoreProxy {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store, pending: Mutex::new(HashMap::new()) }
    }

    /// Stages a single field mutation without touching the store yet.
    pub fn stage_field(&self, collection: &str, id: i32, field: &str, value: Value) {
        let mut guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        guard.entry((collection.to_string(), id)).or_default().insert(field.to_string(), value);
    }

    /// Writes `full_doc` through to the store and returns the batched
    /// set of fields that were dirty since the last flush for this
    /// record — the serialized diff handed to replication.
    pub fn flush(&self, collection: &str, id: i32, full_doc: Value) -> Result<Value, Error> {
        self.store.put(collection, id, full_doc)?;
        let mut guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let dirty = guard.remove(&(collection.to_string(), id)).unwrap_or_default();
        Ok(Value::Object(dirty))
    }

    /// Underlying store, for cache warm-up reads.
    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flush_writes_through_and_returns_dirty_fields() {
        let store = Arc::new(InMemoryStore::default());
        let proxy = StoreProxy::new(store.clone());

        proxy.stage_field("users", 1, "credits", json!(42));
        proxy.stage_field("users", 1, "modified", json!("2026-01-01T00:00:00Z"));

        let diff = proxy.flush("users", 1, json!({"id": 1, "credits": 42})).unwrap();
        assert_eq!(diff["credits"], 42);
        assert_eq!(diff["modified"], "2026-01-01T00:00:00Z");

        let loaded = store.load_all("users").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0]["credits"], 42);
    }

    #[test]
    fn flush_clears_pending_for_record() {
        let store = Arc::new(InMemoryStore::default());
        let proxy = StoreProxy::new(store);
        proxy.stage_field("users", 1, "a", json!(1));
        proxy.flush("users", 1, json!({})).unwrap();
        let diff = proxy.flush("users", 1, json!({})).unwrap();
        assert_eq!(diff, json!({}));
    }
}
