//! Purpose: In-process document store implementing the store collaborator.
//! Exports: `MemoryStore`, `MemoryConnection`.
//! Role: Offline target for `--dry-run` and for tests of the load pipeline.
//! Invariants: Collections keep insertion order.
//! Invariants: Mirrors the server's `_id` rules: assigned when missing, unique per collection.
//! Invariants: Numeric ids compare by value across int32, int64 and double.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};

use super::store::{Connection, Connector};
use crate::core::error::{Error, ErrorKind};

type Collections = HashMap<(String, String), Vec<Document>>;

#[derive(Debug, Default)]
struct Shared {
    collections: Mutex<Collections>,
    connections: AtomicU64,
    refuse_connections: AtomicBool,
}

/// Cheap to clone; clones share the same collections.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `connect` fail, as if the endpoint were down.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared
            .refuse_connections
            .store(refuse, Ordering::SeqCst);
    }

    /// Number of successful `connect` calls so far.
    pub fn connections(&self) -> u64 {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        let collections = lock(&self.shared.collections);
        collections
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, database: &str, collection: &str) -> usize {
        let collections = lock(&self.shared.collections);
        collections
            .get(&(database.to_string(), collection.to_string()))
            .map_or(0, Vec::len)
    }

    /// Remove every document from a collection, returning how many were dropped.
    pub fn clear(&self, database: &str, collection: &str) -> usize {
        let mut collections = lock(&self.shared.collections);
        collections
            .remove(&(database.to_string(), collection.to_string()))
            .map_or(0, |docs| docs.len())
    }
}

fn lock(collections: &Mutex<Collections>) -> std::sync::MutexGuard<'_, Collections> {
    // Inserts push whole documents, so a poisoned map is still consistent.
    collections
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
}

#[async_trait]
impl Connector for MemoryStore {
    type Connection = MemoryConnection;

    async fn connect(&self, endpoint: &str) -> Result<MemoryConnection, Error> {
        if self.shared.refuse_connections.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Connection)
                .with_message(format!("connection to {endpoint} refused")));
        }
        self.shared.connections.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: self.clone(),
        })
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), Error> {
        let mut collections = lock(&self.store.shared.collections);
        let docs = collections
            .entry((database.to_string(), collection.to_string()))
            .or_default();
        if let Some(id) = document.get("_id") {
            let taken = docs
                .iter()
                .filter_map(|existing| existing.get("_id"))
                .any(|other| same_id(other, id));
            if taken {
                return Err(Error::new(ErrorKind::Insert).with_message(format!(
                    "duplicate key in {database}.{collection}: _id {id}"
                )));
            }
            docs.push(document);
            return Ok(());
        }
        let mut with_id = Document::new();
        with_id.insert("_id", Bson::ObjectId(ObjectId::new()));
        for (key, value) in document {
            with_id.insert(key, value);
        }
        docs.push(with_id);
        Ok(())
    }
}

fn same_id(a: &Bson, b: &Bson) -> bool {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}
