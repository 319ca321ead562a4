//! In-process document store.

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{
    CreatedDocument, Document, DocumentStore, Query, Result, Snapshot, StoreError, WriteOp,
    WriteResult,
};

/// Capacity of the creation notification channel
const NOTIFY_CAPACITY: usize = 256;

/// Document store held entirely in memory
pub struct MemoryStore {
    snapshot: RwLock<Snapshot>,
    created_tx: broadcast::Sender<CreatedDocument>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::new())
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let (created_tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            snapshot: RwLock::new(snapshot),
            created_tx,
        }
    }

    /// Put a document in place directly, without a commit or notification
    pub fn insert(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        let mut snapshot = self
            .snapshot
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        snapshot.insert(collection, id, data);
        Ok(())
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(snapshot.len(collection))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(snapshot.get(collection, id))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let snapshot = self
            .snapshot
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(snapshot.query(query))
    }

    async fn atomic_write(&self, ops: Vec<WriteOp>) -> Result<WriteResult> {
        let (result, created) = {
            let mut snapshot = self
                .snapshot
                .write()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            snapshot.apply(ops)?
        };

        for doc in created {
            // No subscribers is fine
            let _ = self.created_tx.send(doc);
        }

        Ok(result)
    }

    fn subscribe(&self) -> broadcast::Receiver<CreatedDocument> {
        self.created_tx.subscribe()
    }
}
