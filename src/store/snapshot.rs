//! In-memory collection state shared by both store backends.
//!
//! Batches are applied in two phases: every operation is checked against the
//! state before the batch, and only if all checks pass is anything mutated.
//! The mutation phase cannot fail, so a batch is never half-applied.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CreatedDocument, Document, Precondition, Query, Result, StoreError, WriteOp, WriteResult};

/// All collections, keyed by name then document ID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    collections: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone()))
    }

    /// Matching documents in ID order, truncated to the query limit
    pub fn query(&self, query: &Query) -> Vec<Document> {
        let Some(docs) = self.collections.get(&query.collection) else {
            return Vec::new();
        };

        docs.iter()
            .filter(|(_, data)| query.matches(data))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(id, data)| Document::new(id.clone(), data.clone()))
            .collect()
    }

    /// Insert or replace a document without any checks
    pub fn insert(&mut self, collection: &str, id: &str, data: Value) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, BTreeMap::len)
    }

    /// Apply a batch atomically.
    ///
    /// Returns the write result together with the documents it created, so
    /// the caller can publish creation notifications after the commit.
    pub fn apply(&mut self, ops: Vec<WriteOp>) -> Result<(WriteResult, Vec<CreatedDocument>)> {
        for op in &ops {
            if let Some(failed) = self.check(op)? {
                return Ok((failed, Vec::new()));
            }
        }

        let commit_time = Utc::now();
        let mut created = Vec::new();

        for op in ops {
            match op {
                WriteOp::Create {
                    collection,
                    id,
                    data,
                } => {
                    self.insert(&collection, &id, data.clone());
                    created.push(CreatedDocument {
                        collection,
                        document: Document::new(id, data),
                    });
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                    ..
                } => {
                    if let Some(Value::Object(existing)) = self
                        .collections
                        .get_mut(&collection)
                        .and_then(|docs| docs.get_mut(&id))
                    {
                        existing.extend(fields);
                    }
                }
            }
        }

        Ok((WriteResult::Committed { commit_time }, created))
    }

    /// Validate one operation against the current state
    fn check(&self, op: &WriteOp) -> Result<Option<WriteResult>> {
        let current = self
            .collections
            .get(op.collection())
            .and_then(|docs| docs.get(op.id()));

        let precondition_failed = || WriteResult::PreconditionFailed {
            collection: op.collection().to_string(),
            id: op.id().to_string(),
        };

        match op {
            WriteOp::Create { data, .. } => {
                if !data.is_object() {
                    return Err(invalid_document(op));
                }
                if current.is_some() {
                    return Ok(Some(precondition_failed()));
                }
            }
            WriteOp::Update { precondition, .. } => {
                let Some(current) = current else {
                    return Err(StoreError::NotFound {
                        collection: op.collection().to_string(),
                        id: op.id().to_string(),
                    });
                };
                if !current.is_object() {
                    return Err(invalid_document(op));
                }
                if let Precondition::FieldEquals { field, value } = precondition {
                    if current.get(field) != Some(value) {
                        return Ok(Some(precondition_failed()));
                    }
                }
            }
        }

        Ok(None)
    }
}

fn invalid_document(op: &WriteOp) -> StoreError {
    StoreError::InvalidDocument {
        collection: op.collection().to_string(),
        id: op.id().to_string(),
    }
}
