//! Transactional document store boundary.
//!
//! The dispatch engine only needs four capabilities from its store:
//! - `get`: read one document
//! - `query`: equality-filtered, optionally limited reads
//! - `atomic_write`: all-or-nothing batch of creates and updates
//! - `subscribe`: notifications for newly created documents
//!
//! Two backends are provided: [`MemoryStore`] for in-process use and tests,
//! and [`FileStore`], a single JSON snapshot persisted atomically.

pub mod file;
pub mod memory;
pub mod snapshot;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use snapshot::Snapshot;

/// Errors that can occur talking to the store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Document is not a JSON object: {collection}/{id}")]
    InvalidDocument { collection: String, id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored document: its ID plus a JSON object body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Deserialize the body into a typed record.
    ///
    /// The document ID is injected as the `id` field, overriding any `id`
    /// stored in the body.
    pub fn parse<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.insert("id".to_string(), Value::String(self.id.clone()));
        }
        serde_json::from_value(data)
    }

    /// Top-level field lookup
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// Notification emitted for each document created by a committed write
#[derive(Debug, Clone)]
pub struct CreatedDocument {
    pub collection: String,
    pub document: Document,
}

/// Equality filter on a top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        data.get(&self.field) == Some(&self.value)
    }
}

/// A collection query: all filters must match; results ordered by ID
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }
}

/// Condition checked against the pre-batch state of an updated document
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Precondition {
    /// Update unconditionally
    #[default]
    None,

    /// Update only if the field currently holds this value
    FieldEquals { field: String, value: Value },
}

/// A single mutation inside an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create a new document; fails the batch if the ID already exists
    Create {
        collection: String,
        id: String,
        data: Value,
    },

    /// Merge fields into an existing document
    Update {
        collection: String,
        id: String,
        fields: Map<String, Value>,
        precondition: Precondition,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            Self::Create { collection, .. } | Self::Update { collection, .. } => collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Create { id, .. } | Self::Update { id, .. } => id,
        }
    }
}

/// Outcome of an atomic write.
///
/// A failed precondition is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteResult {
    /// Every operation was applied
    Committed { commit_time: DateTime<Utc> },

    /// Nothing was applied because this operation's precondition failed
    PreconditionFailed { collection: String, id: String },
}

impl WriteResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Document store used by the dispatch engine
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document, `None` if it does not exist
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Run an equality query
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Apply all operations or none of them
    async fn atomic_write(&self, ops: Vec<WriteOp>) -> Result<WriteResult>;

    /// Subscribe to documents created by later commits
    fn subscribe(&self) -> broadcast::Receiver<CreatedDocument>;
}
