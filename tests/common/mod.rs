//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use healyri_dispatch::config::DispatchSettings;
use healyri_dispatch::domain::geo::EARTH_RADIUS_KM;
use healyri_dispatch::domain::DispatchEvent;
use healyri_dispatch::store::{
    CreatedDocument, Document, DocumentStore, Filter, MemoryStore, Query, Result, StoreError,
    WriteOp, WriteResult,
};
use healyri_dispatch::Dispatcher;
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Lusaka, where the seeded facilities are
pub const ORIGIN: (f64, f64) = (-15.3875, 28.3228);

/// A point `km` due north of `(lat, lng)` on the same meridian
pub fn north_of(lat: f64, lng: f64, km: f64) -> (f64, f64) {
    (lat + (km / EARTH_RADIUS_KM).to_degrees(), lng)
}

pub fn add_facility(store: &MemoryStore, id: &str, at: Option<(f64, f64)>, status: &str) {
    let mut data = json!({
        "name": format!("Facility {}", id),
        "emergencyAcceptanceStatus": status,
    });
    if let Some((lat, lng)) = at {
        data["location"] = json!({ "latitude": lat, "longitude": lng });
    }
    store.insert("facilities", id, data).unwrap();
}

pub fn add_driver(store: &MemoryStore, id: &str, at: (f64, f64), status: &str, verified: bool) {
    store
        .insert(
            "drivers",
            id,
            json!({
                "status": status,
                "isVerified": verified,
                "currentLocation": { "latitude": at.0, "longitude": at.1 },
            }),
        )
        .unwrap();
}

pub fn add_emergency(store: &MemoryStore, id: &str, at: Option<(f64, f64)>) {
    let mut data = json!({ "status": "created", "patientId": "patient-1" });
    if let Some((lat, lng)) = at {
        data["location"] = json!({ "latitude": lat, "longitude": lng });
    }
    store.insert("emergencies", id, data).unwrap();
}

pub fn dispatcher<S: DocumentStore + 'static>(store: Arc<S>) -> Dispatcher {
    Dispatcher::new(store, DispatchSettings::default())
}

pub async fn emergency(store: &dyn DocumentStore, id: &str) -> Value {
    store
        .get("emergencies", id)
        .await
        .unwrap()
        .expect("emergency exists")
        .data
}

pub async fn events_for(store: &dyn DocumentStore, id: &str) -> Vec<DispatchEvent> {
    store
        .query(&Query::collection("events").filter(Filter::eq("emergencyId", id)))
        .await
        .unwrap()
        .iter()
        .map(|doc| doc.parse().unwrap())
        .collect()
}

/// Memory store with switchable failures and a write counter
pub struct FaultyStore {
    pub inner: MemoryStore,
    failing_collection: Option<String>,
    fail_commits: AtomicBool,
    writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing_collection: None,
            fail_commits: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Every query against `collection` fails
    pub fn failing_queries(mut self, collection: &str) -> Self {
        self.failing_collection = Some(collection.to_string());
        self
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of atomic writes attempted
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        if self.failing_collection.as_deref() == Some(query.collection.as_str()) {
            return Err(StoreError::Unavailable(format!(
                "query on {} refused",
                query.collection
            )));
        }
        self.inner.query(query).await
    }

    async fn atomic_write(&self, ops: Vec<WriteOp>) -> Result<WriteResult> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit refused".to_string()));
        }
        self.inner.atomic_write(ops).await
    }

    fn subscribe(&self) -> broadcast::Receiver<CreatedDocument> {
        self.inner.subscribe()
    }
}
