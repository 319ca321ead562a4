//! Dispatch orchestration.
//!
//! Drives a request from `created` to `dispatched`: status guard, facility
//! selection with a degraded fallback, opportunistic driver selection, and a
//! single conditional atomic write carrying the update and its audit events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::DispatchSettings;
use crate::domain::emergency::fields;
use crate::domain::{
    collections, Coordinates, DispatchEvent, Driver, EmergencyRequest, EmergencyStatus, Facility,
    GeoError,
};
use crate::store::{Document, DocumentStore, Filter, Precondition, Query, StoreError, WriteOp, WriteResult};

use super::audit;
use super::selector::{self, CandidateSelector, Selection};
use super::trigger;

/// Errors with no safe degraded outcome; the request stays `created`
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to read emergency {emergency_id}: {source}")]
    Read {
        emergency_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Facility lookup failed for emergency {emergency_id}: {source}")]
    FacilityLookup {
        emergency_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Commit failed for emergency {emergency_id}: {source}")]
    Commit {
        emergency_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to scan pending emergencies: {0}")]
    Scan(#[source] StoreError),
}

/// Why a dispatch stopped without writing anything
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// No request document with this ID
    NotFound,

    /// The document could not be read as a request
    MissingData(String),

    /// The request has no location
    MissingLocation,

    /// The request location is not a valid coordinate
    InvalidLocation(GeoError),

    /// Neither the primary query nor the fallback produced a facility
    NoFacilityAvailable,
}

/// An entity assigned by a dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub id: String,

    /// Distance to the emergency; `None` when chosen by the fallback policy
    pub distance_km: Option<f64>,
}

/// What a committed dispatch wrote
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub emergency_id: String,
    pub facility: Assignment,
    pub driver: Option<Assignment>,
    pub dispatched_at: DateTime<Utc>,
    pub events: Vec<DispatchEvent>,
}

impl DispatchRecord {
    /// Whether the facility came from the degraded "any facility" fallback
    pub fn used_fallback(&self) -> bool {
        self.facility.distance_km.is_none()
    }
}

/// Result of one dispatch attempt
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Status, assignments and events were committed
    Dispatched(DispatchRecord),

    /// The request was no longer `created` when read
    AlreadyHandled { status: EmergencyStatus },

    /// Nothing written; the request stays `created`
    Aborted(AbortReason),

    /// The request left `created` between the read and the commit
    Conflict,
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched(_))
    }
}

/// Totals from a sweep over pending requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Dispatch engine bound to a document store
pub struct Dispatcher {
    store: Arc<dyn DocumentStore>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, settings: DispatchSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Creation-event handler.
    ///
    /// Checks the delivered snapshot first so duplicate deliveries return
    /// without a read, then runs the full dispatch against the stored state.
    #[instrument(skip(self, document), fields(emergency_id = %document.id))]
    pub async fn handle_created(&self, document: &Document) -> Result<DispatchOutcome, DispatchError> {
        info!("Emergency created");

        if let Ok(snapshot) = document.parse::<EmergencyRequest>() {
            if !snapshot.is_awaiting_dispatch() {
                info!(status = %snapshot.status, "Emergency already processed");
                return Ok(DispatchOutcome::AlreadyHandled {
                    status: snapshot.status,
                });
            }
        }

        self.dispatch(&document.id).await
    }

    /// Dispatch one request by ID
    #[instrument(skip(self))]
    pub async fn dispatch(&self, emergency_id: &str) -> Result<DispatchOutcome, DispatchError> {
        let document = self
            .store
            .get(collections::EMERGENCIES, emergency_id)
            .await
            .map_err(|source| DispatchError::Read {
                emergency_id: emergency_id.to_string(),
                source,
            })?;

        let Some(document) = document else {
            warn!("Emergency not found");
            return Ok(DispatchOutcome::Aborted(AbortReason::NotFound));
        };

        let request: EmergencyRequest = match document.parse() {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "No usable emergency data");
                return Ok(DispatchOutcome::Aborted(AbortReason::MissingData(e.to_string())));
            }
        };

        if !request.is_awaiting_dispatch() {
            info!(status = %request.status, "Emergency already processed");
            return Ok(DispatchOutcome::AlreadyHandled {
                status: request.status,
            });
        }

        let origin = match request.location.map(|p| p.to_coordinates()) {
            Some(Ok(origin)) => origin,
            Some(Err(e)) => {
                error!(error = %e, "Emergency location is invalid");
                return Ok(DispatchOutcome::Aborted(AbortReason::InvalidLocation(e)));
            }
            None => {
                error!("No location found for emergency");
                return Ok(DispatchOutcome::Aborted(AbortReason::MissingLocation));
            }
        };

        let Some(facility) = self.select_facility(emergency_id, &origin).await? else {
            warn!("Could not find suitable facility for emergency");
            return Ok(DispatchOutcome::Aborted(AbortReason::NoFacilityAvailable));
        };

        let driver = self.select_driver(&origin).await;

        self.commit(&request, facility, driver).await
    }

    /// Nearest available facility, or the first of a few arbitrary ones
    async fn select_facility(
        &self,
        emergency_id: &str,
        origin: &Coordinates,
    ) -> Result<Option<Assignment>, DispatchError> {
        let candidates = CandidateSelector::new(self.store.as_ref());

        match candidates
            .select_nearest::<Facility>(origin, &selector::available_facilities())
            .await
        {
            Selection::Found(ranked) => {
                info!(
                    facility_id = %ranked.candidate.id,
                    distance_km = %format!("{:.2}", ranked.distance_km),
                    "Nearest facility selected"
                );
                Ok(Some(Assignment {
                    id: ranked.candidate.id,
                    distance_km: Some(ranked.distance_km),
                }))
            }
            Selection::NotFound { scanned: 0 } => {
                warn!("No available facilities found, falling back to any facility");
                self.fallback_facility(emergency_id).await
            }
            Selection::NotFound { scanned } => {
                warn!(scanned, "No available facility has a usable location");
                Ok(None)
            }
            Selection::LookupError(source) => Err(DispatchError::FacilityLookup {
                emergency_id: emergency_id.to_string(),
                source,
            }),
        }
    }

    /// First of an unfiltered, limited facility query. No distance is computed.
    async fn fallback_facility(&self, emergency_id: &str) -> Result<Option<Assignment>, DispatchError> {
        let docs = self
            .store
            .query(&selector::any_facilities(self.settings.fallback_facility_limit))
            .await
            .map_err(|source| DispatchError::FacilityLookup {
                emergency_id: emergency_id.to_string(),
                source,
            })?;

        match docs.into_iter().next() {
            Some(doc) => {
                info!(facility_id = %doc.id, "Assigning fallback facility");
                Ok(Some(Assignment {
                    id: doc.id,
                    distance_km: None,
                }))
            }
            None => {
                error!("No facilities found in store");
                Ok(None)
            }
        }
    }

    /// Nearest assignable driver within the radius. Never fails the dispatch.
    async fn select_driver(&self, origin: &Coordinates) -> Option<Assignment> {
        let candidates = CandidateSelector::new(self.store.as_ref());
        let query = selector::assignable_drivers(self.settings.driver_candidate_limit);

        match candidates.select_nearest::<Driver>(origin, &query).await {
            Selection::Found(ranked)
                if selector::within_radius(ranked.distance_km, self.settings.driver_radius_km) =>
            {
                info!(
                    driver_id = %ranked.candidate.id,
                    distance_km = %format!("{:.2}", ranked.distance_km),
                    "Assigning driver"
                );
                Some(Assignment {
                    id: ranked.candidate.id,
                    distance_km: Some(ranked.distance_km),
                })
            }
            Selection::Found(ranked) => {
                info!(
                    driver_id = %ranked.candidate.id,
                    distance_km = %format!("{:.2}", ranked.distance_km),
                    radius_km = self.settings.driver_radius_km,
                    "Nearest driver is outside the dispatch radius"
                );
                None
            }
            Selection::NotFound { scanned } => {
                debug!(scanned, "No assignable driver found");
                None
            }
            Selection::LookupError(e) => {
                warn!(error = %e, "Could not assign driver, continuing without one");
                None
            }
        }
    }

    /// Write the status transition and audit events in one conditional batch
    async fn commit(
        &self,
        request: &EmergencyRequest,
        facility: Assignment,
        driver: Option<Assignment>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let dispatched_at = Utc::now();
        let driver_id = driver.as_ref().map(|d| d.id.as_str());

        let events = audit::dispatch_events(&request.id, &facility.id, driver_id, dispatched_at);

        let commit_error = |source: StoreError| DispatchError::Commit {
            emergency_id: request.id.clone(),
            source,
        };

        let mut ops = vec![request_update(&request.id, &facility.id, driver_id, dispatched_at)];
        for event in &events {
            ops.push(audit::to_write_op(event).map_err(|e| commit_error(StoreError::from(e)))?);
        }

        match self.store.atomic_write(ops).await {
            Ok(WriteResult::Committed { .. }) => {
                info!(
                    facility_id = %facility.id,
                    driver_id = driver_id.unwrap_or("none"),
                    events = events.len(),
                    "Emergency dispatched"
                );
                Ok(DispatchOutcome::Dispatched(DispatchRecord {
                    emergency_id: request.id.clone(),
                    facility,
                    driver,
                    dispatched_at,
                    events,
                }))
            }
            Ok(WriteResult::PreconditionFailed { collection, id }) => {
                warn!(%collection, %id, "Emergency changed before commit, leaving it to the other dispatch");
                Ok(DispatchOutcome::Conflict)
            }
            Err(source) => {
                error!(error = %source, "Dispatch commit failed");
                Err(commit_error(source))
            }
        }
    }

    /// Reprocess every request still waiting in `created` status
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport, DispatchError> {
        let pending = self
            .store
            .query(
                &Query::collection(collections::EMERGENCIES)
                    .filter(Filter::eq(fields::STATUS, EmergencyStatus::Created.as_str())),
            )
            .await
            .map_err(DispatchError::Scan)?;

        info!(pending = pending.len(), "Sweeping pending emergencies");

        let mut report = SweepReport::default();
        for doc in pending {
            match self.dispatch(&doc.id).await {
                Ok(outcome) if outcome.is_dispatched() => report.dispatched += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    error!(emergency_id = %doc.id, error = %e, "Dispatch failed during sweep");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run [`Dispatcher::handle_created`] for every new emergency document
    pub fn listen(self: Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        trigger::on_create(store.as_ref(), collections::EMERGENCIES, move |document| {
            let dispatcher = Arc::clone(&self);
            async move { dispatcher.handle_created(&document).await.map(|_| ()) }
        })
    }
}

/// The conditional `created` -> `dispatched` update
fn request_update(
    emergency_id: &str,
    facility_id: &str,
    driver_id: Option<&str>,
    dispatched_at: DateTime<Utc>,
) -> WriteOp {
    let mut update = Map::new();
    update.insert(
        fields::STATUS.to_string(),
        json!(EmergencyStatus::Dispatched.as_str()),
    );
    update.insert(fields::ASSIGNED_FACILITY_ID.to_string(), json!(facility_id));
    update.insert(fields::DISPATCHED_AT.to_string(), json!(dispatched_at));
    if let Some(driver_id) = driver_id {
        update.insert(fields::ASSIGNED_DRIVER_ID.to_string(), json!(driver_id));
    }

    WriteOp::Update {
        collection: collections::EMERGENCIES.to_string(),
        id: emergency_id.to_string(),
        fields: update,
        precondition: Precondition::FieldEquals {
            field: fields::STATUS.to_string(),
            value: Value::from(EmergencyStatus::Created.as_str()),
        },
    }
}
