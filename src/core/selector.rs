//! Nearest-candidate selection.
//!
//! A linear scan over the candidates returned by one store query. Selection
//! results are explicit: a candidate was found, nothing qualified, or the
//! lookup itself failed. The caller decides what each case means.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::{collections, driver, facility, haversine_km, Candidate, Coordinates};
use crate::store::{DocumentStore, Filter, Query, StoreError};

/// A candidate together with its distance to the origin
#[derive(Debug, Clone)]
pub struct Ranked<T> {
    pub candidate: T,
    pub distance_km: f64,
}

/// Result of a nearest-candidate lookup
#[derive(Debug)]
pub enum Selection<T> {
    /// The nearest qualifying candidate
    Found(Ranked<T>),

    /// No candidate with a usable location; `scanned` is how many the query returned
    NotFound { scanned: usize },

    /// The store query failed
    LookupError(StoreError),
}

/// Pick the candidate closest to `origin`.
///
/// Candidates without a valid location are skipped. On equal distance the
/// first candidate in iteration order wins.
pub fn nearest<T, I>(origin: &Coordinates, candidates: I) -> Option<Ranked<T>>
where
    T: Candidate,
    I: IntoIterator<Item = T>,
{
    let mut best: Option<Ranked<T>> = None;

    for candidate in candidates {
        let Some(point) = candidate.location() else {
            debug!(candidate_id = candidate.id(), "Candidate has no location, skipping");
            continue;
        };

        let coords = match point.to_coordinates() {
            Ok(coords) => coords,
            Err(e) => {
                debug!(candidate_id = candidate.id(), error = %e, "Candidate location unusable, skipping");
                continue;
            }
        };

        let distance_km = haversine_km(origin, &coords);
        if best.as_ref().map_or(true, |b| distance_km < b.distance_km) {
            best = Some(Ranked {
                candidate,
                distance_km,
            });
        }
    }

    best
}

/// Inclusive radius check
pub fn within_radius(distance_km: f64, radius_km: f64) -> bool {
    distance_km <= radius_km
}

/// Facilities currently accepting emergencies (no limit)
pub fn available_facilities() -> Query {
    Query::collection(collections::FACILITIES)
        .filter(Filter::eq(facility::ACCEPTANCE_STATUS_FIELD, "available"))
}

/// Any facilities at all, for the degraded fallback
pub fn any_facilities(limit: usize) -> Query {
    Query::collection(collections::FACILITIES).limit(limit)
}

/// Drivers that are available and verified
pub fn assignable_drivers(limit: usize) -> Query {
    Query::collection(collections::DRIVERS)
        .filter(Filter::eq(driver::STATUS_FIELD, "available"))
        .filter(Filter::eq(driver::VERIFIED_FIELD, true))
        .limit(limit)
}

/// Runs store queries and ranks their results
pub struct CandidateSelector<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> CandidateSelector<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Fetch candidates with `query` and return the nearest to `origin`
    pub async fn select_nearest<T>(&self, origin: &Coordinates, query: &Query) -> Selection<T>
    where
        T: Candidate + DeserializeOwned,
    {
        let mut docs = match self.store.query(query).await {
            Ok(docs) => docs,
            Err(e) => return Selection::LookupError(e),
        };

        // Never scan past the limit, even if the backend returned more
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        let scanned = docs.len();

        let candidates = docs.into_iter().filter_map(|doc| match doc.parse::<T>() {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                debug!(
                    collection = %query.collection,
                    document_id = %doc.id,
                    error = %e,
                    "Skipping malformed candidate"
                );
                None
            }
        });

        match nearest(origin, candidates) {
            Some(ranked) => Selection::Found(ranked),
            None => Selection::NotFound { scanned },
        }
    }
}
