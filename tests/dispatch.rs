//! Dispatch Integration Tests
//!
//! Facility selection, the fallback policy, driver assignment and the
//! records written by a successful dispatch.

mod common;

use std::sync::Arc;

use common::*;
use healyri_dispatch::config::DispatchSettings;
use healyri_dispatch::core::{AbortReason, DispatchOutcome, Dispatcher};
use healyri_dispatch::domain::{haversine_km, Coordinates, DispatchEventType};
use healyri_dispatch::store::MemoryStore;
use healyri_dispatch::DocumentStore;

fn expect_dispatched(outcome: DispatchOutcome) -> healyri_dispatch::core::DispatchRecord {
    match outcome {
        DispatchOutcome::Dispatched(record) => record,
        other => panic!("expected a dispatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nearest_facility_chosen() {
    let store = Arc::new(MemoryStore::new());
    add_facility(&store, "facility-uth", Some((-15.4000, 28.3300)), "available");
    add_facility(&store, "facility-lusaka-general", Some(ORIGIN), "available");
    add_emergency(&store, "em-1", Some(ORIGIN));

    let outcome = dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap();
    let record = expect_dispatched(outcome);

    assert_eq!(record.facility.id, "facility-lusaka-general");
    assert_eq!(record.facility.distance_km, Some(0.0));
    assert!(!record.used_fallback());
    assert!(record.driver.is_none());

    let stored = emergency(store.as_ref(), "em-1").await;
    assert_eq!(stored["status"], "dispatched");
    assert_eq!(stored["assignedFacilityId"], "facility-lusaka-general");
    assert!(stored.get("dispatchedAt").is_some());
    assert!(stored.get("assignedDriverId").is_none());
    // Fields not owned by dispatch are untouched
    assert_eq!(stored["patientId"], "patient-1");

    let events = events_for(store.as_ref(), "em-1").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, DispatchEventType::EmergencyDispatched);
    assert_eq!(events[0].entity_id, "facility-lusaka-general");
}

#[tokio::test]
async fn test_unavailable_facilities_ignored_when_some_available() {
    let store = Arc::new(MemoryStore::new());
    add_facility(&store, "closed-nearby", Some(ORIGIN), "closed");
    add_facility(&store, "open-far", Some((-12.8024, 28.2132)), "available");
    add_emergency(&store, "em-1", Some(ORIGIN));

    let record = expect_dispatched(dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap());

    assert_eq!(record.facility.id, "open-far");
    assert!(record.facility.distance_km.unwrap() > 250.0);
}

#[tokio::test]
async fn test_fallback_assigns_first_of_unfiltered_query() {
    let store = Arc::new(MemoryStore::new());
    // None available; the first by ID has no location at all
    add_facility(&store, "a-clinic", None, "full");
    add_facility(&store, "b-hospital", Some(ORIGIN), "closed");
    add_facility(&store, "c-hospital", Some((-15.4000, 28.3300)), "closed");
    add_emergency(&store, "em-1", Some(ORIGIN));

    let record = expect_dispatched(dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap());

    assert_eq!(record.facility.id, "a-clinic");
    assert!(record.used_fallback());
    assert_eq!(
        emergency(store.as_ref(), "em-1").await["assignedFacilityId"],
        "a-clinic"
    );
}

#[tokio::test]
async fn test_no_facilities_at_all_aborts() {
    let store = Arc::new(MemoryStore::new());
    add_emergency(&store, "em-1", Some(ORIGIN));

    let outcome = dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap();

    assert!(matches!(
        outcome,
        DispatchOutcome::Aborted(AbortReason::NoFacilityAvailable)
    ));
    assert_eq!(emergency(store.as_ref(), "em-1").await["status"], "created");
    assert_eq!(store.count("events").unwrap(), 0);
}

#[tokio::test]
async fn test_available_facilities_without_location_abort() {
    let store = Arc::new(MemoryStore::new());
    add_facility(&store, "f-1", None, "available");
    add_facility(&store, "f-2", Some(ORIGIN), "closed");
    add_emergency(&store, "em-1", Some(ORIGIN));

    let outcome = dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap();

    assert!(matches!(
        outcome,
        DispatchOutcome::Aborted(AbortReason::NoFacilityAvailable)
    ));
    assert_eq!(emergency(store.as_ref(), "em-1").await["status"], "created");
}

#[tokio::test]
async fn test_missing_location_aborts_without_write() {
    let store = Arc::new(FaultyStore::new(MemoryStore::new()));
    add_facility(&store.inner, "f-1", Some(ORIGIN), "available");
    add_emergency(&store.inner, "em-1", None);

    let outcome = dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap();

    assert!(matches!(
        outcome,
        DispatchOutcome::Aborted(AbortReason::MissingLocation)
    ));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_out_of_range_location_aborts() {
    let store = Arc::new(MemoryStore::new());
    add_facility(&store, "f-1", Some(ORIGIN), "available");
    add_emergency(&store, "em-1", Some((95.0, 28.0)));

    let outcome = dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap();

    assert!(matches!(
        outcome,
        DispatchOutcome::Aborted(AbortReason::InvalidLocation(_))
    ));
}

#[tokio::test]
async fn test_unknown_request_aborts() {
    let store = Arc::new(MemoryStore::new());

    let outcome = dispatcher(store).dispatch("missing").await.unwrap();

    assert!(matches!(outcome, DispatchOutcome::Aborted(AbortReason::NotFound)));
}

#[tokio::test]
async fn test_nearest_verified_driver_assigned() {
    let store = Arc::new(MemoryStore::new());
    add_facility(&store, "f-1", Some(ORIGIN), "available");
    add_driver(&store, "d-near-unverified", north_of(ORIGIN.0, ORIGIN.1, 1.0), "available", false);
    add_driver(&store, "d-near-busy", north_of(ORIGIN.0, ORIGIN.1, 1.0), "on_trip", true);
    add_driver(&store, "d-mid", north_of(ORIGIN.0, ORIGIN.1, 5.0), "available", true);
    add_driver(&store, "d-far", north_of(ORIGIN.0, ORIGIN.1, 20.0), "available", true);
    add_emergency(&store, "em-1", Some(ORIGIN));

    let record = expect_dispatched(dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap());

    let driver = record.driver.expect("driver assigned");
    assert_eq!(driver.id, "d-mid");
    assert!((driver.distance_km.unwrap() - 5.0).abs() < 1e-6);

    let stored = emergency(store.as_ref(), "em-1").await;
    assert_eq!(stored["assignedDriverId"], "d-mid");

    let mut events = events_for(store.as_ref(), "em-1").await;
    events.sort_by_key(|e| e.event_type == DispatchEventType::DriverAssigned);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, DispatchEventType::EmergencyDispatched);
    assert_eq!(
        events[0].description,
        "Emergency dispatched to facility f-1 and driver d-mid"
    );
    assert_eq!(events[1].event_type, DispatchEventType::DriverAssigned);
    assert_eq!(events[1].entity_id, "d-mid");
}

#[tokio::test]
async fn test_driver_outside_default_radius_not_assigned() {
    let store = Arc::new(MemoryStore::new());
    add_facility(&store, "f-1", Some(ORIGIN), "available");
    add_driver(&store, "d-far", north_of(ORIGIN.0, ORIGIN.1, 50.1), "available", true);
    add_emergency(&store, "em-1", Some(ORIGIN));

    let record = expect_dispatched(dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap());

    assert!(record.driver.is_none());
    assert_eq!(record.events.len(), 1);
    assert!(emergency(store.as_ref(), "em-1").await.get("assignedDriverId").is_none());
}

#[tokio::test]
async fn test_driver_inside_default_radius_assigned() {
    let store = Arc::new(MemoryStore::new());
    add_facility(&store, "f-1", Some(ORIGIN), "available");
    add_driver(&store, "d-edge", north_of(ORIGIN.0, ORIGIN.1, 49.9), "available", true);
    add_emergency(&store, "em-1", Some(ORIGIN));

    let record = expect_dispatched(dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap());

    assert_eq!(record.driver.unwrap().id, "d-edge");
}

#[tokio::test]
async fn test_driver_radius_boundary_is_inclusive() {
    let driver_at = north_of(ORIGIN.0, ORIGIN.1, 50.0);
    let distance = haversine_km(
        &Coordinates::new(ORIGIN.0, ORIGIN.1).unwrap(),
        &Coordinates::new(driver_at.0, driver_at.1).unwrap(),
    );

    for (radius, expect_driver) in [(distance, true), (distance - 0.01, false)] {
        let store = Arc::new(MemoryStore::new());
        add_facility(&store, "f-1", Some(ORIGIN), "available");
        add_driver(&store, "d-1", driver_at, "available", true);
        add_emergency(&store, "em-1", Some(ORIGIN));

        let settings = DispatchSettings {
            driver_radius_km: radius,
            ..Default::default()
        };
        let outcome = Dispatcher::new(store, settings).dispatch("em-1").await.unwrap();

        assert_eq!(
            expect_dispatched(outcome).driver.is_some(),
            expect_driver,
            "radius {radius}"
        );
    }
}

#[tokio::test]
async fn test_driver_scan_bounded_by_candidate_limit() {
    let store = Arc::new(MemoryStore::new());
    add_facility(&store, "f-1", Some(ORIGIN), "available");
    // IDs sort d-0 .. d-2; the nearest one sorts last
    add_driver(&store, "d-0", north_of(ORIGIN.0, ORIGIN.1, 10.0), "available", true);
    add_driver(&store, "d-1", north_of(ORIGIN.0, ORIGIN.1, 8.0), "available", true);
    add_driver(&store, "d-2", north_of(ORIGIN.0, ORIGIN.1, 1.0), "available", true);
    add_emergency(&store, "em-1", Some(ORIGIN));

    let settings = DispatchSettings {
        driver_candidate_limit: 2,
        ..Default::default()
    };
    let outcome = Dispatcher::new(store, settings).dispatch("em-1").await.unwrap();

    assert_eq!(expect_dispatched(outcome).driver.unwrap().id, "d-1");
}

#[tokio::test]
async fn test_driver_lookup_failure_isolated() {
    let inner = MemoryStore::new();
    add_facility(&inner, "f-1", Some(ORIGIN), "available");
    add_driver(&inner, "d-1", ORIGIN, "available", true);
    add_emergency(&inner, "em-1", Some(ORIGIN));
    let store = Arc::new(FaultyStore::new(inner).failing_queries("drivers"));

    let record = expect_dispatched(dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap());

    assert!(record.driver.is_none());
    let stored = emergency(store.as_ref(), "em-1").await;
    assert_eq!(stored["status"], "dispatched");
    assert_eq!(stored["assignedFacilityId"], "f-1");
    assert!(stored.get("assignedDriverId").is_none());
    assert_eq!(events_for(store.as_ref(), "em-1").await.len(), 1);
}

#[tokio::test]
async fn test_facility_lookup_failure_propagates() {
    let inner = MemoryStore::new();
    add_emergency(&inner, "em-1", Some(ORIGIN));
    let store = Arc::new(FaultyStore::new(inner).failing_queries("facilities"));

    let result = dispatcher(Arc::clone(&store)).dispatch("em-1").await;

    assert!(result.is_err());
    assert_eq!(store.writes(), 0);
    assert_eq!(emergency(store.as_ref(), "em-1").await["status"], "created");
}

#[tokio::test]
async fn test_record_matches_store() {
    let store = Arc::new(MemoryStore::new());
    add_facility(&store, "f-1", Some(ORIGIN), "available");
    add_driver(&store, "d-1", north_of(ORIGIN.0, ORIGIN.1, 2.0), "available", true);
    add_emergency(&store, "em-1", Some(ORIGIN));

    let record = expect_dispatched(dispatcher(Arc::clone(&store)).dispatch("em-1").await.unwrap());

    let mut stored_ids: Vec<String> = events_for(store.as_ref(), "em-1")
        .await
        .into_iter()
        .map(|e| e.id)
        .collect();
    let mut record_ids: Vec<String> = record.events.iter().map(|e| e.id.clone()).collect();
    stored_ids.sort();
    record_ids.sort();
    assert_eq!(stored_ids, record_ids);

    let doc = store.get("emergencies", "em-1").await.unwrap().unwrap();
    let stored: healyri_dispatch::EmergencyRequest = doc.parse().unwrap();
    assert_eq!(stored.dispatched_at, Some(record.dispatched_at));
}
