//! Audit records for dispatch decisions.
//!
//! Every dispatch writes exactly one `emergencyDispatched` event, plus one
//! `driverAssigned` event when a driver was assigned in the same commit.

use chrono::{DateTime, Utc};

use crate::domain::{collections, DispatchEvent, DispatchEventType};
use crate::store::WriteOp;

/// Summary line for the facility event
pub fn dispatch_description(facility_id: &str, driver_id: Option<&str>) -> String {
    match driver_id {
        Some(driver_id) => format!(
            "Emergency dispatched to facility {} and driver {}",
            facility_id, driver_id
        ),
        None => format!("Emergency dispatched to facility {}", facility_id),
    }
}

/// Build the events recorded for one dispatch
pub fn dispatch_events(
    emergency_id: &str,
    facility_id: &str,
    driver_id: Option<&str>,
    timestamp: DateTime<Utc>,
) -> Vec<DispatchEvent> {
    let mut events = vec![DispatchEvent::new(
        DispatchEventType::EmergencyDispatched,
        timestamp,
        emergency_id,
        facility_id,
        dispatch_description(facility_id, driver_id),
    )];

    if let Some(driver_id) = driver_id {
        events.push(DispatchEvent::new(
            DispatchEventType::DriverAssigned,
            timestamp,
            emergency_id,
            driver_id,
            format!("Driver {} assigned to emergency", driver_id),
        ));
    }

    events
}

/// Create operation appending an event to the `events` collection
pub fn to_write_op(event: &DispatchEvent) -> Result<WriteOp, serde_json::Error> {
    Ok(WriteOp::Create {
        collection: collections::EVENTS.to_string(),
        id: event.id.clone(),
        data: serde_json::to_value(event)?,
    })
}
