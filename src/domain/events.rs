//! Audit events recorded alongside each dispatch.
//!
//! Events are append-only: they are created in the same atomic write as the
//! request update and never modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the `events` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEvent {
    /// Unique identifier for this event
    pub id: String,

    /// Type of event
    #[serde(rename = "type")]
    pub event_type: DispatchEventType,

    /// When the dispatch was committed
    pub timestamp: DateTime<Utc>,

    /// The emergency this event belongs to
    pub emergency_id: String,

    /// Facility or driver the event refers to
    pub entity_id: String,

    /// Human-readable summary
    pub description: String,
}

impl DispatchEvent {
    /// Create a new event with a generated ID
    pub fn new(
        event_type: DispatchEventType,
        timestamp: DateTime<Utc>,
        emergency_id: impl Into<String>,
        entity_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp,
            emergency_id: emergency_id.into(),
            entity_id: entity_id.into(),
            description: description.into(),
        }
    }
}

/// Kinds of dispatch decisions that get recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchEventType {
    /// A facility was assigned; written for every dispatch
    EmergencyDispatched,

    /// A driver was assigned alongside the facility
    DriverAssigned,
}
