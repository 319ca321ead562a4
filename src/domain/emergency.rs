//! Emergency requests and their dispatch lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::GeoPoint;

/// Document field names written by the dispatch commit
pub mod fields {
    pub const STATUS: &str = "status";
    pub const ASSIGNED_FACILITY_ID: &str = "assignedFacilityId";
    pub const ASSIGNED_DRIVER_ID: &str = "assignedDriverId";
    pub const DISPATCHED_AT: &str = "dispatchedAt";
}

/// An emergency request as stored in the `emergencies` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRequest {
    pub id: String,

    pub status: EmergencyStatus,

    #[serde(default)]
    pub location: Option<GeoPoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_facility_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_driver_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl EmergencyRequest {
    /// A fresh request awaiting dispatch
    pub fn new(id: impl Into<String>, location: Option<GeoPoint>) -> Self {
        Self {
            id: id.into(),
            status: EmergencyStatus::Created,
            location,
            assigned_facility_id: None,
            assigned_driver_id: None,
            dispatched_at: None,
        }
    }

    /// Whether the dispatch engine should still act on this request
    pub fn is_awaiting_dispatch(&self) -> bool {
        self.status == EmergencyStatus::Created
    }
}

/// Lifecycle status of an emergency request.
///
/// Only `created` and `dispatched` matter to dispatch; any downstream
/// status is carried through unchanged as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    /// Newly created, waiting for a facility
    Created,

    /// Facility (and possibly a driver) assigned
    Dispatched,

    /// Any status owned by later stages
    #[serde(untagged)]
    Other(String),
}

impl EmergencyStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Dispatched => "dispatched",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for EmergencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
