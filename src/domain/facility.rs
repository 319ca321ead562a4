//! Facilities that can accept emergencies. Read-only to dispatch.

use serde::{Deserialize, Serialize};

use super::geo::GeoPoint;
use super::Candidate;

/// Field holding a facility's acceptance status
pub const ACCEPTANCE_STATUS_FIELD: &str = "emergencyAcceptanceStatus";

/// A facility document from the `facilities` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub location: Option<GeoPoint>,

    #[serde(default)]
    pub emergency_acceptance_status: Option<AcceptanceStatus>,
}

impl Facility {
    pub fn is_accepting(&self) -> bool {
        self.emergency_acceptance_status == Some(AcceptanceStatus::Available)
    }
}

impl Candidate for Facility {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> Option<GeoPoint> {
        self.location
    }
}

/// Whether a facility is taking emergencies right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStatus {
    Available,

    #[serde(untagged)]
    Other(String),
}
