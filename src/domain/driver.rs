//! Transport drivers. Read-only to dispatch.

use serde::{Deserialize, Serialize};

use super::geo::GeoPoint;
use super::Candidate;

pub const STATUS_FIELD: &str = "status";
pub const VERIFIED_FIELD: &str = "isVerified";

/// A driver document from the `drivers` collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,

    #[serde(default)]
    pub current_location: Option<GeoPoint>,

    #[serde(default)]
    pub status: Option<DriverStatus>,

    #[serde(default)]
    pub is_verified: bool,
}

impl Driver {
    /// Available and verified
    pub fn is_assignable(&self) -> bool {
        self.status == Some(DriverStatus::Available) && self.is_verified
    }
}

impl Candidate for Driver {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> Option<GeoPoint> {
        self.current_location
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Available,

    #[serde(untagged)]
    Other(String),
}
