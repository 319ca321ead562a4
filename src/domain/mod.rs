//! Domain types for the dispatch engine.
//!
//! This module contains the core data structures:
//! - Geo: coordinates and haversine distance
//! - EmergencyRequest: the record being dispatched
//! - Facility / Driver: read-only candidates
//! - DispatchEvent: immutable audit records

pub mod driver;
pub mod emergency;
pub mod events;
pub mod facility;
pub mod geo;

// Re-export commonly used types
pub use driver::{Driver, DriverStatus};
pub use emergency::{EmergencyRequest, EmergencyStatus};
pub use events::{DispatchEvent, DispatchEventType};
pub use facility::{AcceptanceStatus, Facility};
pub use geo::{haversine_km, Coordinates, GeoError, GeoPoint};

/// Collection names in the document store
pub mod collections {
    pub const EMERGENCIES: &str = "emergencies";
    pub const FACILITIES: &str = "facilities";
    pub const DRIVERS: &str = "drivers";
    pub const EVENTS: &str = "events";
}

/// A record that can be matched against an emergency's location
pub trait Candidate {
    fn id(&self) -> &str;

    /// Raw location, if the document has one
    fn location(&self) -> Option<GeoPoint>;
}
