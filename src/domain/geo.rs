//! Geographic coordinates and great-circle distance.
//!
//! Store documents carry raw `{latitude, longitude}` pairs ([`GeoPoint`]).
//! They are validated into [`Coordinates`] before any distance is computed,
//! so [`haversine_km`] never sees NaN or out-of-range input.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Errors raised when a raw point cannot be used for distance math
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Latitude is not a finite number in [-90, 90]: {0}")]
    InvalidLatitude(f64),

    #[error("Longitude is not a finite number in [-180, 180]: {0}")]
    InvalidLongitude(f64),
}

/// Raw location as stored in documents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Validate into coordinates usable by [`haversine_km`]
    pub fn to_coordinates(self) -> Result<Coordinates, GeoError> {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// A validated latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    /// Create coordinates, rejecting non-finite or out-of-range values
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to another point in kilometers
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        haversine_km(self, other)
    }
}

impl From<Coordinates> for GeoPoint {
    fn from(c: Coordinates) -> Self {
        GeoPoint::new(c.latitude, c.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Haversine distance between two points (km)
pub fn haversine_km(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}
