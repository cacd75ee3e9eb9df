/// Query coordinates supplied by end users.
/// All coordinate math uses f64 for precision.
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A validated point on the globe in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryPoint {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl QueryPoint {
    /// Validate and build a query point. Non-finite or out-of-range values
    /// are rejected before any pipeline call.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ScoringError::Validation(format!("latitude {lat} outside -90..90")));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(ScoringError::Validation(format!("longitude {lon} outside -180..180")));
        }
        Ok(Self { lat, lon })
    }

    /// Convert to radians.
    pub fn to_radians(self) -> (f64, f64) {
        (self.lat.to_radians(), self.lon.to_radians())
    }

    /// Haversine distance in metres.
    pub fn distance_m(self, other: QueryPoint) -> f64 {
        let (lat1, lon1) = self.to_radians();
        let (lat2, lon2) = other.to_radians();
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}
