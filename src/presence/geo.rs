//! Location samples and great-circle distance

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A position fix from the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix millis when the platform captured the fix
    pub captured_at: u64,
}

impl PresenceSample {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at: crate::overlay::now_millis(),
        }
    }

    pub fn at(latitude: f64, longitude: f64, captured_at: u64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at,
        }
    }

    /// Reject NaN/infinite or out-of-range coordinates.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(SyncError::Validation(format!("latitude out of range: {}", self.latitude)));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(SyncError::Validation(format!("longitude out of range: {}", self.longitude)));
        }
        Ok(())
    }

    pub fn distance_to(&self, other: &PresenceSample) -> f64 {
        haversine_meters(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Great-circle distance in meters between two WGS84 coordinates.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        assert_eq!(haversine_meters(52.52, 13.405, 52.52, 13.405), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // Paris to London, roughly 343.5 km
        let d = haversine_meters(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((d - 343_500.0).abs() < 1_500.0, "got {}", d);
    }

    #[test]
    fn test_one_millidegree_latitude_is_about_111m() {
        let d = haversine_meters(10.0, 20.0, 10.001, 20.0);
        assert!((d - 111.2).abs() < 0.5, "got {}", d);
    }

    #[test]
    fn test_validate() {
        assert!(PresenceSample::at(45.0, 90.0, 0).validate().is_ok());
        assert!(PresenceSample::at(91.0, 0.0, 0).validate().is_err());
        assert!(PresenceSample::at(0.0, -180.5, 0).validate().is_err());
        assert!(PresenceSample::at(f64::NAN, 0.0, 0).validate().is_err());
    }
}
