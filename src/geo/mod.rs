use serde::{Deserialize, Serialize};

use crate::error::AppError;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, AppError> {
        let point = Self { lat, lng };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(AppError::InvalidCoordinate(format!(
                "non-finite coordinate ({}, {})",
                self.lat, self.lng
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::InvalidCoordinate(format!(
                "latitude {} out of range",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::InvalidCoordinate(format!(
                "longitude {} out of range",
                self.lng
            )));
        }
        Ok(())
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> Result<f64, AppError> {
    a.validate()?;
    b.validate()?;

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().atan2((1.0 - haversine).max(0.0).sqrt());

    Ok(EARTH_RADIUS_KM * central_angle)
}

/// Travel time at a constant average speed, rounded to the nearest minute.
pub fn travel_minutes(distance_km: f64, average_speed_kmh: f64) -> Result<u32, AppError> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(AppError::InvalidCoordinate(format!(
            "distance {distance_km} is not a finite non-negative number"
        )));
    }
    if !average_speed_kmh.is_finite() || average_speed_kmh <= 0.0 {
        return Err(AppError::Internal(format!(
            "average speed {average_speed_kmh} must be positive"
        )));
    }

    let minutes = (distance_km / average_speed_kmh * 60.0).round();
    Ok(minutes.min(u32::MAX as f64) as u32)
}
