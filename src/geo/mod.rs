pub mod cache;
pub mod google;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;
use crate::models::location::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const STATIC_AVERAGE_SPEED_KMH: f64 = 30.0;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("address not found: {0}")]
    NotFound(String),

    #[error("geo service unavailable: {0}")]
    Unavailable(String),
}

impl From<GeoError> for AppError {
    fn from(err: GeoError) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

/// Road distance and travel time between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_minutes: f64,
}

#[async_trait]
pub trait GeoService: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, GeoError>;

    async fn route_distance(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteEstimate, GeoError>;
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Offline geo backend: addresses come from a fixed gazetteer and routes are
/// great-circle distances at a constant average speed.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoService {
    gazetteer: HashMap<String, GeoPoint>,
}

impl StaticGeoService {
    pub fn new(entries: impl IntoIterator<Item = (String, GeoPoint)>) -> Self {
        Self {
            gazetteer: entries
                .into_iter()
                .map(|(address, point)| (normalize_address(&address), point))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.gazetteer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gazetteer.is_empty()
    }
}

fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

#[async_trait]
impl GeoService for StaticGeoService {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, GeoError> {
        self.gazetteer
            .get(&normalize_address(address))
            .copied()
            .ok_or_else(|| GeoError::NotFound(address.to_string()))
    }

    async fn route_distance(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteEstimate, GeoError> {
        let distance_km = haversine_km(&origin, &destination);
        Ok(RouteEstimate {
            distance_km,
            duration_minutes: distance_km / STATIC_AVERAGE_SPEED_KMH * 60.0,
        })
    }
}
