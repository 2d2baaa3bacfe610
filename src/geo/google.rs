use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::geo::{GeoError, GeoService, RouteEstimate};
use crate::models::location::GeoPoint;

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Geocoding and Distance Matrix client for the Google Maps web APIs.
pub struct GoogleMapsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleMapsClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: GeoPoint,
}

#[derive(Deserialize)]
struct DistanceMatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Deserialize)]
struct MatrixRow {
    elements: Vec<MatrixElement>,
}

#[derive(Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<MatrixValue>,
    duration: Option<MatrixValue>,
}

#[derive(Deserialize)]
struct MatrixValue {
    value: f64,
}

fn unavailable(err: reqwest::Error) -> GeoError {
    GeoError::Unavailable(err.to_string())
}

#[async_trait]
impl GeoService for GoogleMapsClient {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, GeoError> {
        let response: GeocodeResponse = self
            .http
            .get(format!("{}/geocode/json", self.base_url))
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        geocode_outcome(address, response)
    }

    async fn route_distance(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteEstimate, GeoError> {
        let origins = format!("{},{}", origin.lat, origin.lng);
        let destinations = format!("{},{}", destination.lat, destination.lng);

        let response: DistanceMatrixResponse = self
            .http
            .get(format!("{}/distancematrix/json", self.base_url))
            .query(&[
                ("origins", origins.as_str()),
                ("destinations", destinations.as_str()),
                ("units", "metric"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        route_outcome(response)
    }
}

fn geocode_outcome(address: &str, response: GeocodeResponse) -> Result<GeoPoint, GeoError> {
    match (response.status.as_str(), response.results.first()) {
        ("OK", Some(result)) => Ok(result.geometry.location),
        ("OK" | "ZERO_RESULTS", _) => Err(GeoError::NotFound(address.to_string())),
        (status, _) => {
            warn!(status, "geocoding request rejected");
            Err(GeoError::Unavailable(format!("geocoding status {status}")))
        }
    }
}

fn route_outcome(response: DistanceMatrixResponse) -> Result<RouteEstimate, GeoError> {
    let element = response
        .rows
        .first()
        .and_then(|row| row.elements.first());

    match (response.status.as_str(), element) {
        ("OK", Some(MatrixElement {
            status,
            distance: Some(distance),
            duration: Some(duration),
        })) if status == "OK" => Ok(RouteEstimate {
            distance_km: distance.value / 1000.0,
            duration_minutes: duration.value / 60.0,
        }),
        (status, element) => {
            let detail = response
                .error_message
                .clone()
                .or_else(|| element.map(|e| e.status.clone()))
                .unwrap_or_else(|| status.to_string());
            Err(GeoError::Unavailable(format!(
                "failed to calculate distance: {detail}"
            )))
        }
    }
}
