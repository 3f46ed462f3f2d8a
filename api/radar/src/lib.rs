use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Radar API client for the MRMS reflectivity backend
pub struct RadarApi {
    client: Client,
    base_url: String,
}

/// Uniform error shape for radar fetches. `kind` mirrors the `error` field
/// of the server's error payload when one is present.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ApiError {
    #[serde(rename = "error")]
    pub kind: String,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new("Network Error", message)
    }

    pub fn unknown() -> Self {
        Self::new("Unknown Error", "An unexpected error occurred")
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::network("Request timed out")
        } else {
            ApiError::network(err.to_string())
        }
    }
}

/// One radar sample: a GeoJSON point feature carrying reflectivity in dBZ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarPoint {
    #[serde(rename = "type", default = "feature_tag")]
    pub ty: String,
    pub geometry: PointGeometry,
    pub properties: RadarProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type", default = "point_tag")]
    pub ty: String,
    /// GeoJSON axis order: [longitude, latitude]
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarProperties {
    pub reflectivity: f64,
}

/// The full radar sweep as a GeoJSON feature collection. Replaced wholesale
/// on every fetch, never mutated point by point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarData {
    #[serde(rename = "type", default = "feature_collection_tag")]
    pub ty: String,
    pub features: Vec<RadarPoint>,
}

/// Radar data plus the backend's processing and observation timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarResponse {
    pub data: RadarData,
    #[serde(rename = "lastUpdated", deserialize_with = "de_timestamp")]
    pub last_updated: DateTime<Utc>,
    #[serde(
        rename = "dataTimestamp",
        default,
        deserialize_with = "de_timestamp_opt"
    )]
    pub data_timestamp: Option<DateTime<Utc>>,
}

fn feature_tag() -> String {
    "Feature".to_string()
}

fn point_tag() -> String {
    "Point".to_string()
}

fn feature_collection_tag() -> String {
    "FeatureCollection".to_string()
}

impl RadarPoint {
    pub fn new(lon: f64, lat: f64, reflectivity: f64) -> Self {
        Self {
            ty: feature_tag(),
            geometry: PointGeometry {
                ty: point_tag(),
                coordinates: [lon, lat],
            },
            properties: RadarProperties { reflectivity },
        }
    }

    pub fn lon(&self) -> f64 {
        self.geometry.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.geometry.coordinates[1]
    }

    pub fn reflectivity(&self) -> f64 {
        self.properties.reflectivity
    }
}

impl RadarData {
    pub fn new(features: Vec<RadarPoint>) -> Self {
        Self {
            ty: feature_collection_tag(),
            features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Parse an ISO-8601 timestamp. The backend emits naive local-less strings
/// (`datetime.isoformat()` without a zone); those are treated as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

fn de_timestamp_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw))),
        None => Ok(None),
    }
}

/// Decode a raw HTTP response into radar data or the uniform error shape.
/// Kept separate from the transport so the mapping table is testable.
pub fn decode_response(status: StatusCode, body: &[u8]) -> Result<RadarResponse, ApiError> {
    if !status.is_success() {
        if let Ok(payload) = serde_json::from_slice::<ApiError>(body) {
            return Err(payload);
        }
        return Err(ApiError::network(format!(
            "Request failed with status {}",
            status
        )));
    }

    match serde_json::from_slice::<RadarResponse>(body) {
        Ok(response) => Ok(response),
        Err(_) => {
            // The backend answers 200 with {error, message} while its cache
            // is still warming up; surface that payload as the error.
            if let Ok(payload) = serde_json::from_slice::<ApiError>(body) {
                Err(payload)
            } else {
                Err(ApiError::unknown())
            }
        }
    }
}

impl RadarApi {
    /// Create a new radar API client with the standard 30 second timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fetch the latest radar snapshot. No retries happen here; retry is a
    /// caller decision.
    pub async fn fetch_latest(&self) -> Result<RadarResponse, ApiError> {
        let url = format!("{}/api/radar/latest", self.base_url.trim_end_matches('/'));
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        decode_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success() {
        let body = r#"{
            "data": {"type": "FeatureCollection", "features": [
                {"type": "Feature",
                 "geometry": {"type": "Point", "coordinates": [-100.0, 40.0]},
                 "properties": {"reflectivity": 35.0}}
            ]},
            "lastUpdated": "2025-06-01T12:30:45.123456",
            "dataTimestamp": "2025-06-01T12:25:00"
        }"#;

        let response = decode_response(StatusCode::OK, body.as_bytes()).unwrap();
        assert_eq!(response.data.features.len(), 1);
        assert_eq!(response.data.features[0].lon(), -100.0);
        assert_eq!(response.data.features[0].lat(), 40.0);
        assert_eq!(response.data.features[0].reflectivity(), 35.0);
        assert!(response.data_timestamp.is_some());
        assert!(response.data_timestamp.unwrap() <= response.last_updated);
    }

    #[test]
    fn test_decode_server_error_payload() {
        let body = r#"{"error": "ServiceUnavailable", "message": "upstream timeout"}"#;
        let err = decode_response(StatusCode::INTERNAL_SERVER_ERROR, body.as_bytes()).unwrap_err();
        assert_eq!(err.kind, "ServiceUnavailable");
        assert_eq!(err.message, "upstream timeout");
    }

    #[test]
    fn test_decode_server_error_without_payload() {
        let err = decode_response(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.kind, "Network Error");
        assert!(err.message.contains("502"));
    }

    #[test]
    fn test_decode_error_shaped_200() {
        let body = r#"{"error": "Radar data not available",
                       "message": "Data is still being fetched. Please try again in a moment."}"#;
        let err = decode_response(StatusCode::OK, body.as_bytes()).unwrap_err();
        assert_eq!(err.kind, "Radar data not available");
    }

    #[test]
    fn test_decode_garbage_is_unknown() {
        let err = decode_response(StatusCode::OK, b"not json at all").unwrap_err();
        assert_eq!(err.kind, "Unknown Error");
        assert_eq!(err.message, "An unexpected error occurred");
    }

    #[test]
    fn test_null_data_timestamp() {
        let body = r#"{"data": {"type": "FeatureCollection", "features": []},
                       "lastUpdated": "2025-06-01T12:30:45",
                       "dataTimestamp": null}"#;
        let response = decode_response(StatusCode::OK, body.as_bytes()).unwrap();
        assert!(response.data.is_empty());
        assert!(response.data_timestamp.is_none());
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert!(parse_timestamp("2025-06-01T12:30:45.123456").is_some());
        assert!(parse_timestamp("2025-06-01T12:30:45").is_some());
        assert!(parse_timestamp("2025-06-01T12:30:45Z").is_some());
        assert!(parse_timestamp("2025-06-01T12:30:45+00:00").is_some());
        assert!(parse_timestamp("last tuesday").is_none());
    }

    #[tokio::test]
    async fn test_api_creation() {
        let api = RadarApi::new(DEFAULT_BASE_URL);
        assert!(api.is_ok());
    }
}
