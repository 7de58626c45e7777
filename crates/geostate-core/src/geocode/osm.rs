use super::states::nominatim_code;
use super::{Geocoder, ResolveError};
use crate::error::{GeoError, Result};
use crate::types::{Coordinate, GeocoderId, OUTSIDE_US};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/reverse";

/// Zoom 5 asks Nominatim for state-level granularity only.
const STATE_ZOOM: &str = "5";

/// Nominatim's usage policy allows at most one request per second.
const USAGE_POLICY_PACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct Address {
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

/// Remote reverse geocoding against a Nominatim server.
pub struct OsmGeocoder {
    client: reqwest::blocking::Client,
    endpoint: String,
    email: Option<String>,
}

impl OsmGeocoder {
    pub fn new(endpoint: String, email: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("geostate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| GeoError::BackendUnusable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            email,
        })
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

impl Geocoder for OsmGeocoder {
    fn id(&self) -> GeocoderId {
        GeocoderId::Osm
    }

    fn check(&self) -> Result<()> {
        if self.email().is_none() {
            return Err(GeoError::BackendUnusable(
                "the osm geocoder requires a contact email".to_string(),
            ));
        }
        Ok(())
    }

    fn default_pace(&self) -> Duration {
        USAGE_POLICY_PACE
    }

    fn resolve(&self, coordinate: Coordinate) -> std::result::Result<String, ResolveError> {
        let email = self
            .email()
            .ok_or_else(|| ResolveError::Rejected("no contact email".to_string()))?;
        let lat = coordinate.latitude().to_string();
        let lon = coordinate.longitude().to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("format", "json"),
                ("zoom", STATE_ZOOM),
                ("email", email),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
            ])
            .send()
            .map_err(|e| ResolveError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ResolveError::Rejected(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }
        let body: ReverseResponse = resp
            .json()
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;
        state_from_response(body)
    }
}

/// Open water returns an `error` with no address; some territories report
/// `country_code: us` without a `state`. Both count as outside the states.
fn state_from_response(body: ReverseResponse) -> std::result::Result<String, ResolveError> {
    if body.error.is_some() {
        return Ok(OUTSIDE_US.to_string());
    }
    let Some(address) = body.address else {
        return Ok(OUTSIDE_US.to_string());
    };
    if address.country_code.as_deref() != Some("us") {
        return Ok(OUTSIDE_US.to_string());
    }
    let Some(name) = address.state else {
        return Ok(OUTSIDE_US.to_string());
    };
    nominatim_code(&name)
        .map(str::to_string)
        .ok_or(ResolveError::UnexpectedRegion(name))
}
