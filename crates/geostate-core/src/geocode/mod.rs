//! Reverse-geocoding backends.
//!
//! The reconciliation engine only sees the [`Geocoder`] capability; which
//! backend sits behind it is chosen by [`GeocoderConfig`](crate::config::GeocoderConfig).

mod local;
mod osm;
pub mod states;

pub use local::{LocalGeocoder, ReferencePoint, DEFAULT_MAX_DISTANCE_KM};
pub use osm::{OsmGeocoder, DEFAULT_ENDPOINT};

use crate::config::GeocoderConfig;
use crate::error::Result;
use crate::types::{Coordinate, GeocoderId};
use std::time::Duration;
use thiserror::Error;

/// A single failed backend call. Never aborts a run on its own.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unexpected region name '{0}'")]
    UnexpectedRegion(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ResolveError {
    /// Fatal failures would repeat for every remaining point, so the
    /// dispatcher stops calling the backend after one.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ResolveError::UnexpectedRegion(_) | ResolveError::Rejected(_)
        )
    }
}

pub trait Geocoder {
    fn id(&self) -> GeocoderId;

    /// Validate configuration before any call is made.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Minimum spacing between calls required by the backend.
    fn default_pace(&self) -> Duration {
        Duration::ZERO
    }

    /// Two-letter state code for the coordinate, or `"EX"` outside the US.
    fn resolve(&self, coordinate: Coordinate) -> std::result::Result<String, ResolveError>;
}

/// Instantiate the backend described by `config`.
pub fn build(config: &GeocoderConfig) -> Result<Box<dyn Geocoder>> {
    match config {
        GeocoderConfig::Local {
            reference,
            max_distance_km,
        } => {
            let geocoder = match reference {
                Some(path) => LocalGeocoder::from_file(path, *max_distance_km)?,
                None => LocalGeocoder::builtin(*max_distance_km),
            };
            Ok(Box::new(geocoder))
        }
        GeocoderConfig::Osm {
            email,
            endpoint,
            timeout_secs,
        } => {
            let geocoder = OsmGeocoder::new(
                endpoint.clone(),
                email.clone(),
                Duration::from_secs(*timeout_secs),
            )?;
            Ok(Box::new(geocoder))
        }
    }
}
