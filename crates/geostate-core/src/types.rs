use crate::error::GeoError;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State code recorded for locations outside the 50 US states and DC.
pub const OUTSIDE_US: &str = "EX";

const E7: f64 = 1e7;

// ---------------------------------------------------------------------------
// GeocoderId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocoderId {
    Local,
    Osm,
}

impl GeocoderId {
    pub fn all() -> &'static [GeocoderId] {
        &[GeocoderId::Local, GeocoderId::Osm]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GeocoderId::Local => "local",
            GeocoderId::Osm => "osm",
        }
    }
}

impl fmt::Display for GeocoderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GeocoderId {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(GeocoderId::Local),
            "osm" => Ok(GeocoderId::Osm),
            _ => Err(GeoError::UnknownGeocoder(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

/// A coordinate pair in integer degrees × 10⁷, the precision of the raw exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub lat_e7: i32,
    pub lon_e7: i32,
}

impl Coordinate {
    pub fn from_e7(lat_e7: i32, lon_e7: i32) -> Self {
        Self { lat_e7, lon_e7 }
    }

    /// Rounds decimal degrees to E7 precision.
    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat_e7: degrees_to_e7(lat),
            lon_e7: degrees_to_e7(lon),
        }
    }

    pub fn latitude(self) -> f64 {
        f64::from(self.lat_e7) / E7
    }

    pub fn longitude(self) -> f64 {
        f64::from(self.lon_e7) / E7
    }

    pub fn is_valid(self) -> bool {
        self.lat_e7.abs() <= 900_000_000 && self.lon_e7.abs() <= 1_800_000_000
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude(), self.longitude())
    }
}

fn degrees_to_e7(deg: f64) -> i32 {
    (deg * E7).round() as i32
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The `(timestamp, latitude, longitude)` tuple naming one observation.
///
/// Ordering is timestamp first, so sorting by identity is sorting by time with
/// a deterministic tie-break on the coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub timestamp_ms: i64,
    pub coordinate: Coordinate,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = Utc
            .timestamp_millis_opt(self.timestamp_ms)
            .single()
            .map(format_timestamp)
            .unwrap_or_else(|| self.timestamp_ms.to_string());
        write!(f, "{ts}@{}", self.coordinate)
    }
}

// ---------------------------------------------------------------------------
// LocationPoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPoint {
    pub timestamp: DateTime<Utc>,
    pub coordinate: Coordinate,
    pub accuracy: Option<u32>,
    /// Position of the contributing raw source; higher is newer.
    pub source_rank: usize,
}

impl LocationPoint {
    pub fn new(timestamp: DateTime<Utc>, coordinate: Coordinate) -> Self {
        Self {
            timestamp,
            coordinate,
            accuracy: None,
            source_rank: 0,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            timestamp_ms: self.timestamp.timestamp_millis(),
            coordinate: self.coordinate,
        }
    }

    pub fn annotate(&self, state: impl Into<String>, geocoder: GeocoderId) -> AnnotatedPoint {
        AnnotatedPoint {
            timestamp: self.timestamp,
            coordinate: self.coordinate,
            accuracy: self.accuracy,
            state: state.into(),
            geocoder,
        }
    }
}

// ---------------------------------------------------------------------------
// AnnotatedPoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedPoint {
    pub timestamp: DateTime<Utc>,
    pub coordinate: Coordinate,
    pub accuracy: Option<u32>,
    /// Two-letter state code, or [`OUTSIDE_US`].
    pub state: String,
    pub geocoder: GeocoderId,
}

impl AnnotatedPoint {
    pub fn identity(&self) -> Identity {
        Identity {
            timestamp_ms: self.timestamp.timestamp_millis(),
            coordinate: self.coordinate,
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamp helpers
// ---------------------------------------------------------------------------

/// ISO-8601 in UTC with a `Z` suffix; fractional seconds only when non-zero.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn timestamp_from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
