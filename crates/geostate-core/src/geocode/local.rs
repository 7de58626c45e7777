use super::{Geocoder, ResolveError};
use crate::error::{GeoError, Result};
use crate::types::{Coordinate, GeocoderId, OUTSIDE_US};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MAX_DISTANCE_KM: f64 = 800.0;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// One labelled location in the offline classifier's table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub state: String,
    pub lat: f64,
    pub lon: f64,
}

/// Approximate geographic centers; coarse near borders.
const BUILTIN: &[(&str, f64, f64)] = &[
    ("AL", 32.8, -86.8),
    ("AK", 64.0, -152.0),
    ("AZ", 34.3, -111.7),
    ("AR", 34.9, -92.4),
    ("CA", 37.2, -119.5),
    ("CO", 39.0, -105.5),
    ("CT", 41.6, -72.7),
    ("DE", 39.0, -75.5),
    ("DC", 38.9, -77.03),
    ("FL", 28.6, -82.4),
    ("GA", 32.7, -83.4),
    ("HI", 20.8, -156.3),
    ("ID", 44.4, -114.6),
    ("IL", 40.0, -89.2),
    ("IN", 39.9, -86.3),
    ("IA", 42.1, -93.5),
    ("KS", 38.5, -98.4),
    ("KY", 37.5, -85.3),
    ("LA", 31.1, -92.0),
    ("ME", 45.4, -69.2),
    ("MD", 39.0, -76.8),
    ("MA", 42.3, -71.8),
    ("MI", 44.3, -85.4),
    ("MN", 46.3, -94.3),
    ("MS", 32.7, -89.7),
    ("MO", 38.4, -92.5),
    ("MT", 47.0, -109.6),
    ("NE", 41.5, -99.8),
    ("NV", 39.3, -116.6),
    ("NH", 43.7, -71.6),
    ("NJ", 40.2, -74.7),
    ("NM", 34.4, -106.1),
    ("NY", 42.9, -75.5),
    ("NC", 35.6, -79.4),
    ("ND", 47.5, -100.5),
    ("OH", 40.3, -82.8),
    ("OK", 35.6, -97.5),
    ("OR", 43.9, -120.6),
    ("PA", 40.9, -77.8),
    ("RI", 41.7, -71.5),
    ("SC", 33.9, -80.9),
    ("SD", 44.4, -100.2),
    ("TN", 35.9, -86.4),
    ("TX", 31.5, -99.3),
    ("UT", 39.3, -111.7),
    ("VT", 44.1, -72.7),
    ("VA", 37.5, -78.9),
    ("WA", 47.4, -120.5),
    ("WV", 38.6, -80.6),
    ("WI", 44.6, -89.9),
    ("WY", 43.0, -107.6),
];

/// Offline nearest-reference-point classifier. Fast and free of usage
/// limits, but only as precise as its reference table.
pub struct LocalGeocoder {
    references: Vec<ReferencePoint>,
    max_distance_km: f64,
}

impl LocalGeocoder {
    pub fn new(references: Vec<ReferencePoint>, max_distance_km: f64) -> Self {
        Self {
            references,
            max_distance_km,
        }
    }

    pub fn builtin(max_distance_km: f64) -> Self {
        let references = BUILTIN
            .iter()
            .map(|(state, lat, lon)| ReferencePoint {
                state: (*state).to_string(),
                lat: *lat,
                lon: *lon,
            })
            .collect();
        Self::new(references, max_distance_km)
    }

    /// Load a YAML list of `{state, lat, lon}` entries.
    pub fn from_file(path: &Path, max_distance_km: f64) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            GeoError::BackendUnusable(format!(
                "cannot read reference table {}: {e}",
                path.display()
            ))
        })?;
        let references: Vec<ReferencePoint> = serde_yaml::from_str(&data)
            .map_err(|e| GeoError::malformed(path.display().to_string(), e.to_string()))?;
        Ok(Self::new(references, max_distance_km))
    }

    pub fn references(&self) -> &[ReferencePoint] {
        &self.references
    }
}

impl Geocoder for LocalGeocoder {
    fn id(&self) -> GeocoderId {
        GeocoderId::Local
    }

    fn check(&self) -> Result<()> {
        if self.references.is_empty() {
            return Err(GeoError::BackendUnusable(
                "local geocoder has an empty reference table".to_string(),
            ));
        }
        if self.max_distance_km.is_nan() || self.max_distance_km <= 0.0 {
            return Err(GeoError::BackendUnusable(format!(
                "local geocoder max_distance_km must be positive, got {}",
                self.max_distance_km
            )));
        }
        Ok(())
    }

    fn resolve(&self, coordinate: Coordinate) -> std::result::Result<String, ResolveError> {
        let (lat, lon) = (coordinate.latitude(), coordinate.longitude());
        let nearest = self
            .references
            .iter()
            .map(|r| (r, haversine_km(lat, lon, r.lat, r.lon)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((r, d)) if d <= self.max_distance_km => Ok(r.state.clone()),
            Some(_) => Ok(OUTSIDE_US.to_string()),
            None => Err(ResolveError::Rejected("empty reference table".to_string())),
        }
    }
}

/// Great-circle distance in kilometres.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = (lat2 - lat1).to_radians();
    let dl = (lon2 - lon1).to_radians();
    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_covers_states_and_dc() {
        assert_eq!(LocalGeocoder::builtin(DEFAULT_MAX_DISTANCE_KM).references().len(), 51);
    }

    #[test]
    fn nearest_reference_wins() {
        let g = LocalGeocoder::builtin(DEFAULT_MAX_DISTANCE_KM);
        let boulder = Coordinate::from_degrees(40.01, -105.27);
        assert_eq!(g.resolve(boulder).unwrap(), "CO");
    }

    #[test]
    fn far_from_every_reference_is_outside() {
        let g = LocalGeocoder::builtin(DEFAULT_MAX_DISTANCE_KM);
        let paris = Coordinate::from_degrees(48.85, 2.35);
        assert_eq!(g.resolve(paris).unwrap(), OUTSIDE_US);
    }

    #[test]
    fn reference_table_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("refs.yaml");
        std::fs::write(
            &path,
            "- state: NY\n  lat: 40.75\n  lon: -73.99\n- state: NJ\n  lat: 40.73\n  lon: -74.17\n",
        )
        .unwrap();
        let g = LocalGeocoder::from_file(&path, 50.0).unwrap();
        assert!(g.check().is_ok());
        assert_eq!(g.resolve(Coordinate::from_degrees(40.76, -73.98)).unwrap(), "NY");
        assert_eq!(g.resolve(Coordinate::from_degrees(40.72, -74.2)).unwrap(), "NJ");
    }

    #[test]
    fn empty_table_is_unusable() {
        let g = LocalGeocoder::new(Vec::new(), 100.0);
        assert!(matches!(g.check(), Err(GeoError::BackendUnusable(_))));
    }

    #[test]
    fn missing_table_file_is_unusable() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            LocalGeocoder::from_file(&dir.path().join("nope.yaml"), 100.0),
            Err(GeoError::BackendUnusable(_))
        ));
    }

    #[test]
    fn haversine_known_distance() {
        // New York to Los Angeles is roughly 3936 km.
        let d = haversine_km(40.7128, -74.0060, 34.0522, -118.2437);
        assert!((d - 3936.0).abs() < 15.0, "{d}");
    }
}
