use crate::error::{GeoError, Result};
use crate::types::{
    format_timestamp, parse_timestamp, timestamp_from_millis, AnnotatedPoint, Coordinate,
    GeocoderId, Identity,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// On-disk layout
// ---------------------------------------------------------------------------

/// Fields are declared in key order so the written JSON is sorted.
#[derive(Serialize)]
struct StoreDocumentOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    geocoder: Option<GeocoderId>,
    locations: Vec<EntryOut<'a>>,
}

#[derive(Serialize)]
struct EntryOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy: Option<u32>,
    geocoder: GeocoderId,
    latitude: f64,
    longitude: f64,
    state: &'a str,
    timestamp: String,
}

#[derive(Deserialize)]
struct StoreDocumentIn {
    #[serde(default)]
    geocoder: Option<GeocoderId>,
    #[serde(default)]
    locations: Vec<EntryIn>,
}

/// Accepts both decimal degrees and the older E7 integer fields.
#[derive(Deserialize)]
struct EntryIn {
    timestamp: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default, rename = "latitudeE7")]
    latitude_e7: Option<i32>,
    #[serde(default, rename = "longitudeE7")]
    longitude_e7: Option<i32>,
    #[serde(default)]
    accuracy: Option<u32>,
    #[serde(default)]
    geocoder: Option<GeocoderId>,
    state: String,
}

/// The per-day layout used before stores became a flat `locations` list.
#[derive(Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    geocoder: Option<GeocoderId>,
    days: BTreeMap<String, BTreeMap<String, LegacyEntry>>,
}

#[derive(Deserialize)]
struct LegacyEntry {
    #[serde(rename = "latitudeE7")]
    latitude_e7: i32,
    #[serde(rename = "longitudeE7")]
    longitude_e7: i32,
    #[serde(default)]
    accuracy: Option<u32>,
    state: String,
}

// ---------------------------------------------------------------------------
// AnnotationStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// A missing file is an empty store (first run).
    CreateIfMissing,
    /// A missing file is [`GeoError::StoreNotFound`].
    RequireExisting,
}

/// Identity → annotation map. At most one entry per identity; every ordered
/// view is ascending by timestamp with the coordinate as tie-break.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    geocoder: Option<GeocoderId>,
    points: HashMap<Identity, AnnotatedPoint>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geocoder(geocoder: GeocoderId) -> Self {
        Self {
            geocoder: Some(geocoder),
            points: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(path: &Path, mode: LoadMode) -> Result<Self> {
        match crate::io::read_if_exists(path)? {
            Some(data) => Self::from_json(&path.display().to_string(), &data),
            None if mode == LoadMode::RequireExisting => {
                Err(GeoError::StoreNotFound(path.to_path_buf()))
            }
            None => Ok(Self::new()),
        }
    }

    /// Parse either the current or the legacy per-day layout.
    pub fn from_json(source_name: &str, data: &str) -> Result<Self> {
        let doc = crate::io::parse_json(source_name, data)?;
        let malformed = |e: serde_json::Error| GeoError::malformed(source_name, e.to_string());
        match &doc {
            Value::Object(map) if map.contains_key("days") => {
                let legacy = LegacyDocument::deserialize(&doc).map_err(malformed)?;
                Self::from_legacy(source_name, legacy)
            }
            Value::Object(_) => {
                let current = StoreDocumentIn::deserialize(&doc).map_err(malformed)?;
                Self::from_current(source_name, current)
            }
            _ => Err(GeoError::malformed(
                source_name,
                "annotated store must be a JSON object",
            )),
        }
    }

    fn from_current(source_name: &str, doc: StoreDocumentIn) -> Result<Self> {
        let mut store = Self {
            geocoder: doc.geocoder,
            points: HashMap::with_capacity(doc.locations.len()),
        };
        for (i, entry) in doc.locations.into_iter().enumerate() {
            let bad = |reason: String| GeoError::malformed(source_name, format!("location {i}: {reason}"));
            let timestamp = parse_timestamp(&entry.timestamp)
                .ok_or_else(|| bad(format!("invalid timestamp '{}'", entry.timestamp)))?;
            let coordinate = match (entry.latitude, entry.longitude, entry.latitude_e7, entry.longitude_e7) {
                (Some(lat), Some(lon), _, _) => Coordinate::from_degrees(lat, lon),
                (_, _, Some(lat), Some(lon)) => Coordinate::from_e7(lat, lon),
                _ => return Err(bad("missing latitude/longitude".to_string())),
            };
            let geocoder = entry
                .geocoder
                .or(doc.geocoder)
                .ok_or_else(|| bad("no geocoder recorded".to_string()))?;
            store.insert(AnnotatedPoint {
                timestamp,
                coordinate,
                accuracy: entry.accuracy,
                state: entry.state,
                geocoder,
            });
        }
        Ok(store)
    }

    fn from_legacy(source_name: &str, doc: LegacyDocument) -> Result<Self> {
        let geocoder = doc.geocoder.unwrap_or(GeocoderId::Local);
        let mut store = Self::with_geocoder(geocoder);
        for (day, entries) in doc.days {
            for (ts, entry) in entries {
                let timestamp = ts
                    .parse::<i64>()
                    .ok()
                    .and_then(timestamp_from_millis)
                    .ok_or_else(|| {
                        GeoError::malformed(source_name, format!("day {day}: invalid timestamp '{ts}'"))
                    })?;
                store.insert(AnnotatedPoint {
                    timestamp,
                    coordinate: Coordinate::from_e7(entry.latitude_e7, entry.longitude_e7),
                    accuracy: entry.accuracy,
                    state: entry.state,
                    geocoder,
                });
            }
        }
        Ok(store)
    }

    /// Deterministic JSON: timestamp-ordered locations, sorted keys, trailing
    /// newline. Unchanged content always serializes to the same bytes.
    pub fn to_json(&self) -> Result<String> {
        let doc = StoreDocumentOut {
            geocoder: self.geocoder,
            locations: self
                .points()
                .into_iter()
                .map(|p| EntryOut {
                    accuracy: p.accuracy,
                    geocoder: p.geocoder,
                    latitude: p.coordinate.latitude(),
                    longitude: p.coordinate.longitude(),
                    state: &p.state,
                    timestamp: format_timestamp(p.timestamp),
                })
                .collect(),
        };
        let mut out = serde_json::to_string_pretty(&doc)?;
        out.push('\n');
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = self.to_json()?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn geocoder(&self) -> Option<GeocoderId> {
        self.geocoder
    }

    pub fn set_geocoder(&mut self, geocoder: GeocoderId) {
        self.geocoder = Some(geocoder);
    }

    pub fn lookup(&self, identity: &Identity) -> Option<&AnnotatedPoint> {
        self.points.get(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.points.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All annotations, ascending by timestamp.
    pub fn points(&self) -> Vec<&AnnotatedPoint> {
        let mut out: Vec<&AnnotatedPoint> = self.points.values().collect();
        out.sort_by_key(|p| p.identity());
        out
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.points.keys()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Insert or replace by identity. Returns how many identities were new.
    pub fn upsert(&mut self, points: impl IntoIterator<Item = AnnotatedPoint>) -> usize {
        let mut inserted = 0;
        for point in points {
            if self.insert(point) {
                inserted += 1;
            }
        }
        inserted
    }

    fn insert(&mut self, point: AnnotatedPoint) -> bool {
        self.points.insert(point.identity(), point).is_none()
    }

    /// Delete the given identities. Returns how many were present.
    pub fn remove(&mut self, identities: &HashSet<Identity>) -> usize {
        identities
            .iter()
            .filter(|id| self.points.remove(id).is_some())
            .count()
    }

    /// A store holding only the annotations `keep` accepts.
    pub fn filtered(&self, keep: impl Fn(&AnnotatedPoint) -> bool) -> Self {
        Self {
            geocoder: self.geocoder,
            points: self
                .points
                .iter()
                .filter(|(_, p)| keep(p))
                .map(|(id, p)| (*id, p.clone()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
