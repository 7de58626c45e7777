use crate::error::Result;
use crate::store::{AnnotationStore, LoadMode};
use crate::types::{Coordinate, GeocoderId, Identity, LocationPoint};
use std::collections::HashMap;
use std::path::PathBuf;

/// A state answer recovered from a previously annotated store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedState {
    pub state: String,
    pub geocoder: GeocoderId,
}

/// Read-only identity → state lookup over prior stores.
///
/// Stores are consulted in the order supplied; on collision the first store
/// wins. With coordinate matching enabled, a point whose exact identity is
/// unknown may still reuse the answer for the same coordinate at another time.
#[derive(Debug, Clone, Default)]
pub struct CacheIndex {
    exact: HashMap<Identity, CachedState>,
    by_coordinate: Option<HashMap<Coordinate, CachedState>>,
}

impl CacheIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build<'a>(
        stores: impl IntoIterator<Item = &'a AnnotationStore>,
        match_coordinates: bool,
    ) -> Self {
        let mut exact = HashMap::new();
        let mut by_coordinate = match_coordinates.then(HashMap::new);
        for store in stores {
            for point in store.points() {
                let cached = CachedState {
                    state: point.state.clone(),
                    geocoder: point.geocoder,
                };
                if let Some(coords) = by_coordinate.as_mut() {
                    coords
                        .entry(point.coordinate)
                        .or_insert_with(|| cached.clone());
                }
                exact.entry(point.identity()).or_insert(cached);
            }
        }
        Self {
            exact,
            by_coordinate,
        }
    }

    /// Load each cache source; every listed file must exist.
    pub fn load(paths: &[PathBuf], match_coordinates: bool) -> Result<Self> {
        let mut stores = Vec::with_capacity(paths.len());
        for path in paths {
            stores.push(AnnotationStore::load(path, LoadMode::RequireExisting)?);
        }
        let index = Self::build(&stores, match_coordinates);
        tracing::info!(
            sources = paths.len(),
            entries = index.len(),
            "built cache index"
        );
        Ok(index)
    }

    /// Exact identity first, then coordinate when enabled. A miss is `None`.
    pub fn lookup(&self, point: &LocationPoint) -> Option<&CachedState> {
        self.exact.get(&point.identity()).or_else(|| {
            self.by_coordinate
                .as_ref()
                .and_then(|coords| coords.get(&point.coordinate))
        })
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}
