//! File-level annotation run: read raw exports and the store from disk,
//! reconcile, and persist.

use crate::cache::CacheIndex;
use crate::config::{CacheConfig, DispatchConfig, GeocoderConfig};
use crate::dispatch::GeocodeDispatcher;
use crate::error::Result;
use crate::extract::PointExtractor;
use crate::geocode;
use crate::merge::merge_files;
use crate::reconcile::{
    plan, reconcile, FileCheckpoint, Invalidation, ReconcileOptions, ReconcileStats,
};
use crate::store::{AnnotationStore, LoadMode};
use crate::types::GeocoderId;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AnnotateRequest {
    /// Raw exports, oldest first; later files win on duplicate identities.
    pub raw: Vec<PathBuf>,
    pub store: PathBuf,
    pub store_mode: LoadMode,
    pub cache: CacheConfig,
    /// Configured backend settings; the backend for a new store unless
    /// `requested` names another.
    pub geocoder: GeocoderConfig,
    /// Explicit backend choice. When absent, an existing store keeps the
    /// backend it records.
    pub requested: Option<GeocoderId>,
    /// Contact email, applied to whichever backend is selected.
    pub email: Option<String>,
    pub dispatch: DispatchConfig,
    pub invalidation: Invalidation,
    pub allow_geocoder_change: bool,
}

impl AnnotateRequest {
    pub fn new(raw: Vec<PathBuf>, store: PathBuf) -> Self {
        Self {
            raw,
            store,
            store_mode: LoadMode::CreateIfMissing,
            cache: CacheConfig::default(),
            geocoder: GeocoderConfig::default(),
            requested: None,
            email: None,
            dispatch: DispatchConfig::default(),
            invalidation: Invalidation::Off,
            allow_geocoder_change: false,
        }
    }

    /// Backend settings for a run against `store`: the explicit choice, else
    /// the store's recorded backend, else the configured one. A backend other
    /// than the configured one runs with its default settings.
    pub fn select_geocoder(&self, store: &AnnotationStore) -> GeocoderConfig {
        let id = self
            .requested
            .or(store.geocoder())
            .unwrap_or_else(|| self.geocoder.id());
        let mut selected = if id == self.geocoder.id() {
            self.geocoder.clone()
        } else {
            GeocoderConfig::for_id(id)
        };
        if let Some(email) = &self.email {
            selected.set_email(email.clone());
        }
        selected
    }

    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            flush_every: self.dispatch.flush_every,
            invalidation: self.invalidation,
            allow_geocoder_change: self.allow_geocoder_change,
        }
    }
}

/// Run one reconciliation and leave the store on disk up to date.
///
/// All fatal checks (missing store or cache, backend configuration, malformed
/// input, geocoder mismatch, rejected inconsistencies) happen before the
/// store file is first written.
pub fn annotate(request: &AnnotateRequest) -> Result<ReconcileStats> {
    let store = AnnotationStore::load(&request.store, request.store_mode)?;
    let geocoder = geocode::build(&request.select_geocoder(&store))?;
    let mut dispatcher = GeocodeDispatcher::new(geocoder.as_ref(), &request.dispatch)?;

    let merged = merge_files(&PointExtractor::new(), &request.raw)?;
    let cache = CacheIndex::load(&request.cache.sources, request.cache.match_coordinates)?;

    let mut checkpoint = FileCheckpoint::new(&request.store);
    let outcome = reconcile(
        merged.points(),
        store,
        &cache,
        &mut dispatcher,
        &request.options(),
        &mut checkpoint,
    )?;

    let mut stats = outcome.stats;
    stats.duplicates_merged += merged.duplicates;
    tracing::info!(
        store = %request.store.display(),
        entries = outcome.store.len(),
        resolved = stats.newly_resolved,
        cached = stats.cache_resolved,
        remaining = stats.remaining_unresolved,
        "annotation run finished"
    );
    Ok(stats)
}

/// How a run would classify the raw points, without calling any backend or
/// writing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DryRun {
    pub total_raw: usize,
    pub duplicates_merged: usize,
    pub already_annotated: usize,
    pub cache_resolvable: usize,
    pub needs_resolution: usize,
}

pub fn dry_run(request: &AnnotateRequest) -> Result<DryRun> {
    let merged = merge_files(&PointExtractor::new(), &request.raw)?;
    let store = AnnotationStore::load(&request.store, request.store_mode)?;
    let cache = CacheIndex::load(&request.cache.sources, request.cache.match_coordinates)?;
    let p = plan(merged.points(), &store, &cache);
    Ok(DryRun {
        total_raw: merged.len(),
        duplicates_merged: merged.duplicates + p.duplicates,
        already_annotated: p.already_annotated,
        cache_resolvable: p.cache_hits.len(),
        needs_resolution: p.tasks.len(),
    })
}
