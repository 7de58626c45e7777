//! The reconciliation engine.
//!
//! Every merged raw point lands in exactly one tier:
//!
//! 1. already annotated: carried forward untouched,
//! 2. cache hit: annotated from a prior store without a backend call,
//! 3. needs resolution: queued for the [`GeocodeDispatcher`].
//!
//! Together with the store being persisted after each batch, this gives at
//! most one backend call per distinct point across all runs.

use crate::cache::{CacheIndex, CachedState};
use crate::dispatch::{Dispatch, GeocodeDispatcher, StopReason};
use crate::error::{GeoError, Result};
use crate::store::AnnotationStore;
use crate::types::{AnnotatedPoint, Identity, LocationPoint};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Classification<'a> {
    AlreadyAnnotated(&'a AnnotatedPoint),
    CacheHit(&'a CachedState),
    NeedsResolution,
}

pub fn classify<'a>(
    point: &LocationPoint,
    store: &'a AnnotationStore,
    cache: &'a CacheIndex,
) -> Classification<'a> {
    if let Some(existing) = store.lookup(&point.identity()) {
        return Classification::AlreadyAnnotated(existing);
    }
    match cache.lookup(point) {
        Some(cached) => Classification::CacheHit(cached),
        None => Classification::NeedsResolution,
    }
}

/// The classification of a whole raw sequence against a store and cache.
#[derive(Debug, Clone, Default)]
pub struct Plan<'a> {
    /// Repeated identities in the input; only the last occurrence is planned.
    pub duplicates: usize,
    pub already_annotated: usize,
    pub cache_hits: Vec<AnnotatedPoint>,
    pub tasks: Vec<&'a LocationPoint>,
}

pub fn plan<'a>(
    raw: &'a [LocationPoint],
    store: &AnnotationStore,
    cache: &CacheIndex,
) -> Plan<'a> {
    let last: HashMap<Identity, usize> = raw
        .iter()
        .enumerate()
        .map(|(i, p)| (p.identity(), i))
        .collect();
    let mut plan = Plan::default();
    for (i, point) in raw.iter().enumerate() {
        if last.get(&point.identity()) != Some(&i) {
            plan.duplicates += 1;
            continue;
        }
        match classify(point, store, cache) {
            Classification::AlreadyAnnotated(_) => plan.already_annotated += 1,
            Classification::CacheHit(cached) => plan
                .cache_hits
                .push(point.annotate(cached.state.clone(), cached.geocoder)),
            Classification::NeedsResolution => plan.tasks.push(point),
        }
    }
    plan
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Handling of stored annotations that newer raw data no longer supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Invalidation {
    /// Keep everything already annotated.
    #[default]
    Off,
    /// Drop entries whose timestamp is absent from raw data (`missing`) or
    /// whose raw point now differs in coordinate or accuracy (`changed`).
    Remove { missing: bool, changed: bool },
    /// Abort before mutating anything if any entry is missing or changed.
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOptions {
    /// Resolutions between checkpoint commits; 0 commits only at the end.
    pub flush_every: usize,
    pub invalidation: Invalidation,
    /// Permit resolving into a store whose recorded geocoder differs.
    pub allow_geocoder_change: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            flush_every: 25,
            invalidation: Invalidation::Off,
            allow_geocoder_change: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Durable sink for intermediate and final store states.
pub trait Checkpoint {
    fn commit(&mut self, store: &AnnotationStore) -> Result<()>;
}

/// Discards commits; the caller persists the returned store itself.
pub struct NoCheckpoint;

impl Checkpoint for NoCheckpoint {
    fn commit(&mut self, _store: &AnnotationStore) -> Result<()> {
        Ok(())
    }
}

/// Atomically rewrites the store file on every commit.
pub struct FileCheckpoint {
    path: PathBuf,
    commits: usize,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            commits: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl Checkpoint for FileCheckpoint {
    fn commit(&mut self, store: &AnnotationStore) -> Result<()> {
        store.save(&self.path)?;
        self.commits += 1;
        tracing::debug!(path = %self.path.display(), entries = store.len(), "store committed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub total_raw: usize,
    /// Identities present in more than one raw source.
    pub duplicates_merged: usize,
    pub already_annotated: usize,
    pub cache_resolved: usize,
    pub newly_resolved: usize,
    /// Backend calls that returned an error.
    pub failed: usize,
    /// Queued points still absent from the store: failures plus those never
    /// attempted because the run stopped early.
    pub remaining_unresolved: usize,
    pub backend_calls: usize,
    pub removed_missing: usize,
    pub removed_changed: usize,
    pub limit_reached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<String>,
}

impl ReconcileStats {
    pub fn is_complete(&self) -> bool {
        self.remaining_unresolved == 0
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub store: AnnotationStore,
    pub stats: ReconcileStats,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stored identities that raw data no longer matches, split into those whose
/// timestamp vanished (`missing`) and those whose timestamp now carries a
/// different coordinate or accuracy (`changed`). Both are sorted.
pub fn find_inconsistent(
    store: &AnnotationStore,
    raw: &[LocationPoint],
) -> (Vec<Identity>, Vec<Identity>) {
    let raw_accuracy: HashMap<Identity, Option<u32>> =
        raw.iter().map(|p| (p.identity(), p.accuracy)).collect();
    let raw_times: HashSet<i64> = raw_accuracy.keys().map(|id| id.timestamp_ms).collect();
    let mut missing = Vec::new();
    let mut changed = Vec::new();
    for entry in store.points() {
        let id = entry.identity();
        match raw_accuracy.get(&id) {
            Some(accuracy) if *accuracy == entry.accuracy => {}
            Some(_) => changed.push(id),
            None if raw_times.contains(&id.timestamp_ms) => changed.push(id),
            None => missing.push(id),
        }
    }
    missing.sort();
    changed.sort();
    (missing, changed)
}

/// Fold `raw` (any order) into `store`.
///
/// Repeated identities in `raw` are planned once, using the last occurrence,
/// so each distinct point costs at most one backend call.
///
/// Fatal conditions (geocoder mismatch, rejected inconsistencies) are
/// detected before the store is mutated or committed. Backend failures are
/// counted, never raised.
pub fn reconcile(
    raw: &[LocationPoint],
    mut store: AnnotationStore,
    cache: &CacheIndex,
    dispatcher: &mut GeocodeDispatcher<'_>,
    options: &ReconcileOptions,
    checkpoint: &mut dyn Checkpoint,
) -> Result<Reconciliation> {
    let requested = dispatcher.geocoder_id();
    match store.geocoder() {
        None => store.set_geocoder(requested),
        Some(existing) if existing != requested => {
            if !options.allow_geocoder_change {
                return Err(GeoError::GeocoderMismatch {
                    store: existing.to_string(),
                    requested: requested.to_string(),
                });
            }
            tracing::info!(store = %existing, requested = %requested, "mixing geocoders in one store");
        }
        Some(_) => {}
    }

    let mut stats = ReconcileStats {
        total_raw: raw.len(),
        ..ReconcileStats::default()
    };

    match options.invalidation {
        Invalidation::Off => {}
        Invalidation::Reject => {
            let (missing, changed) = find_inconsistent(&store, raw);
            if !missing.is_empty() || !changed.is_empty() {
                return Err(GeoError::Inconsistent {
                    missing: missing.iter().map(Identity::to_string).collect(),
                    changed: changed.iter().map(Identity::to_string).collect(),
                });
            }
        }
        Invalidation::Remove {
            missing: drop_missing,
            changed: drop_changed,
        } => {
            let (missing, changed) = find_inconsistent(&store, raw);
            if drop_missing && !missing.is_empty() {
                tracing::warn!(count = missing.len(), "removing annotations missing from raw data");
                stats.removed_missing = store.remove(&missing.into_iter().collect::<HashSet<_>>());
            }
            if drop_changed && !changed.is_empty() {
                tracing::warn!(count = changed.len(), "removing annotations changed in raw data");
                stats.removed_changed = store.remove(&changed.into_iter().collect::<HashSet<_>>());
            }
        }
    }

    let Plan {
        duplicates,
        already_annotated,
        cache_hits,
        tasks,
    } = plan(raw, &store, cache);
    stats.duplicates_merged = duplicates;
    stats.already_annotated = already_annotated;
    stats.cache_resolved = cache_hits.len();
    store.upsert(cache_hits);

    tracing::info!(
        raw = stats.total_raw,
        annotated = stats.already_annotated,
        cached = stats.cache_resolved,
        queued = tasks.len(),
        "classified raw points"
    );
    if stats.cache_resolved > 0 || stats.removed_missing > 0 || stats.removed_changed > 0 {
        checkpoint.commit(&store)?;
    }

    let calls_before = dispatcher.calls_made();
    let mut since_commit = 0;
    for task in &tasks {
        match dispatcher.resolve(task) {
            Dispatch::Resolved(state) => {
                store.upsert([task.annotate(state, requested)]);
                stats.newly_resolved += 1;
                since_commit += 1;
                if options.flush_every > 0 && since_commit >= options.flush_every {
                    checkpoint.commit(&store)?;
                    since_commit = 0;
                    tracing::info!(
                        resolved = stats.newly_resolved,
                        queued = tasks.len(),
                        "annotation progress"
                    );
                }
            }
            Dispatch::Failed(_) => stats.failed += 1,
            Dispatch::Stopped(StopReason::LimitReached) => {
                stats.limit_reached = true;
                break;
            }
            Dispatch::Stopped(StopReason::Halted(_)) => break,
        }
    }
    if let Some(StopReason::Halted(reason)) = dispatcher.stop_reason() {
        tracing::warn!(reason = %reason, "geocoding halted");
        stats.halted = Some(reason);
    }

    stats.backend_calls = dispatcher.calls_made() - calls_before;
    stats.remaining_unresolved = tasks.len() - stats.newly_resolved;
    checkpoint.commit(&store)?;

    if stats.remaining_unresolved > 0 {
        tracing::info!(
            remaining = stats.remaining_unresolved,
            "entries left unannotated; run again to continue"
        );
    }
    Ok(Reconciliation { store, stats })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
