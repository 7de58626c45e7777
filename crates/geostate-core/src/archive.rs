//! Per-year snapshots of the raw timeline and the annotated store.
//!
//! Years are cut on the US/Eastern calendar, approximated by a fixed UTC−5
//! offset. Standard time is exact, which covers the new-year boundary. During
//! daylight saving time a point between 00:00 and 01:00 EDT is dated to the
//! previous day. Only per-day counts in `summary` see that shift; year cuts
//! never do because the boundary always falls in standard time.

use crate::error::{GeoError, Result};
use crate::paths::{archive_paths, ArchivePaths};
use crate::store::AnnotationStore;
use crate::types::{format_timestamp, LocationPoint};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::path::Path;

const EASTERN_OFFSET_HOURS: i64 = 5;

/// Calendar date of `ts` on the archive's local clock (UTC−5 all year).
pub fn local_date(ts: DateTime<Utc>) -> NaiveDate {
    (ts - Duration::hours(EASTERN_OFFSET_HOURS)).date_naive()
}

pub fn annotated_for_year(store: &AnnotationStore, year: i32) -> AnnotationStore {
    store.filtered(|p| local_date(p.timestamp).year() == year)
}

pub fn raw_for_year(points: &[LocationPoint], year: i32) -> Vec<&LocationPoint> {
    points
        .iter()
        .filter(|p| local_date(p.timestamp).year() == year)
        .collect()
}

/// Raw slice in the flat `locations` layout, readable again as an export.
#[derive(Serialize)]
struct RawArchive {
    locations: Vec<RawEntry>,
}

#[derive(Serialize)]
struct RawEntry {
    timestamp: String,
    #[serde(rename = "latitudeE7")]
    latitude_e7: i32,
    #[serde(rename = "longitudeE7")]
    longitude_e7: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy: Option<u32>,
}

fn raw_to_json(points: &[&LocationPoint]) -> Result<String> {
    let doc = RawArchive {
        locations: points
            .iter()
            .map(|p| RawEntry {
                timestamp: format_timestamp(p.timestamp),
                latitude_e7: p.coordinate.lat_e7,
                longitude_e7: p.coordinate.lon_e7,
                accuracy: p.accuracy,
            })
            .collect(),
    };
    let mut out = serde_json::to_string_pretty(&doc)?;
    out.push('\n');
    Ok(out)
}

/// What `write_archive` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveWritten {
    pub paths: ArchivePaths,
    pub raw_entries: usize,
    pub annotated_entries: usize,
}

/// Write the `year` slices of `raw` and `store` into `dir`.
///
/// Fails with `ArchiveExists` before writing anything if either file is
/// already present.
pub fn write_archive(
    raw: &[LocationPoint],
    store: &AnnotationStore,
    dir: &Path,
    name: &str,
    year: i32,
) -> Result<ArchiveWritten> {
    let paths = archive_paths(dir, name, year)?;
    for path in [&paths.raw, &paths.annotated] {
        if path.exists() {
            return Err(GeoError::ArchiveExists(path.clone()));
        }
    }

    let raw_slice = raw_for_year(raw, year);
    let annotated = annotated_for_year(store, year);
    crate::io::write_new(&paths.raw, raw_to_json(&raw_slice)?.as_bytes())?;
    crate::io::write_new(&paths.annotated, annotated.to_json()?.as_bytes())?;
    tracing::info!(
        dir = %dir.display(),
        raw = raw_slice.len(),
        annotated = annotated.len(),
        year,
        "archive written"
    );
    Ok(ArchiveWritten {
        raw_entries: raw_slice.len(),
        annotated_entries: annotated.len(),
        paths,
    })
}
