use crate::error::Result;
use crate::extract::PointExtractor;
use crate::types::{Identity, LocationPoint};
use std::collections::HashMap;
use std::path::PathBuf;

/// The globally ordered, deduplicated union of all raw sources.
#[derive(Debug, Clone, Default)]
pub struct MergedTimeline {
    points: Vec<LocationPoint>,
    /// Points dropped because a point with the same identity was kept.
    pub duplicates: usize,
}

impl MergedTimeline {
    pub fn points(&self) -> &[LocationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<LocationPoint> {
        self.points
    }
}

/// Merge per-source point sequences given in precedence order (oldest
/// first). Each source is re-ranked by its position in `sources`.
///
/// Points sharing an identity are one observation; the one from the latest
/// source is kept (last-source-wins), and within a source the later
/// occurrence wins. The result is sorted by timestamp, ties broken by
/// source order and then by position within the source.
pub fn merge_sources(sources: Vec<Vec<LocationPoint>>) -> MergedTimeline {
    let total: usize = sources.iter().map(Vec::len).sum();
    let mut slots: HashMap<Identity, usize> = HashMap::with_capacity(total);
    let mut kept: Vec<(usize, usize, LocationPoint)> = Vec::with_capacity(total);
    let mut duplicates = 0;

    for (rank, mut points) in sources.into_iter().enumerate() {
        // Never assume the caller's order.
        points.sort_by_key(|p| p.timestamp);
        for (seq, mut point) in points.into_iter().enumerate() {
            point.source_rank = rank;
            match slots.get(&point.identity()) {
                Some(&slot) => {
                    duplicates += 1;
                    kept[slot] = (rank, seq, point);
                }
                None => {
                    slots.insert(point.identity(), kept.len());
                    kept.push((rank, seq, point));
                }
            }
        }
    }

    kept.sort_by(|a, b| {
        a.2.timestamp
            .cmp(&b.2.timestamp)
            .then(a.0.cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });

    MergedTimeline {
        points: kept.into_iter().map(|(_, _, p)| p).collect(),
        duplicates,
    }
}

/// Extract each raw file and merge them in the order given.
pub fn merge_files(extractor: &PointExtractor, paths: &[PathBuf]) -> Result<MergedTimeline> {
    let mut sources = Vec::with_capacity(paths.len());
    for (rank, path) in paths.iter().enumerate() {
        sources.push(extractor.extract_file(path, rank)?);
    }
    let merged = merge_sources(sources);
    tracing::info!(
        sources = paths.len(),
        points = merged.len(),
        duplicates = merged.duplicates,
        "merged raw timelines"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{timestamp_from_millis, Coordinate};

    fn point(ms: i64, lat_e7: i32, lon_e7: i32, accuracy: u32) -> LocationPoint {
        let mut p = LocationPoint::new(
            timestamp_from_millis(ms).unwrap(),
            Coordinate::from_e7(lat_e7, lon_e7),
        );
        p.accuracy = Some(accuracy);
        p
    }

    #[test]
    fn overlapping_identity_kept_once_last_source_wins() {
        let old = vec![point(1000, 10, 20, 5), point(2000, 11, 21, 5)];
        let new = vec![point(2000, 11, 21, 9), point(3000, 12, 22, 9)];
        let merged = merge_sources(vec![old, new]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.duplicates, 1);
        let shared = &merged.points()[1];
        assert_eq!(shared.identity().timestamp_ms, 2000);
        assert_eq!(shared.accuracy, Some(9));
        assert_eq!(shared.source_rank, 1);
    }

    #[test]
    fn output_sorted_even_when_sources_are_not() {
        let a = vec![point(5000, 1, 1, 1), point(1000, 2, 2, 1)];
        let b = vec![point(3000, 3, 3, 1)];
        let merged = merge_sources(vec![a, b]);
        let times: Vec<i64> = merged
            .points()
            .iter()
            .map(|p| p.identity().timestamp_ms)
            .collect();
        assert_eq!(times, vec![1000, 3000, 5000]);
    }

    #[test]
    fn equal_timestamps_break_ties_by_source_order() {
        let a = vec![point(1000, 1, 1, 1)];
        let b = vec![point(1000, 2, 2, 1)];
        let merged = merge_sources(vec![b.clone(), a.clone()]);
        assert_eq!(merged.points()[0].coordinate, Coordinate::from_e7(2, 2));
        let merged = merge_sources(vec![a, b]);
        assert_eq!(merged.points()[0].coordinate, Coordinate::from_e7(1, 1));
    }

    #[test]
    fn duplicate_within_one_source_collapses() {
        let a = vec![point(1000, 1, 1, 1), point(1000, 1, 1, 2)];
        let merged = merge_sources(vec![a]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.points()[0].accuracy, Some(2));
    }

    #[test]
    fn merging_nothing_is_empty() {
        assert!(merge_sources(Vec::new()).is_empty());
    }
}
