use crate::archive::local_date;
use crate::store::AnnotationStore;
use crate::types::format_timestamp;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Point and day counts for one state code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSummary {
    pub state: String,
    pub points: usize,
    /// Distinct local calendar days with at least one point in the state.
    /// Days follow [`local_date`], so in summer a point before 01:00 EDT
    /// counts toward the previous day.
    pub days: usize,
    pub first_seen: String,
    pub last_seen: String,
}

/// Most-visited first; ties by state code.
pub fn summarize(store: &AnnotationStore) -> Vec<StateSummary> {
    let mut by_state: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for point in store.points() {
        by_state.entry(point.state.as_str()).or_default().push(point.timestamp);
    }

    let mut rows: Vec<StateSummary> = by_state
        .into_iter()
        .filter_map(|(state, times)| {
            // Store views are time-ordered.
            let first = *times.first()?;
            let last = *times.last()?;
            let days: BTreeSet<_> = times.iter().map(|t| local_date(*t)).collect();
            Some(StateSummary {
                state: state.to_string(),
                points: times.len(),
                days: days.len(),
                first_seen: format_timestamp(first),
                last_seen: format_timestamp(last),
            })
        })
        .collect();
    rows.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.state.cmp(&b.state)));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_timestamp, Coordinate, GeocoderId, LocationPoint};

    fn annotated(ts: &str, state: &str) -> crate::types::AnnotatedPoint {
        LocationPoint::new(parse_timestamp(ts).unwrap(), Coordinate::from_degrees(40.0, -74.0))
            .annotate(state, GeocoderId::Local)
    }

    #[test]
    fn counts_points_and_days() {
        let mut store = AnnotationStore::new();
        store.upsert([
            annotated("2024-03-01T12:00:00Z", "NJ"),
            annotated("2024-03-01T15:00:00Z", "NY"),
            annotated("2024-03-01T18:00:00Z", "NY"),
            annotated("2024-03-02T03:00:00Z", "NY"),
            annotated("2024-03-02T12:00:00Z", "NY"),
        ]);
        let rows = summarize(&store);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].state, "NY");
        assert_eq!(rows[0].points, 4);
        // 03:00Z on the 2nd is still the 1st locally.
        assert_eq!(rows[0].days, 2);
        assert_eq!(rows[0].first_seen, "2024-03-01T15:00:00Z");
        assert_eq!(rows[0].last_seen, "2024-03-02T12:00:00Z");
        assert_eq!(rows[1].state, "NJ");
        assert_eq!(rows[1].days, 1);
    }

    #[test]
    fn empty_store() {
        assert!(summarize(&AnnotationStore::new()).is_empty());
    }
}
