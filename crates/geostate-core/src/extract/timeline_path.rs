use super::{Numeric, TimelineFormat};
use crate::types::{parse_timestamp, Coordinate, LocationPoint};
use chrono::Duration;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Device export: a top-level array of time-ranged records, each optionally
/// carrying a `timelinePath` of `geo:` points offset from the record start.
pub struct TimelinePathFormat;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathRecord {
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    timeline_path: Option<Vec<PathPoint>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathPoint {
    point: String,
    #[serde(alias = "durationMinutesOffsetFromStartTime")]
    offset_minutes: Numeric,
}

static GEO_RE: OnceLock<Regex> = OnceLock::new();

fn geo_re() -> &'static Regex {
    GEO_RE.get_or_init(|| {
        Regex::new(r"^geo:\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)$").unwrap()
    })
}

/// Parse a `geo:<lat>,<lon>` URI.
pub(crate) fn parse_geo_uri(s: &str) -> Option<Coordinate> {
    let caps = geo_re().captures(s.trim())?;
    let lat: f64 = caps[1].parse().ok()?;
    let lon: f64 = caps[2].parse().ok()?;
    let coord = Coordinate::from_degrees(lat, lon);
    coord.is_valid().then_some(coord)
}

impl TimelineFormat for TimelinePathFormat {
    fn name(&self) -> &'static str {
        "timeline-path"
    }

    fn matches(&self, doc: &Value) -> bool {
        match doc {
            Value::Array(items) => items
                .first()
                .map(|r| r.get("startTime").is_some())
                .unwrap_or(true),
            _ => false,
        }
    }

    fn extract(&self, doc: &Value) -> Result<Vec<LocationPoint>, String> {
        let records = Vec::<PathRecord>::deserialize(doc).map_err(|e| e.to_string())?;
        let mut points = Vec::new();
        for (i, record) in records.into_iter().enumerate() {
            // Visit and activity records have no path.
            let Some(path) = record.timeline_path else {
                continue;
            };
            let start = record
                .start_time
                .as_deref()
                .ok_or_else(|| format!("record {i}: timelinePath without startTime"))?;
            let start = parse_timestamp(start)
                .ok_or_else(|| format!("record {i}: invalid startTime '{start}'"))?;
            for (j, p) in path.into_iter().enumerate() {
                let coordinate = parse_geo_uri(&p.point)
                    .ok_or_else(|| format!("record {i} point {j}: invalid point '{}'", p.point))?;
                let minutes = p
                    .offset_minutes
                    .as_f64()
                    .map_err(|e| format!("record {i} point {j}: offset {e}"))?;
                if !minutes.is_finite() {
                    return Err(format!("record {i} point {j}: offset '{minutes}' is not numeric"));
                }
                let timestamp = Duration::try_milliseconds((minutes * 60_000.0).round() as i64)
                    .and_then(|offset| start.checked_add_signed(offset))
                    .ok_or_else(|| format!("record {i} point {j}: offset out of range"))?;
                points.push(LocationPoint::new(timestamp, coordinate));
            }
        }
        Ok(points)
    }
}
