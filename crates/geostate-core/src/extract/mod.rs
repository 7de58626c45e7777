//! Raw timeline extraction.
//!
//! A raw export is parsed by the first [`TimelineFormat`] whose `matches`
//! accepts the document shape. Every format yields [`LocationPoint`]s with
//! absolute timestamps; the extractor sorts them before returning.

mod records;
mod timeline_path;

pub use records::RecordsFormat;
pub use timeline_path::TimelinePathFormat;

use crate::error::{GeoError, Result};
use crate::types::LocationPoint;
use serde_json::Value;
use std::path::Path;

/// One raw export layout.
pub trait TimelineFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap shape check; must not fail.
    fn matches(&self, doc: &Value) -> bool;

    /// Extract points in document order. Errors are reasons, the extractor
    /// attaches the source name.
    fn extract(&self, doc: &Value) -> std::result::Result<Vec<LocationPoint>, String>;
}

pub struct PointExtractor {
    formats: Vec<Box<dyn TimelineFormat>>,
}

impl Default for PointExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PointExtractor {
    /// Extractor with every built-in format registered.
    pub fn new() -> Self {
        Self {
            formats: vec![Box::new(TimelinePathFormat), Box::new(RecordsFormat)],
        }
    }

    pub fn empty() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: Box<dyn TimelineFormat>) -> Self {
        self.formats.push(format);
        self
    }

    pub fn detect(&self, doc: &Value) -> Option<&dyn TimelineFormat> {
        self.formats
            .iter()
            .find(|f| f.matches(doc))
            .map(|f| f.as_ref())
    }

    /// Extract a time-ordered point sequence from a parsed document, tagging
    /// each point with `source_rank`.
    pub fn extract(
        &self,
        source_name: &str,
        doc: &Value,
        source_rank: usize,
    ) -> Result<Vec<LocationPoint>> {
        let format = self.detect(doc).ok_or_else(|| {
            GeoError::malformed(source_name, "unrecognized raw timeline document shape")
        })?;
        let mut points = format
            .extract(doc)
            .map_err(|reason| GeoError::malformed(source_name, reason))?;
        for p in &mut points {
            p.source_rank = source_rank;
        }
        // Stable: equal timestamps keep document order.
        points.sort_by_key(|p| p.timestamp);
        tracing::debug!(
            source = source_name,
            format = format.name(),
            points = points.len(),
            "extracted raw timeline"
        );
        Ok(points)
    }

    pub fn extract_file(&self, path: &Path, source_rank: usize) -> Result<Vec<LocationPoint>> {
        let doc = crate::io::read_json(path)?;
        self.extract(&path.display().to_string(), &doc, source_rank)
    }
}

/// Accepts a JSON number or a numeric string, as the exports use both.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub(crate) enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    pub(crate) fn as_f64(&self) -> std::result::Result<f64, String> {
        match self {
            Numeric::Number(n) => Ok(*n),
            Numeric::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("'{s}' is not numeric")),
        }
    }

    pub(crate) fn as_i64(&self) -> std::result::Result<i64, String> {
        match self {
            Numeric::Number(n) if n.fract() == 0.0 => Ok(*n as i64),
            Numeric::Number(n) => Err(format!("{n} is not an integer")),
            Numeric::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("'{s}' is not an integer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_timeline_path_array() {
        let doc = json!([{"startTime": "2023-01-01T00:00:00Z", "endTime": "2023-01-01T01:00:00Z", "timelinePath": []}]);
        let ex = PointExtractor::new();
        assert_eq!(ex.detect(&doc).unwrap().name(), "timeline-path");
    }

    #[test]
    fn detects_records_object() {
        let doc = json!({"locations": []});
        let ex = PointExtractor::new();
        assert_eq!(ex.detect(&doc).unwrap().name(), "records");
    }

    #[test]
    fn unknown_shape_is_malformed() {
        let doc = json!({"something": "else"});
        let err = PointExtractor::new().extract("x.json", &doc, 0).unwrap_err();
        assert!(matches!(err, GeoError::MalformedInput { ref source_name, .. } if source_name == "x.json"));
    }

    #[test]
    fn empty_extractor_matches_nothing() {
        let doc = json!({"locations": []});
        assert!(PointExtractor::empty().detect(&doc).is_none());
    }

    #[test]
    fn output_is_sorted_and_ranked() {
        let doc = json!([
            {
                "startTime": "2023-01-01T10:00:00Z",
                "endTime": "2023-01-01T11:00:00Z",
                "timelinePath": [{"point": "geo:40.0,-74.0", "offsetMinutes": "5"}]
            },
            {
                "startTime": "2023-01-01T08:00:00Z",
                "endTime": "2023-01-01T09:00:00Z",
                "timelinePath": [{"point": "geo:41.0,-75.0", "offsetMinutes": "0"}]
            }
        ]);
        let points = PointExtractor::new().extract("raw", &doc, 3).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points[0].timestamp < points[1].timestamp);
        assert!(points.iter().all(|p| p.source_rank == 3));
    }

    #[test]
    fn numeric_accepts_number_or_string() {
        let n: Numeric = serde_json::from_value(json!(12)).unwrap();
        assert_eq!(n.as_f64().unwrap(), 12.0);
        let s: Numeric = serde_json::from_value(json!("12")).unwrap();
        assert_eq!(s.as_i64().unwrap(), 12);
        let bad: Numeric = serde_json::from_value(json!("twelve")).unwrap();
        assert!(bad.as_f64().is_err());
    }
}
