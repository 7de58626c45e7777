use super::{Numeric, TimelineFormat};
use crate::types::{parse_timestamp, timestamp_from_millis, Coordinate, LocationPoint};
use serde::Deserialize;
use serde_json::Value;

/// Legacy flat export: `{"locations": [{timestampMs|timestamp, latitudeE7,
/// longitudeE7, accuracy}]}`.
pub struct RecordsFormat;

#[derive(Debug, Deserialize)]
struct RecordsDocument {
    locations: Vec<Record>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Record {
    #[serde(default)]
    timestamp_ms: Option<Numeric>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "latitudeE7")]
    latitude_e7: i32,
    #[serde(rename = "longitudeE7")]
    longitude_e7: i32,
    #[serde(default)]
    accuracy: Option<u32>,
}

impl TimelineFormat for RecordsFormat {
    fn name(&self) -> &'static str {
        "records"
    }

    fn matches(&self, doc: &Value) -> bool {
        doc.get("locations").map(Value::is_array).unwrap_or(false)
    }

    fn extract(&self, doc: &Value) -> Result<Vec<LocationPoint>, String> {
        let parsed = RecordsDocument::deserialize(doc).map_err(|e| e.to_string())?;
        let mut points = Vec::with_capacity(parsed.locations.len());
        for (i, rec) in parsed.locations.into_iter().enumerate() {
            let timestamp = match (&rec.timestamp_ms, &rec.timestamp) {
                (Some(ms), _) => {
                    let ms = ms.as_i64().map_err(|e| format!("location {i}: timestampMs {e}"))?;
                    timestamp_from_millis(ms)
                        .ok_or_else(|| format!("location {i}: timestampMs {ms} out of range"))?
                }
                (None, Some(ts)) => parse_timestamp(ts)
                    .ok_or_else(|| format!("location {i}: invalid timestamp '{ts}'"))?,
                (None, None) => return Err(format!("location {i}: missing timestamp")),
            };
            let coordinate = Coordinate::from_e7(rec.latitude_e7, rec.longitude_e7);
            if !coordinate.is_valid() {
                return Err(format!("location {i}: coordinate out of range"));
            }
            let mut point = LocationPoint::new(timestamp, coordinate);
            point.accuracy = rec.accuracy;
            points.push(point);
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::format_timestamp;
    use serde_json::json;

    #[test]
    fn reads_timestamp_ms_records() {
        let doc = json!({"locations": [{
            "timestampMs": "1487472687835",
            "latitudeE7": 407763853,
            "longitudeE7": -739834621,
            "accuracy": 50
        }]});
        let points = RecordsFormat.extract(&doc).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(format_timestamp(points[0].timestamp), "2017-02-19T02:51:27.835Z");
        assert_eq!(points[0].accuracy, Some(50));
        assert_eq!(points[0].coordinate.lat_e7, 407_763_853);
    }

    #[test]
    fn reads_iso_timestamp_records() {
        let doc = json!({"locations": [{
            "timestamp": "2022-05-01T12:00:00.123Z",
            "latitudeE7": 1,
            "longitudeE7": 2
        }]});
        let points = RecordsFormat.extract(&doc).unwrap();
        assert_eq!(points[0].identity().timestamp_ms % 1000, 123);
        assert_eq!(points[0].accuracy, None);
    }

    #[test]
    fn missing_timestamp_fails() {
        let doc = json!({"locations": [{"latitudeE7": 1, "longitudeE7": 2}]});
        let err = RecordsFormat.extract(&doc).unwrap_err();
        assert!(err.contains("missing timestamp"));
    }

    #[test]
    fn missing_coordinate_fails() {
        let doc = json!({"locations": [{"timestampMs": "1", "latitudeE7": 1}]});
        assert!(RecordsFormat.extract(&doc).is_err());
    }
}
