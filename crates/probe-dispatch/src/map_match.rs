//! Map-match adapter.
//!
//! Builds the record submitted for a probe point. Points already matched
//! upstream are converted directly; all others go through the map-matching
//! service.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use probe::ProbePoint;
use serde::{Deserialize, Serialize};

use crate::provider::MapMatcher;

/// Device type reported to the map-matching service for simulated cars.
pub const DEVICE_TYPE: &str = "Car_Sim";

/// Map-matched probe record accepted by the probe submission service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// RFC 3339 instant with second precision.
    pub timestamp: String,
    pub matched_longitude: f64,
    pub matched_latitude: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_heading: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_link_id: Option<String>,

    pub speed: f64,

    /// Device id of the moving object.
    pub mo_id: String,
    pub trip_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road_type: Option<String>,
}

impl From<&ProbePoint> for ProbeRecord {
    /// Pass-through record for a point matched upstream.
    fn from(point: &ProbePoint) -> Self {
        Self {
            timestamp: point.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            matched_longitude: point.longitude,
            matched_latitude: point.latitude,
            matched_heading: point.matched_heading,
            matched_link_id: point.matched_link_id.clone().or_else(|| point.link_id.clone()),
            speed: point.speed,
            mo_id: point.device_id.clone(),
            trip_id: point.trip_id.clone(),
            road_type: None,
        }
    }
}

/// Chooses between the map-matching service and a pass-through record.
#[derive(Debug, Clone)]
pub struct MapMatchAdapter<P> {
    matcher: P,
}

impl<P: MapMatcher> MapMatchAdapter<P> {
    pub const fn new(matcher: P) -> Self {
        Self { matcher }
    }

    /// Produce the record to submit for `point`.
    ///
    /// The road type of the point is copied onto a record that has none.
    ///
    /// # Errors
    ///
    /// Returns the map-matching service's error for points that are not
    /// already matched. The pass-through path does not fail.
    pub async fn probe_record(&self, device_id: &str, point: &ProbePoint) -> Result<ProbeRecord> {
        let mut record = if point.is_map_matched() {
            ProbeRecord::from(point)
        } else {
            self.matcher
                .map_match(DEVICE_TYPE, device_id, point)
                .await
                .with_context(|| format!("map matching probe for {device_id}"))?
        };

        if record.road_type.is_none() {
            record.road_type.clone_from(&point.road_type);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct Matcher {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl MapMatcher for Matcher {
        async fn map_match(
            &self, device_type: &str, device_id: &str, point: &ProbePoint,
        ) -> Result<ProbeRecord> {
            self.calls.lock().unwrap().push((device_type.to_string(), device_id.to_string()));
            if self.fail {
                return Err(anyhow!("no link within range"));
            }
            Ok(ProbeRecord {
                matched_latitude: point.latitude + 0.001,
                matched_heading: Some(12.0),
                matched_link_id: Some("service-link".to_string()),
                ..ProbeRecord::from(point)
            })
        }
    }

    fn point(matched_heading: Option<f64>) -> ProbePoint {
        ProbePoint {
            device_id: "Sim_Car_tokyo_1".to_string(),
            trip_id: "trip-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 5).unwrap(),
            latitude: 35.0,
            longitude: 139.0,
            speed: 8.5,
            road_type: Some("4".to_string()),
            matched_link_id: None,
            link_id: Some("raw-link".to_string()),
            matched_heading,
        }
    }

    #[tokio::test]
    async fn matched_point_passes_through() {
        let adapter = MapMatchAdapter::new(Matcher::default());
        let record = adapter.probe_record("Sim_Car_tokyo_1", &point(Some(45.0))).await.unwrap();

        assert!(adapter.matcher.calls.lock().unwrap().is_empty());
        assert_eq!(
            record,
            ProbeRecord {
                timestamp: "2026-03-01T08:00:05+00:00".to_string(),
                matched_longitude: 139.0,
                matched_latitude: 35.0,
                matched_heading: Some(45.0),
                matched_link_id: Some("raw-link".to_string()),
                speed: 8.5,
                mo_id: "Sim_Car_tokyo_1".to_string(),
                trip_id: "trip-1".to_string(),
                road_type: Some("4".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn raw_point_is_matched() {
        let adapter = MapMatchAdapter::new(Matcher::default());
        let record = adapter.probe_record("Sim_Car_tokyo_1", &point(None)).await.unwrap();

        let calls = adapter.matcher.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("Car_Sim".to_string(), "Sim_Car_tokyo_1".to_string())]);
        assert_eq!(record.matched_link_id.as_deref(), Some("service-link"));
        assert_eq!(record.road_type.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn matching_failure_propagates() {
        let adapter = MapMatchAdapter::new(Matcher { fail: true, ..Matcher::default() });
        let err = adapter.probe_record("Sim_Car_tokyo_1", &point(None)).await.unwrap_err();
        assert!(err.to_string().contains("map matching probe for Sim_Car_tokyo_1"));
    }
}
