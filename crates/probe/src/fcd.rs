//! SUMO floating car data (FCD) export.
//!
//! The export nests vehicles inside timesteps. Each vehicle keeps one device
//! id and one generated trip id for the whole run.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::Result;
use crate::error::Error;
use crate::model::{ProbePoint, device_id};

/// FCD export as deserialized from the simulator's XML output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FcdExport {
    #[serde(rename = "timestep", default)]
    pub timesteps: Vec<Timestep>,
}

impl TryFrom<&str> for FcdExport {
    type Error = Error;

    fn try_from(xml: &str) -> anyhow::Result<Self, Self::Error> {
        quick_xml::de::from_str(xml).map_err(Into::into)
    }
}

impl TryFrom<&[u8]> for FcdExport {
    type Error = Error;

    fn try_from(xml: &[u8]) -> anyhow::Result<Self, Self::Error> {
        quick_xml::de::from_reader(xml).map_err(Into::into)
    }
}

/// Vehicle positions at one simulation instant.
#[derive(Debug, Clone, Deserialize)]
pub struct Timestep {
    /// Seconds since the start of the simulation.
    #[serde(rename = "@time")]
    pub time: f64,

    #[serde(rename = "vehicle", default)]
    pub vehicles: Vec<Vehicle>,
}

/// A single vehicle observation.
#[derive(Debug, Clone, Deserialize)]
pub struct Vehicle {
    #[serde(rename = "@id")]
    pub id: String,

    /// Raw longitude.
    #[serde(rename = "@x", default)]
    pub x: Option<f64>,

    /// Raw latitude.
    #[serde(rename = "@y", default)]
    pub y: Option<f64>,

    #[serde(rename = "@speed", default)]
    pub speed: f64,

    #[serde(rename = "@matched_latitude", default)]
    pub matched_latitude: Option<f64>,

    #[serde(rename = "@matched_longitude", default)]
    pub matched_longitude: Option<f64>,

    #[serde(rename = "@matched_heading", default)]
    pub matched_heading: Option<f64>,

    #[serde(rename = "@matched_link_id", default)]
    pub matched_link_id: Option<String>,

    #[serde(rename = "@link_id", default)]
    pub link_id: Option<String>,

    #[serde(rename = "@road_type", default)]
    pub road_type: Option<String>,
}

impl Vehicle {
    /// Numeric ids are normalized (`"007"` becomes `"7"`); anything else is
    /// used as is.
    #[must_use]
    pub fn vehicle_id(&self) -> String {
        let id = self.id.trim();
        id.parse::<u64>().map_or_else(|_| id.to_string(), |n| n.to_string())
    }

    /// Latitude and longitude, preferring pre-matched values.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        let latitude = self.matched_latitude.or(self.y)?;
        let longitude = self.matched_longitude.or(self.x)?;
        Some((latitude, longitude))
    }
}

/// State for one FCD ingestion run.
#[derive(Debug, Clone)]
pub struct FcdRun {
    location: String,
    base: DateTime<Utc>,
    trip_ids: HashMap<String, String>,
}

impl FcdRun {
    /// Start a run for `location`. Simulation time zero maps to `base`.
    #[must_use]
    pub fn new(location: impl Into<String>, base: DateTime<Utc>) -> Self {
        Self { location: location.into(), base, trip_ids: HashMap::new() }
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub const fn base(&self) -> DateTime<Utc> {
        self.base
    }

    /// Trip ids generated so far, keyed by device id.
    #[must_use]
    pub const fn trip_ids(&self) -> &HashMap<String, String> {
        &self.trip_ids
    }

    /// Trip id for `device_id`, generated the first time the device is seen.
    pub fn trip_id(&mut self, device_id: &str) -> String {
        self.trip_ids
            .entry(device_id.to_string())
            .or_insert_with(|| {
                let trip_id = Uuid::new_v4().to_string();
                debug!(device_id, trip_id = %trip_id, "new simulated trip");
                trip_id
            })
            .clone()
    }

    /// Absolute instant of a simulation time offset in seconds.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTimestamp` when the offset is not finite or the
    /// result is out of range.
    #[allow(clippy::cast_possible_truncation)]
    pub fn timestamp(&self, seconds: f64) -> Result<DateTime<Utc>> {
        if !seconds.is_finite() {
            return Err(Error::InvalidTimestamp(format!("timestep time {seconds}")));
        }
        let millis = (seconds * 1000.0).round() as i64;
        TimeDelta::try_milliseconds(millis)
            .and_then(|delta| self.base.checked_add_signed(delta))
            .ok_or_else(|| Error::InvalidTimestamp(format!("timestep time {seconds} out of range")))
    }
}

impl FcdExport {
    /// Decode every vehicle of every timestep, in document order, passing
    /// each point to `emit`.
    ///
    /// Points emitted before an error stay emitted. Returns the number of
    /// points emitted.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingField` for a vehicle without a usable
    /// coordinate pair and `Error::InvalidTimestamp` for a bad timestep time.
    pub fn decode(&self, run: &mut FcdRun, mut emit: impl FnMut(ProbePoint)) -> Result<usize> {
        let mut count = 0;

        for timestep in &self.timesteps {
            let timestamp = run.timestamp(timestep.time)?;

            for vehicle in &timestep.vehicles {
                let Some((latitude, longitude)) = vehicle.position() else {
                    return Err(Error::MissingField(format!(
                        "coordinates for vehicle {} at time {}",
                        vehicle.id, timestep.time
                    )));
                };
                let device_id = device_id(&run.location, vehicle.vehicle_id());
                let trip_id = run.trip_id(&device_id);

                emit(ProbePoint {
                    device_id,
                    trip_id,
                    timestamp,
                    latitude,
                    longitude,
                    speed: vehicle.speed,
                    road_type: vehicle.road_type.clone(),
                    matched_link_id: vehicle.matched_link_id.clone(),
                    link_id: vehicle.link_id.clone(),
                    matched_heading: vehicle.matched_heading,
                });
                count += 1;
            }
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const XML: &str = r#"<fcd-export>
        <timestep time="0.00">
            <vehicle id="007" x="139.70" y="35.60" speed="1.5" angle="90.0"/>
        </timestep>
        <timestep time="1.50">
            <vehicle id="007" x="139.71" y="35.61" speed="2.5"
                matched_latitude="35.6105" matched_longitude="139.7105"
                matched_heading="87.5" matched_link_id="L-1" road_type="3"/>
        </timestep>
    </fcd-export>"#;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn deserialization() {
        let export = FcdExport::try_from(XML).expect("should deserialize");
        assert_eq!(export.timesteps.len(), 2);
        assert_eq!(export.timesteps[1].vehicles[0].matched_heading, Some(87.5));
        assert_eq!(export.timesteps[1].vehicles[0].road_type.as_deref(), Some("3"));
    }

    #[test]
    fn decode_points() {
        let export = FcdExport::try_from(XML).expect("should deserialize");
        let mut run = FcdRun::new("tokyo", base());
        let mut points = vec![];

        let count = export.decode(&mut run, |p| points.push(p)).expect("should decode");
        assert_eq!(count, 2);

        assert_eq!(points[0].device_id, "Sim_Car_tokyo_7");
        assert_eq!(points[0].timestamp, base());
        assert!((points[0].latitude - 35.60).abs() < f64::EPSILON);
        assert!(!points[0].is_map_matched());

        assert_eq!(points[1].timestamp, base() + TimeDelta::milliseconds(1500));
        assert!((points[1].latitude - 35.6105).abs() < f64::EPSILON);
        assert!((points[1].longitude - 139.7105).abs() < f64::EPSILON);
        assert!(points[1].is_map_matched());
        assert_eq!(points[0].trip_id, points[1].trip_id);
    }

    #[test]
    fn missing_coordinates() {
        let xml = r#"<fcd-export><timestep time="0"><vehicle id="1" speed="0"/></timestep></fcd-export>"#;
        let export = FcdExport::try_from(xml).expect("should deserialize");
        let mut run = FcdRun::new("tokyo", base());

        let err = export.decode(&mut run, |_| {}).expect_err("should fail");
        assert_eq!(err.code(), "missing_field");
    }

    #[test]
    fn malformed_xml() {
        let err = FcdExport::try_from("<fcd-export><timestep time=").expect_err("should fail");
        assert_eq!(err.code(), "invalid_format");
    }

    #[test]
    fn non_numeric_vehicle_id() {
        let xml = r#"<fcd-export><timestep time="0"><vehicle id="veh0" x="1" y="2"/></timestep></fcd-export>"#;
        let export = FcdExport::try_from(xml).expect("should deserialize");
        let mut run = FcdRun::new("osaka", base());
        let mut points = vec![];

        export.decode(&mut run, |p| points.push(p)).expect("should decode");
        assert_eq!(points[0].device_id, "Sim_Car_osaka_veh0");
    }
}
