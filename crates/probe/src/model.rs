//! Canonical probe types shared by the parsers and the dispatch pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix shared by every simulated device id.
pub const SIM_CAR_DEVICE_ID_PREFIX: &str = "Sim_Car_";

/// Trips keyed by trip id, as handed to the trip store.
pub type TripRoutes = HashMap<String, Trip>;

/// One observed vehicle position at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbePoint {
    /// Simulated vehicle, stable within a run.
    pub device_id: String,

    /// Continuous trip the point belongs to.
    pub trip_id: String,

    /// Absolute instant of the observation.
    pub timestamp: DateTime<Utc>,

    /// Latitude, pre-matched when the source had a matched value.
    pub latitude: f64,

    /// Longitude, pre-matched when the source had a matched value.
    pub longitude: f64,

    /// Unit-less speed, passed through from the source.
    pub speed: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_link_id: Option<String>,

    /// Plain (unmatched) link id, used when no matched link id is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,

    /// Heading from an upstream map-matcher. Its presence marks the point as
    /// already map-matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_heading: Option<f64>,
}

impl ProbePoint {
    /// Whether the point was map-matched upstream and must bypass the
    /// map-matching service.
    #[must_use]
    pub const fn is_map_matched(&self) -> bool {
        self.matched_heading.is_some()
    }
}

/// An ordered sequence of probe points belonging to one vehicle journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    #[serde(rename = "_id")]
    pub id: String,

    /// Points in insertion (temporal) order.
    pub routes: Vec<ProbePoint>,
}

impl Trip {
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self { id, routes: Vec::new() }
    }
}

/// Derive the location tag for a simulation file: the file name with its
/// directory and extension removed.
///
/// Each step falls back to its input when the cut would leave nothing, so
/// `".hidden"` stays `".hidden"`.
#[must_use]
pub fn location_tag(path: &str) -> String {
    let name = path.rsplit_once('/').map_or(path, |(_, name)| name);
    let name = if name.is_empty() { path } else { name };

    let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
    let stem = if stem.is_empty() { name } else { stem };
    stem.to_string()
}

/// Build the device id of a simulated vehicle.
#[must_use]
pub fn device_id(location: &str, suffix: impl std::fmt::Display) -> String {
    format!("{SIM_CAR_DEVICE_ID_PREFIX}{location}_{suffix}")
}
