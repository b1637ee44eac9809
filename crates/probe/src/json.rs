//! JSON-array simulation export.
//!
//! A flat array of records, already grouped into trips by the producer. All
//! records of one file share a device id.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Number;

use crate::Result;
use crate::error::Error;
use crate::model::{ProbePoint, device_id};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// JSON simulation file: a top-level array of records.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct JsonSimulation {
    pub records: Vec<JsonRecord>,
}

impl TryFrom<&str> for JsonSimulation {
    type Error = Error;

    fn try_from(json: &str) -> anyhow::Result<Self, Self::Error> {
        serde_json::from_str(json).map_err(Into::into)
    }
}

impl TryFrom<&[u8]> for JsonSimulation {
    type Error = Error;

    fn try_from(json: &[u8]) -> anyhow::Result<Self, Self::Error> {
        serde_json::from_slice(json).map_err(Into::into)
    }
}

/// A JSON scalar that producers write either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(Number),
    Text(String),
}

impl Scalar {
    fn as_f64(&self, field: &str) -> Result<f64> {
        let value = match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.ok_or_else(|| Error::InvalidFormat(format!("{field} is not numeric: {self}")))
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One record of a JSON simulation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JsonRecord {
    /// RFC 3339 or naive ISO 8601 (read as UTC) text, or epoch milliseconds.
    pub timestamp: Option<Scalar>,
    pub latitude: Option<Scalar>,
    pub longitude: Option<Scalar>,
    pub matched_latitude: Option<Scalar>,
    pub matched_longitude: Option<Scalar>,
    pub speed: Option<Scalar>,
    pub trip_id: Option<Scalar>,
    pub road_type: Option<Scalar>,
    pub matched_link_id: Option<Scalar>,
    pub link_id: Option<Scalar>,
    pub matched_heading: Option<Scalar>,
}

impl JsonRecord {
    /// Recorded instant of the record.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingField` when there is no timestamp and
    /// `Error::InvalidTimestamp` when it cannot be read.
    pub fn recorded_at(&self) -> Result<DateTime<Utc>> {
        let Some(timestamp) = &self.timestamp else {
            return Err(Error::MissingField("timestamp".to_string()));
        };

        match timestamp {
            Scalar::Number(n) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .ok_or_else(|| Error::InvalidTimestamp(format!("epoch millis {n}"))),
            Scalar::Text(text) => parse_time(text),
        }
    }

    fn position(&self) -> Result<Option<(f64, f64)>> {
        let latitude = self.matched_latitude.as_ref().or(self.latitude.as_ref());
        let longitude = self.matched_longitude.as_ref().or(self.longitude.as_ref());
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Ok(None);
        };
        Ok(Some((latitude.as_f64("latitude")?, longitude.as_f64("longitude")?)))
    }
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::InvalidTimestamp(format!("unrecognized timestamp {text}")))
}

/// State for one JSON ingestion run.
#[derive(Debug, Clone)]
pub struct JsonRun {
    location: String,
    device_seq: u64,
    now: DateTime<Utc>,
    jitter: TimeDelta,
}

impl JsonRun {
    /// Start a run for `location`.
    ///
    /// Recorded times are shifted so the first record lands at `now` minus
    /// `jitter`.
    #[must_use]
    pub fn new(
        location: impl Into<String>, device_seq: u64, now: DateTime<Utc>, jitter: TimeDelta,
    ) -> Self {
        Self { location: location.into(), device_seq, now, jitter }
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Device id shared by every point of the run.
    #[must_use]
    pub fn device_id(&self) -> String {
        device_id(&self.location, self.device_seq)
    }

    fn offset(&self, first: DateTime<Utc>) -> Result<TimeDelta> {
        self.now
            .signed_duration_since(first)
            .checked_sub(&self.jitter)
            .ok_or_else(|| Error::InvalidTimestamp(format!("jitter {} out of range", self.jitter)))
    }
}

impl JsonSimulation {
    /// Decode every record in file order, passing each point to `emit`.
    ///
    /// Points emitted before an error stay emitted. Returns the number of
    /// points emitted.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingField` when a record has no trip id, timestamp
    /// or coordinate pair, and `Error::InvalidFormat` or
    /// `Error::InvalidTimestamp` when a value cannot be read.
    pub fn decode(&self, run: &JsonRun, mut emit: impl FnMut(ProbePoint)) -> Result<usize> {
        let Some(first) = self.records.first() else {
            return Ok(0);
        };
        let offset = run.offset(first.recorded_at()?)?;
        let device_id = run.device_id();
        let mut count = 0;

        for (index, record) in self.records.iter().enumerate() {
            let timestamp = record
                .recorded_at()?
                .checked_add_signed(offset)
                .ok_or_else(|| Error::InvalidTimestamp(format!("record {index} out of range")))?;
            let Some(trip_id) = &record.trip_id else {
                return Err(Error::MissingField(format!("trip_id of record {index}")));
            };
            let Some((latitude, longitude)) = record.position()? else {
                return Err(Error::MissingField(format!("coordinates of record {index}")));
            };
            let speed = record.speed.as_ref().map(|s| s.as_f64("speed")).transpose()?;
            let matched_heading =
                record.matched_heading.as_ref().map(|h| h.as_f64("matched_heading")).transpose()?;

            emit(ProbePoint {
                device_id: device_id.clone(),
                trip_id: trip_id.to_string(),
                timestamp,
                latitude,
                longitude,
                speed: speed.unwrap_or_default(),
                road_type: record.road_type.as_ref().map(ToString::to_string),
                matched_link_id: record.matched_link_id.as_ref().map(ToString::to_string),
                link_id: record.link_id.as_ref().map(ToString::to_string),
                matched_heading,
            });
            count += 1;
        }

        Ok(count)
    }
}
