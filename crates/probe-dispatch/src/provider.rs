//! # Provider
//!
//! Provider defines the external services the dispatch pipeline talks to.

use anyhow::Result;
use chrono::NaiveDate;
use probe::{ProbePoint, TripRoutes};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::map_match::ProbeRecord;

/// The `MapMatcher` trait snaps a raw probe point to the road network.
pub trait MapMatcher: Send + Sync {
    /// Map-match `point`, returning the record to submit.
    fn map_match(
        &self, device_type: &str, device_id: &str, point: &ProbePoint,
    ) -> impl Future<Output = Result<ProbeRecord>> + Send;
}

/// The `ProbeSubmitter` trait sends map-matched records to the analytics
/// service.
pub trait ProbeSubmitter: Send + Sync {
    fn send_probe_data(&self, records: &[ProbeRecord]) -> impl Future<Output = Result<()>> + Send;
}

/// The `JobRequester` trait asks the analytics service to run its jobs over
/// a date range.
pub trait JobRequester: Send + Sync {
    fn send_job_request(
        &self, from: NaiveDate, to: NaiveDate,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// The `TripStore` trait persists the trips of one ingestion run in bulk.
pub trait TripStore: Send + Sync {
    fn insert_trip_routes(&self, trips: TripRoutes) -> impl Future<Output = Result<()>> + Send;
}

/// The `TripSearch` trait queries the index of stored trips.
pub trait TripSearch: Send + Sync {
    fn search_trips(
        &self, query: &TripQuery,
    ) -> impl Future<Output = Result<Vec<TripHit>>> + Send;
}

/// Trip index query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripQuery {
    /// Lucene-style query, e.g. `deviceID:Sim_Car_*`.
    pub q: String,

    /// Sort expression understood by the index.
    pub sort: String,

    pub limit: usize,
}

/// A single trip index hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripHit {
    /// Stored fields of the trip.
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// Sort values; the first is the distance for distance sorts.
    #[serde(default)]
    pub order: Vec<f64>,
}
