//! Ingestion runs.
//!
//! One load decodes one simulation file. Each decoded point is appended to
//! its trip and handed to the dispatch queue; when the file has been read
//! the trips are stored in a single bulk insert.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use chrono::{TimeDelta, Utc};
use probe::{
    FcdExport, FcdRun, JsonRun, JsonSimulation, ProbePoint, SIM_CAR_DEVICE_ID_PREFIX,
    location_tag,
};
use probe_dispatch::{
    DispatchQueue, DispatchTask, JobTrigger, ProbeDispatcher, QueueStats, TripAggregator,
    TripQuery,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::provider::Provider;

/// Number of trips returned by a trip search when no limit is given.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Outcome of one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Location tag the device ids were derived from.
    pub location: String,

    /// Points decoded and submitted for dispatch.
    pub points: usize,

    /// Distinct trips stored.
    pub trips: usize,
}

impl ImportSummary {
    fn skipped(location: &str) -> Self {
        Self { location: location.to_string(), ..Self::default() }
    }
}

type Queue<P> = DispatchQueue<ProbeDispatcher<P>, JobTrigger<P>>;

/// Imports simulation files and forwards their points as probe data.
///
/// The dispatch queue is shared by every load on the same importer, so the
/// job requests follow the last acknowledgement across all files in flight.
pub struct Importer<P: Provider> {
    config: Config,
    provider: P,
    queue: Queue<P>,
    json_seq: AtomicU64,
}

impl<P: Provider> Importer<P> {
    /// Create an importer.
    ///
    /// # Errors
    ///
    /// Returns `Error::Dispatch` when the queue configuration is invalid.
    pub fn new(config: Config, provider: P) -> Result<Self> {
        let queue = DispatchQueue::new(
            config.queue.clone(),
            ProbeDispatcher::new(provider.clone()),
            JobTrigger::new(provider.clone(), config.timezone),
        )?;
        Ok(Self { config, provider, queue, json_seq: AtomicU64::new(0) })
    }

    /// Load a SUMO FCD-XML export.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReadFailed` when the file cannot be read, otherwise see
    /// [`Importer::import_fcd`].
    pub async fn load_fcd_simulation(&self, path: impl AsRef<Path>) -> Result<ImportSummary> {
        let location = location_of(path.as_ref());
        if !self.config.import_enabled {
            debug!(%location, "import disabled, skipping fcd simulation");
            return Ok(ImportSummary::skipped(&location));
        }
        let xml = read(path.as_ref()).await?;
        self.import_fcd(&location, &xml).await
    }

    /// Load a JSON-array simulation.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReadFailed` when the file cannot be read, otherwise see
    /// [`Importer::import_json`].
    pub async fn load_json_simulation(&self, path: impl AsRef<Path>) -> Result<ImportSummary> {
        let location = location_of(path.as_ref());
        if !self.config.import_enabled {
            debug!(%location, "import disabled, skipping json simulation");
            return Ok(ImportSummary::skipped(&location));
        }
        let json = read(path.as_ref()).await?;
        self.import_json(&location, &json).await
    }

    /// Import an FCD-XML document for `location`.
    ///
    /// Every vehicle gets one trip id for the run. Timestamps are the
    /// timestep offsets applied to a base instant of now minus a random
    /// jitter.
    ///
    /// The job requests wait until the whole document has been decoded. A
    /// document with no points never reaches the trip store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Probe` when the document cannot be decoded; trips
    /// decoded before the failure are still stored. Returns
    /// `Error::Persistence` when the trip store rejects the trips.
    pub async fn import_fcd(&self, location: &str, xml: &str) -> Result<ImportSummary> {
        if !self.config.import_enabled {
            return Ok(ImportSummary::skipped(location));
        }

        let now = Utc::now();
        let mut run = FcdRun::new(location, now.checked_sub_signed(self.jitter()).unwrap_or(now));
        let mut trips = TripAggregator::new();
        let run_guard = self.queue.begin_run();
        let decoded = FcdExport::try_from(xml)
            .and_then(|export| export.decode(&mut run, |point| self.accept(&mut trips, point)));
        drop(run_guard);

        self.finish(location, trips, decoded).await
    }

    /// Import a JSON-array document for `location`.
    ///
    /// All points of the document share one device id; each call takes the
    /// next device sequence number, empty documents included.
    ///
    /// The job requests wait until the whole document has been decoded. A
    /// document with no points never reaches the trip store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Probe` when the document cannot be decoded; trips
    /// decoded before the failure are still stored. Returns
    /// `Error::Persistence` when the trip store rejects the trips.
    pub async fn import_json(&self, location: &str, json: &str) -> Result<ImportSummary> {
        if !self.config.import_enabled {
            return Ok(ImportSummary::skipped(location));
        }

        let device_seq = self.json_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let run = JsonRun::new(location, device_seq, Utc::now(), self.jitter());
        let mut trips = TripAggregator::new();
        let run_guard = self.queue.begin_run();
        let decoded = JsonSimulation::try_from(json)
            .and_then(|simulation| simulation.decode(&run, |point| self.accept(&mut trips, point)));
        drop(run_guard);

        self.finish(location, trips, decoded).await
    }

    /// Wait until every submitted point has been acknowledged and the job
    /// requests, if due, have been sent.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Delay the host should wait after start-up before requesting jobs.
    #[must_use]
    pub const fn first_job_request_delay(&self) -> Duration {
        self.config.first_job_request_delay
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Find simulated trips ordered by the distance, in kilometres, between
    /// (`lat`, `lng`) and the trip origin.
    ///
    /// Each returned row carries that distance in its `distance` field.
    ///
    /// # Errors
    ///
    /// Returns `Error::ServerError` when the trip index cannot be searched.
    pub async fn search_simulated_trips_around(
        &self, lat: f64, lng: f64, limit: Option<usize>,
    ) -> Result<Vec<Map<String, Value>>> {
        let query = TripQuery {
            q: format!("deviceID:{SIM_CAR_DEVICE_ID_PREFIX}*"),
            sort: format!("<distance,org_lng,org_lat,{lng},{lat},km>"),
            limit: limit.filter(|&limit| limit > 0).unwrap_or(DEFAULT_SEARCH_LIMIT),
        };
        let hits = self.provider.search_trips(&query).await.context("searching simulated trips")?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut fields = hit.fields;
                let distance = hit.order.first().copied().and_then(Number::from_f64);
                fields.insert("distance".to_string(), distance.map_or(Value::Null, Value::Number));
                fields
            })
            .collect())
    }

    fn accept(&self, trips: &mut TripAggregator, point: ProbePoint) {
        trips.push(&point);
        self.queue.submit(DispatchTask::new(point));
    }

    // random backwards shift so repeated runs of one file do not collide
    fn jitter(&self) -> TimeDelta {
        let max = TimeDelta::from_std(self.config.time_jitter).unwrap_or(TimeDelta::MAX);
        let millis = rand::thread_rng().gen_range(0..=max.num_milliseconds());
        TimeDelta::milliseconds(millis)
    }

    async fn finish(
        &self, location: &str, trips: TripAggregator, decoded: probe::Result<usize>,
    ) -> Result<ImportSummary> {
        let summary = ImportSummary {
            location: location.to_string(),
            points: trips.points(),
            trips: trips.len(),
        };
        let stored = self.store(location, trips).await;

        match decoded {
            Ok(_) => {
                stored?;
                info!(
                    monotonic_counter.simulation_points = summary.points,
                    location = %summary.location,
                    trips = summary.trips,
                    "simulation imported"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(store_err) = stored {
                    warn!(%location, error = %store_err, "storing partial trips failed");
                }
                warn!(
                    monotonic_counter.simulation_import_failed = 1,
                    %location,
                    points = summary.points,
                    trips = summary.trips,
                    error = %e,
                    "simulation import aborted"
                );
                Err(e.into())
            }
        }
    }

    /// Bulk insert the run's trips. An empty run is not handed to the store.
    async fn store(&self, location: &str, trips: TripAggregator) -> Result<()> {
        if trips.is_empty() {
            return Ok(());
        }
        self.provider
            .insert_trip_routes(trips.into_trips())
            .await
            .map_err(|e| Error::Persistence(format!("storing trips for {location}: {e:#}")))
    }
}

fn location_of(path: &Path) -> String {
    location_tag(&path.to_string_lossy())
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::ReadFailed(format!("{}: {e}", path.display())))
}
