//! Trip aggregator.

use probe::{ProbePoint, Trip, TripRoutes};

/// Groups the points of one ingestion run by trip id, keeping insertion
/// order within each trip.
#[derive(Debug, Clone, Default)]
pub struct TripAggregator {
    trips: TripRoutes,
    points: usize,
}

impl TripAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `point` to its trip, creating the trip on first sight.
    pub fn push(&mut self, point: &ProbePoint) {
        self.trips
            .entry(point.trip_id.clone())
            .or_insert_with(|| Trip::new(point.trip_id.clone()))
            .routes
            .push(point.clone());
        self.points += 1;
    }

    /// Number of trips.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trips.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    /// Number of points across all trips.
    #[must_use]
    pub const fn points(&self) -> usize {
        self.points
    }

    #[must_use]
    pub fn get(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    /// Hand over the accumulated trips.
    #[must_use]
    pub fn into_trips(self) -> TripRoutes {
        self.trips
    }
}
