//! # Simulation Importer
//!
//! Imports simulated vehicle trajectories (SUMO FCD-XML exports or JSON
//! arrays) as probe data. Every point is grouped into its trip for bulk
//! storage and forwarded, through a bounded dispatch queue, to the
//! map-matching and probe submission services. Once all forwarded points
//! have been acknowledged, the analytics jobs for yesterday and today are
//! requested.
//!
//! External services are reached through the [`Provider`] trait, which the
//! hosting application implements.

mod config;
mod error;
mod importer;
mod provider;

pub use probe::{ProbePoint, Trip, TripRoutes};
pub use probe_dispatch::{QueueConfig, QueueStats, TripHit, TripQuery};

pub use self::config::Config;
pub use self::error::{Error, Result};
pub use self::importer::{DEFAULT_SEARCH_LIMIT, ImportSummary, Importer};
pub use self::provider::Provider;
