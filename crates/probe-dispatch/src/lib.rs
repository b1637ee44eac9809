//! # Probe Dispatch
//!
//! Forwards probe points to the map-matching and probe submission services
//! with a cap on concurrent calls, and requests the downstream analytics jobs
//! once every forwarded point has been acknowledged.

mod config;
mod dispatcher;
mod error;
mod map_match;
mod queue;
mod trigger;
mod trips;

pub mod provider;

pub use self::config::{DEFAULT_CAPACITY, QueueConfig};
pub use self::dispatcher::ProbeDispatcher;
pub use self::error::{Error, Result};
pub use self::map_match::{DEVICE_TYPE, MapMatchAdapter, ProbeRecord};
pub use self::provider::*;
pub use self::queue::{
    Admission, Dispatch, DispatchQueue, DispatchTask, Drain, QueueStats, RunGuard,
};
pub use self::trigger::{JobTrigger, job_ranges};
pub use self::trips::TripAggregator;
