//! # Probe
//!
//! Canonical probe model for simulated vehicle trajectories, and the
//! simulation file formats that produce it.

mod error;
mod model;

pub mod fcd;
pub mod json;

pub use self::error::Error;
pub use self::fcd::{FcdExport, FcdRun};
pub use self::json::{JsonRun, JsonSimulation};
pub use self::model::*;

/// Result type for parsers.
pub type Result<T> = anyhow::Result<T, Error>;
