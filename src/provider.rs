//! # Provider
//!
//! Provider gathers the external services an import run talks to.

use probe_dispatch::{JobRequester, MapMatcher, ProbeSubmitter, TripSearch, TripStore};

/// Provider entry point implemented by the host application.
///
/// Clones must share the underlying clients: the dispatch pipeline and the
/// importer each hold one.
pub trait Provider:
    MapMatcher + ProbeSubmitter + JobRequester + TripStore + TripSearch + Clone + 'static
{
}

impl<T> Provider for T where
    T: MapMatcher + ProbeSubmitter + JobRequester + TripStore + TripSearch + Clone + 'static
{
}
