use std::slice;

use anyhow::{Context, Result};

use crate::map_match::MapMatchAdapter;
use crate::provider::{MapMatcher, ProbeSubmitter};
use crate::queue::{Dispatch, DispatchTask};

/// Sends each task's probe point to the probe submission service, map
/// matching it first when needed.
#[derive(Debug, Clone)]
pub struct ProbeDispatcher<P> {
    adapter: MapMatchAdapter<P>,
    submitter: P,
}

impl<P: MapMatcher + ProbeSubmitter + Clone> ProbeDispatcher<P> {
    pub fn new(provider: P) -> Self {
        Self { adapter: MapMatchAdapter::new(provider.clone()), submitter: provider }
    }
}

impl<P: MapMatcher + ProbeSubmitter + 'static> Dispatch for ProbeDispatcher<P> {
    async fn dispatch(&self, task: &DispatchTask) -> Result<()> {
        let record = self.adapter.probe_record(&task.device_id, &task.point).await?;
        self.submitter
            .send_probe_data(slice::from_ref(&record))
            .await
            .with_context(|| format!("sending probe data for {}", task.device_id))
    }
}
