//! Completion trigger.
//!
//! Requests the downstream analytics jobs for yesterday and today once all
//! submitted probes have been acknowledged.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::provider::JobRequester;
use crate::queue::Drain;

/// Same-day job ranges for the day before `today` and for `today`.
#[must_use]
pub fn job_ranges(today: NaiveDate) -> [(NaiveDate, NaiveDate); 2] {
    let yesterday = today.pred_opt().unwrap_or(today);
    [(yesterday, yesterday), (today, today)]
}

/// Sends the job requests when the dispatch queue drains.
#[derive(Debug, Clone)]
pub struct JobTrigger<P> {
    requester: P,
    timezone: Tz,
}

impl<P: JobRequester> JobTrigger<P> {
    /// Dates are computed in `timezone`.
    pub const fn new(requester: P, timezone: Tz) -> Self {
        Self { requester, timezone }
    }

    /// Request jobs relative to the current date.
    pub async fn fire(&self) {
        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        self.fire_on(today).await;
    }

    /// Request jobs for the day before `today` and for `today`. The two
    /// requests are independent; a failure of one is logged and does not
    /// affect the other.
    pub async fn fire_on(&self, today: NaiveDate) {
        let [yesterday, today] = job_ranges(today);
        futures::join!(self.request(yesterday), self.request(today));
    }

    async fn request(&self, (from, to): (NaiveDate, NaiveDate)) {
        match self.requester.send_job_request(from, to).await {
            Ok(()) => info!(monotonic_counter.job_requests = 1, %from, %to, "job request sent"),
            Err(e) => warn!(
                monotonic_counter.job_request_failed = 1,
                %from,
                %to,
                error = %e,
                "job request failed"
            ),
        }
    }
}

impl<P: JobRequester + 'static> Drain for JobTrigger<P> {
    async fn drained(&self) {
        self.fire().await;
    }
}
