//! Bounded dispatch queue.
//!
//! At most `capacity` tasks await the external service at once. Overflow
//! waits in arrival order and starts as slots free up. When the last task of
//! an episode completes with nothing waiting, the drain action runs once.
//! A producer that submits a batch holds a [`RunGuard`] so the episode cannot
//! end while it is still submitting.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use futures::FutureExt;
use probe::ProbePoint;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::{Error, Result};

/// One outbound attempt for a task. Success and failure both complete the
/// task.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, task: &DispatchTask) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Action run when the queue drains.
pub trait Drain: Send + Sync + 'static {
    fn drained(&self) -> impl Future<Output = ()> + Send;
}

/// A single unit of outbound work.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTask {
    /// Admission sequence number, assigned by the queue.
    pub seq: u64,
    pub device_id: String,
    pub point: ProbePoint,
}

impl DispatchTask {
    #[must_use]
    pub fn new(point: ProbePoint) -> Self {
        Self { seq: 0, device_id: point.device_id.clone(), point }
    }
}

/// What `submit` did with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The task took a free slot and is running.
    Started,

    /// The queue was at capacity; the task waits at position `depth`.
    Queued { depth: usize },
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub capacity: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub drains: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<DispatchTask>,
    in_flight: usize,
    // set by `submit`, cleared by the completion that fires the drain action
    armed: bool,
    // drain actions still running
    draining: usize,
    // live run guards
    producers: usize,
    monitoring: bool,
    next_seq: u64,
    submitted: u64,
    succeeded: u64,
    failed: u64,
    drains: u64,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.pending.is_empty() && self.draining == 0 && self.producers == 0
    }

    // the single edge that fires the drain action: nothing pending, nothing
    // in flight and no producer mid-run
    fn take_drain(&mut self) -> Option<u64> {
        if !self.armed || self.in_flight > 0 || !self.pending.is_empty() || self.producers > 0 {
            return None;
        }
        self.armed = false;
        self.draining += 1;
        self.drains += 1;
        Some(self.drains)
    }
}

enum Step {
    Start(DispatchTask),
    Drained(u64),
    Wait,
}

struct Inner<D, T> {
    config: QueueConfig,
    dispatcher: D,
    trigger: T,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Concurrency-capped FIFO dispatcher with a once-per-drain completion
/// action.
///
/// `submit` and task completion are the only mutators of the queue state and
/// never interleave. Cloning shares the queue.
pub struct DispatchQueue<D, T> {
    inner: Arc<Inner<D, T>>,
}

impl<D, T> Clone for DispatchQueue<D, T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<D: Dispatch, T: Drain> DispatchQueue<D, T> {
    /// Create a queue that sends tasks with `dispatcher` and runs `trigger`
    /// each time it drains.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when `capacity` is zero, or when
    /// `call_timeout` or `monitor_interval` is set to a zero duration.
    pub fn new(config: QueueConfig, dispatcher: D, trigger: T) -> Result<Self> {
        if config.capacity == 0 {
            return Err(Error::InvalidConfig("capacity must be at least 1".to_string()));
        }
        if config.call_timeout.is_some_and(|limit| limit.is_zero()) {
            return Err(Error::InvalidConfig("call timeout must be non-zero".to_string()));
        }
        if config.monitor_interval.is_some_and(|period| period.is_zero()) {
            return Err(Error::InvalidConfig("monitor interval must be non-zero".to_string()));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                dispatcher,
                trigger,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        })
    }

    /// Admit a task: start it when a slot is free, otherwise queue it behind
    /// earlier overflow.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, mut task: DispatchTask) -> Admission {
        let mut state = self.state();
        state.armed = true;
        state.submitted += 1;
        task.seq = state.next_seq;
        state.next_seq += 1;

        if state.in_flight < self.inner.config.capacity {
            state.in_flight += 1;
            debug!(seq = task.seq, in_flight = state.in_flight, "starting probe dispatch");
            drop(state);
            self.start(task);
            return Admission::Started;
        }

        state.pending.push_back(task);
        let depth = state.pending.len();
        let monitor = self.inner.config.monitor_interval.filter(|_| !state.monitoring);
        if monitor.is_some() {
            state.monitoring = true;
        }
        drop(state);

        if let Some(period) = monitor {
            self.monitor(period);
        }
        Admission::Queued { depth }
    }

    /// Hold the drain open while a batch is being submitted.
    ///
    /// Tasks completing while any guard is alive never end the episode. When
    /// the last guard drops, the drain action runs if everything submitted
    /// has already completed; otherwise the last completion runs it.
    #[must_use = "the drain is held back only while the guard is alive"]
    pub fn begin_run(&self) -> RunGuard<D, T> {
        self.state().producers += 1;
        RunGuard { queue: self.clone() }
    }

    /// Current counters and queue depth.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.state();
        QueueStats {
            capacity: self.inner.config.capacity,
            pending: state.pending.len(),
            in_flight: state.in_flight,
            submitted: state.submitted,
            succeeded: state.succeeded,
            failed: state.failed,
            drains: state.drains,
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Wait until nothing is pending or in flight, no run guard is alive and
    /// no drain action is running. Returns immediately on an idle queue.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self.state().is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, task: DispatchTask) {
        let queue = self.clone();
        tokio::spawn(async move {
            let result = queue.execute(&task).await;
            queue.on_task_complete(&task, &result).await;
        });
    }

    async fn execute(&self, task: &DispatchTask) -> anyhow::Result<()> {
        let call = AssertUnwindSafe(self.inner.dispatcher.dispatch(task)).catch_unwind();
        let outcome = match self.inner.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => return Err(anyhow!("probe dispatch timed out after {limit:?}")),
            },
            None => call.await,
        };
        outcome.unwrap_or_else(|_panic| Err(anyhow!("probe dispatch panicked")))
    }

    /// Continuation of every started task, whatever its outcome.
    async fn on_task_complete(&self, task: &DispatchTask, result: &anyhow::Result<()>) {
        match result {
            Ok(()) => debug!(seq = task.seq, device_id = %task.device_id, "probe dispatched"),
            Err(e) => warn!(
                monotonic_counter.probe_dispatch_failed = 1,
                seq = task.seq,
                device_id = %task.device_id,
                trip_id = %task.point.trip_id,
                error = %e,
                "probe dispatch failed"
            ),
        }

        match self.complete(result.is_ok()) {
            Ok(Step::Start(next)) => {
                debug!(seq = next.seq, "starting queued probe dispatch");
                self.start(next);
            }
            Ok(Step::Drained(episode)) => self.drain(episode).await,
            Ok(Step::Wait) => {}
            Err(e) => error!(error = %e, "dispatch queue bookkeeping"),
        }
    }

    async fn drain(&self, episode: u64) {
        info!(monotonic_counter.probe_drains = 1, episode, "probe queue drained");
        if AssertUnwindSafe(self.inner.trigger.drained()).catch_unwind().await.is_err() {
            error!(episode, "drain action panicked");
        }
        self.finish_drain();
    }

    fn complete(&self, succeeded: bool) -> Result<Step> {
        let mut state = self.state();
        if succeeded {
            state.succeeded += 1;
        } else {
            state.failed += 1;
        }

        let Some(in_flight) = state.in_flight.checked_sub(1) else {
            return Err(Error::InvariantViolation("task completed with none in flight".to_string()));
        };
        state.in_flight = in_flight;

        if let Some(next) = state.pending.pop_front() {
            state.in_flight += 1;
            return Ok(Step::Start(next));
        }

        Ok(state.take_drain().map_or(Step::Wait, Step::Drained))
    }

    fn end_run(&self) -> Step {
        let mut state = self.state();
        state.producers = state.producers.saturating_sub(1);
        state.take_drain().map_or(Step::Wait, Step::Drained)
    }

    fn release(&self) {
        let Step::Drained(episode) = self.end_run() else {
            if self.state().is_idle() {
                self.inner.idle.notify_waiters();
            }
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let queue = self.clone();
                handle.spawn(async move { queue.drain(episode).await });
            }
            Err(e) => {
                error!(episode, error = %e, "no runtime for the drain action");
                self.finish_drain();
            }
        }
    }

    fn finish_drain(&self) {
        let idle = {
            let mut state = self.state();
            state.draining = state.draining.saturating_sub(1);
            state.is_idle()
        };
        if idle {
            self.inner.idle.notify_waiters();
        }
    }

    fn monitor(&self, period: Duration) {
        let queue = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some((depth, in_flight)) = queue.monitor_tick() else {
                    info!("probe queue empty, stopping queue length monitoring");
                    break;
                };
                info!(gauge.probe_queue_depth = depth, in_flight, "remaining probe queue length");
            }
        });
    }

    fn monitor_tick(&self) -> Option<(usize, usize)> {
        let mut state = self.state();
        if state.pending.is_empty() {
            state.monitoring = false;
            return None;
        }
        Some((state.pending.len(), state.in_flight))
    }
}

/// Keeps the current drain episode open until dropped.
///
/// Returned by [`DispatchQueue::begin_run`]. Dropping it outside a Tokio
/// runtime skips the drain action.
pub struct RunGuard<D: Dispatch, T: Drain> {
    queue: DispatchQueue<D, T>,
}

impl<D: Dispatch, T: Drain> Drop for RunGuard<D, T> {
    fn drop(&mut self) {
        self.queue.release();
    }
}
