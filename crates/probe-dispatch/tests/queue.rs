//! Tests for the bounded dispatch queue and its drain trigger.


use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use probe_dispatch::{Admission, DispatchQueue, QueueConfig, QueueStats};
use tokio::sync::Semaphore;

use self::provider::{DrainCounter, Recorder, task};

fn config(capacity: usize) -> QueueConfig {
    QueueConfig { capacity, call_timeout: Some(Duration::from_secs(5)), monitor_interval: None }
}

// Two failures and a queued success still drain the queue exactly once.
#[tokio::test]
async fn failures_complete_tasks() {
    provider::init_tracing();
    let recorder = Recorder::failing(&["T1", "T2"]);
    let drains = DrainCounter::default();
    let queue =
        DispatchQueue::new(config(2), recorder.clone(), drains.clone()).expect("should build");

    assert_eq!(queue.submit(task("T1")), Admission::Started);
    assert_eq!(queue.submit(task("T2")), Admission::Started);
    assert_eq!(queue.submit(task("T3")), Admission::Queued { depth: 1 });

    queue.wait_idle().await;

    assert_eq!(drains.fired(), 1);
    assert_eq!(recorder.started().last().map(String::as_str), Some("T3"));
    assert_eq!(
        queue.stats(),
        QueueStats {
            capacity: 2,
            pending: 0,
            in_flight: 0,
            submitted: 3,
            succeeded: 1,
            failed: 2,
            drains: 1,
        }
    );
}

// Overflow starts in arrival order.
#[tokio::test]
async fn overflow_is_fifo() {
    let gate = Arc::new(Semaphore::new(0));
    let recorder = Recorder::gated(Arc::clone(&gate));
    let drains = DrainCounter::default();
    let queue =
        DispatchQueue::new(config(1), recorder.clone(), drains.clone()).expect("should build");

    for trip in ["A", "B", "C", "D"] {
        queue.submit(task(trip));
    }
    let stats = queue.stats();
    assert_eq!((stats.in_flight, stats.pending), (1, 3));

    gate.add_permits(4);
    queue.wait_idle().await;

    assert_eq!(recorder.started(), vec!["A", "B", "C", "D"]);
    assert_eq!(drains.fired(), 1);
}

#[tokio::test]
async fn concurrency_never_exceeds_capacity() {
    let recorder = Recorder::new();
    let drains = DrainCounter::default();
    let queue =
        DispatchQueue::new(config(3), recorder.clone(), drains.clone()).expect("should build");

    for i in 0..50 {
        queue.submit(task(&format!("trip-{i}")));
        assert!(queue.stats().in_flight <= 3);
    }
    queue.wait_idle().await;

    assert!(recorder.max_in_flight() <= 3);
    assert_eq!(recorder.started().len(), 50);
    assert_eq!(queue.stats().succeeded, 50);
    assert_eq!(drains.fired(), 1);
}

// Tasks completing together still produce a single drain.
#[tokio::test]
async fn simultaneous_completions_drain_once() {
    let gate = Arc::new(Semaphore::new(0));
    let recorder = Recorder::gated(Arc::clone(&gate));
    let drains = DrainCounter::default();
    let queue =
        DispatchQueue::new(config(5), recorder.clone(), drains.clone()).expect("should build");

    for i in 0..5 {
        assert_eq!(queue.submit(task(&format!("trip-{i}"))), Admission::Started);
    }
    tokio::task::yield_now().await;
    gate.add_permits(5);
    queue.wait_idle().await;

    assert_eq!(drains.fired(), 1);
    assert_eq!(queue.stats().succeeded, 5);
}

// A later batch after the queue went idle is a new drain episode.
#[tokio::test]
async fn drain_per_episode() {
    let drains = DrainCounter::default();
    let queue = DispatchQueue::new(config(2), Recorder::new(), drains.clone())
        .expect("should build");

    queue.submit(task("first-1"));
    queue.submit(task("first-2"));
    queue.submit(task("first-3"));
    queue.wait_idle().await;
    assert_eq!(drains.fired(), 1);

    queue.submit(task("second-1"));
    queue.wait_idle().await;
    assert_eq!(drains.fired(), 2);
    assert_eq!(queue.stats().drains, 2);
}

#[tokio::test]
async fn idle_queue_never_drains() {
    let drains = DrainCounter::default();
    let queue = DispatchQueue::new(config(2), Recorder::new(), drains.clone())
        .expect("should build");

    queue.wait_idle().await;
    assert_eq!(drains.fired(), 0);
    assert_eq!(queue.stats(), QueueStats { capacity: 2, ..QueueStats::default() });
}

// A hung call is cut off and its slot reused.
#[tokio::test]
async fn timeout_frees_slot() {
    let gate = Arc::new(Semaphore::new(0));
    let recorder = Recorder::gated(gate);
    let drains = DrainCounter::default();
    let config = QueueConfig {
        capacity: 1,
        call_timeout: Some(Duration::from_millis(20)),
        monitor_interval: None,
    };
    let queue = DispatchQueue::new(config, recorder.clone(), drains.clone()).expect("should build");

    queue.submit(task("hung-1"));
    queue.submit(task("hung-2"));
    queue.wait_idle().await;

    assert_eq!(recorder.started(), vec!["hung-1", "hung-2"]);
    assert_eq!(queue.stats().failed, 2);
    assert_eq!(drains.fired(), 1);
}

#[tokio::test]
async fn panic_counts_as_failure() {
    let drains = DrainCounter::default();
    let queue = DispatchQueue::new(config(1), Recorder::panicking(&["bad"]), drains.clone())
        .expect("should build");

    queue.submit(task("bad"));
    queue.submit(task("good"));
    queue.wait_idle().await;

    let stats = queue.stats();
    assert_eq!((stats.succeeded, stats.failed), (1, 1));
    assert_eq!(drains.fired(), 1);
}

// Identical tasks are sent as many times as they are submitted.
#[tokio::test]
async fn duplicates_are_not_collapsed() {
    let recorder = Recorder::new();
    let queue = DispatchQueue::new(config(1), recorder.clone(), DrainCounter::default())
        .expect("should build");

    queue.submit(task("same"));
    queue.submit(task("same"));
    queue.wait_idle().await;

    assert_eq!(recorder.started(), vec!["same", "same"]);
    assert_eq!(queue.stats().submitted, 2);
}

#[tokio::test]
async fn monitor_stops_when_empty() {
    let gate = Arc::new(Semaphore::new(0));
    let drains = DrainCounter::default();
    let config = QueueConfig {
        capacity: 1,
        call_timeout: None,
        monitor_interval: Some(Duration::from_millis(5)),
    };
    let queue = DispatchQueue::new(config, Recorder::gated(Arc::clone(&gate)), drains.clone())
        .expect("should build");

    queue.submit(task("a"));
    assert_eq!(queue.submit(task("b")), Admission::Queued { depth: 1 });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.stats().pending, 1);

    gate.add_permits(2);
    queue.wait_idle().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(drains.fired(), 1);
}

// Tasks finishing on other workers while a batch is still being submitted
// leave the episode open until the run ends.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_guard_holds_drain() {
    let drains = DrainCounter::default();
    let queue = DispatchQueue::new(config(10), Recorder::new(), drains.clone())
        .expect("should build");

    let run = queue.begin_run();
    for i in 0..5_000 {
        queue.submit(task(&format!("trip-{i}")));
    }
    tokio::time::timeout(Duration::from_secs(10), async {
        while queue.stats().succeeded < 5_000 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("should complete every task");

    assert_eq!(drains.fired(), 0);
    tokio::time::timeout(Duration::from_millis(20), queue.wait_idle())
        .await
        .expect_err("should stay busy while the run is open");

    drop(run);
    queue.wait_idle().await;
    assert_eq!(drains.fired(), 1);
    assert_eq!(queue.stats().drains, 1);
}

// A run that is still in flight when it ends drains on its last completion.
#[tokio::test]
async fn drain_after_run_ends() {
    let gate = Arc::new(Semaphore::new(0));
    let drains = DrainCounter::default();
    let queue = DispatchQueue::new(config(2), Recorder::gated(Arc::clone(&gate)), drains.clone())
        .expect("should build");

    let run = queue.begin_run();
    for trip in ["A", "B", "C"] {
        queue.submit(task(trip));
    }
    drop(run);
    assert_eq!(drains.fired(), 0);

    gate.add_permits(3);
    queue.wait_idle().await;
    assert_eq!(drains.fired(), 1);
}

#[tokio::test]
async fn empty_run_never_drains() {
    let drains = DrainCounter::default();
    let queue = DispatchQueue::new(config(2), Recorder::new(), drains.clone())
        .expect("should build");

    drop(queue.begin_run());
    queue.wait_idle().await;
    assert_eq!(drains.fired(), 0);
}
