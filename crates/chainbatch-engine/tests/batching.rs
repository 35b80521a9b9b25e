//! End-to-end coalescing behaviour through the public API.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{self, Instant};

use chainbatch_core::{
    BatchConfig, CallOutcome, CallSpec, FailureMode, MulticallTransport, ReadData, ReadOutcome,
    TransportError,
};
use chainbatch_engine::{BatchHandle, ReadOptions, ReadStatus, ReadTarget, RequestQueue};

const WINDOW: Duration = Duration::from_millis(50);
const LATENCY: Duration = Duration::from_millis(100);

/// Records every bulk call with its start time. Answers `dest.op`, fails
/// operations listed in `failing`, and fails the whole bulk call when
/// `broken` is set.
#[derive(Default)]
struct Upstream {
    batches: Mutex<Vec<(Instant, Vec<CallSpec>)>>,
    failing: HashSet<&'static str>,
    broken: bool,
}

impl Upstream {
    fn failing(ops: &[&'static str]) -> Self {
        Self {
            failing: ops.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    fn batches(&self) -> Vec<Vec<CallSpec>> {
        self.batches.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    fn starts(&self) -> Vec<Instant> {
        self.batches.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl MulticallTransport for Upstream {
    async fn execute(&self, calls: &[CallSpec]) -> Result<Vec<CallOutcome>, TransportError> {
        self.batches.lock().unwrap().push((Instant::now(), calls.to_vec()));
        time::sleep(LATENCY).await;
        if self.broken {
            return Err(TransportError::Http("502 bad gateway".into()));
        }
        Ok(calls
            .iter()
            .map(|c| {
                if self.failing.contains(c.operation.as_str()) {
                    CallOutcome::Failure("execution reverted".into())
                } else {
                    CallOutcome::Success(json!(format!("{}.{}", c.destination, c.operation)))
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "upstream"
    }
}

fn start(upstream: Upstream) -> (Arc<Upstream>, BatchHandle) {
    start_with(upstream, FailureMode::Swallow)
}

fn start_with(upstream: Upstream, mode: FailureMode) -> (Arc<Upstream>, BatchHandle) {
    let upstream = Arc::new(upstream);
    let config = BatchConfig {
        batch_window_ms: WINDOW.as_millis() as u64,
        failure_mode: mode,
        ..BatchConfig::default()
    };
    let handle = RequestQueue::spawn(upstream.clone(), config);
    (upstream, handle)
}

fn call(dest: &str, op: &str) -> CallSpec {
    CallSpec::new(dest, op, vec![], 1)
}

fn value(s: &str) -> ReadOutcome {
    ReadOutcome::Value(json!(s))
}

#[tokio::test(start_paused = true)]
async fn three_singles_two_unique_calls() {
    let (upstream, handle) = start(Upstream::default());

    let (x1, x2, y) = tokio::join!(
        handle.read_one(call("X", "f")),
        handle.read_one(call("X", "f")),
        handle.read_one(call("Y", "g")),
    );

    assert_eq!(upstream.batches(), vec![vec![call("X", "f"), call("Y", "g")]]);
    assert_eq!(x1.unwrap(), value("X.f"));
    assert_eq!(x2.unwrap(), value("X.f"));
    assert_eq!(y.unwrap(), value("Y.g"));
}

#[tokio::test(start_paused = true)]
async fn n_calls_k_keys_reach_upstream_k_times() {
    let (upstream, handle) = start(Upstream::default());

    let reads: Vec<_> = (0..30)
        .map(|i| handle.read_one(call(&format!("D{}", i % 4), "f")))
        .collect();
    let results = futures::future::join_all(reads).await;

    assert_eq!(upstream.batches().len(), 1);
    assert_eq!(upstream.batches()[0].len(), 4);
    for (i, r) in results.into_iter().enumerate() {
        assert_eq!(r.unwrap(), value(&format!("D{}.f", i % 4)));
    }
}

#[tokio::test(start_paused = true)]
async fn multiple_with_failed_call_keeps_positions() {
    let (_, handle) = start(Upstream::failing(&["b"]));

    let binding = handle.bind_multiple(
        vec![call("A", "a"), call("B", "b"), call("C", "c")],
        ReadOptions::default(),
    );
    let state = binding.settled().await;

    assert_eq!(state.status, ReadStatus::Success);
    assert_eq!(
        state.data,
        Some(ReadData::Multiple(vec![value("A.a"), ReadOutcome::Empty, value("C.c")]))
    );
}

#[tokio::test(start_paused = true)]
async fn multiple_keeps_order_across_dedup() {
    let (upstream, handle) = start(Upstream::default());

    let (first, second) = tokio::join!(
        handle.read_many(vec![call("C", "f"), call("A", "f"), call("B", "f")]),
        handle.read_many(vec![call("B", "f"), call("C", "f"), call("C", "f"), call("A", "f")]),
    );

    assert_eq!(upstream.batches()[0].len(), 3);
    assert_eq!(first.unwrap(), vec![value("C.f"), value("A.f"), value("B.f")]);
    assert_eq!(
        second.unwrap(),
        vec![value("B.f"), value("C.f"), value("C.f"), value("A.f")]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_call_does_not_affect_others() {
    let (_, handle) = start(Upstream::failing(&["bad"]));

    let (x, y) = tokio::join!(handle.read_one(call("X", "bad")), handle.read_one(call("Y", "good")));

    assert_eq!(x.unwrap(), ReadOutcome::Empty);
    assert_eq!(y.unwrap(), value("Y.good"));
}

#[tokio::test(start_paused = true)]
async fn transport_fault_settles_everyone_once_with_empty() {
    let (upstream, handle) = start(Upstream::broken());

    let single = handle.bind_single(Some(call("A", "f")), ReadOptions::default());
    let multi = handle.bind_multiple(vec![call("B", "f"), call("C", "f")], ReadOptions::default());
    let mut changes = single.subscribe();

    let (s, m) = tokio::join!(single.settled(), multi.settled());
    assert_eq!(s.status, ReadStatus::Success);
    assert_eq!(s.data, Some(ReadData::Single(ReadOutcome::Empty)));
    assert_eq!(
        m.data,
        Some(ReadData::Multiple(vec![ReadOutcome::Empty, ReadOutcome::Empty]))
    );

    // Settled exactly once: no further state changes after the flush.
    changes.borrow_and_update();
    time::sleep(Duration::from_secs(1)).await;
    assert!(!changes.has_changed().unwrap());
    assert_eq!(upstream.batches().len(), 1);
    assert_eq!(handle.stats().transport_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn transport_fault_reported_as_error() {
    let (_, handle) = start_with(Upstream::broken(), FailureMode::Report);

    let binding = handle.bind_single(Some(call("A", "f")), ReadOptions::default());
    let state = binding.settled().await;
    assert_eq!(state.status, ReadStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn same_call_twice_before_debounce_is_one_upstream_call() {
    let (upstream, handle) = start(Upstream::default());

    let first = handle.read_one(call("X", "f"));
    time::sleep(Duration::from_millis(20)).await;
    let second = handle.read_one(call("X", "f"));

    let (a, b) = tokio::join!(first, second);
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(upstream.batches(), vec![vec![call("X", "f")]]);
}

#[tokio::test(start_paused = true)]
async fn arrival_for_in_flight_key_reuses_running_call() {
    let (upstream, handle) = start(Upstream::default());

    let first = tokio::spawn(handle.read_one(call("X", "f")));
    // Window closed at 50ms; the bulk call runs until 150ms.
    time::sleep(Duration::from_millis(80)).await;
    let late = handle.read_one(call("X", "f")).await.unwrap();

    assert_eq!(late, value("X.f"));
    assert_eq!(first.await.unwrap().unwrap(), value("X.f"));
    assert_eq!(upstream.batches().len(), 1);
    assert_eq!(handle.stats().attached_in_flight, 1);
}

#[tokio::test(start_paused = true)]
async fn partially_in_flight_arrival_sends_only_missing_calls() {
    let (upstream, handle) = start(Upstream::default());

    let first = tokio::spawn(handle.read_one(call("X", "f")));
    time::sleep(Duration::from_millis(80)).await;
    let late = handle
        .read_many(vec![call("X", "f"), call("Z", "g"), call("X", "f")])
        .await
        .unwrap();

    assert_eq!(late, vec![value("X.f"), value("Z.g"), value("X.f")]);
    assert_eq!(first.await.unwrap().unwrap(), value("X.f"));
    assert_eq!(upstream.batches(), vec![vec![call("X", "f")], vec![call("Z", "g")]]);
}

#[tokio::test(start_paused = true)]
async fn partially_in_flight_arrival_after_transport_fault() {
    let (upstream, handle) = start_with(Upstream::broken(), FailureMode::Report);

    let first = tokio::spawn(handle.read_one(call("X", "f")));
    time::sleep(Duration::from_millis(80)).await;
    let late = handle.read_many(vec![call("X", "f"), call("Z", "g")]).await;

    assert!(matches!(late, Err(chainbatch_core::BatchError::Transport(_))));
    assert!(first.await.unwrap().is_err());
    // The failed request is settled with its flush and never re-sent.
    assert_eq!(upstream.batches(), vec![vec![call("X", "f")]]);
}

#[tokio::test(start_paused = true)]
async fn arrival_during_flush_goes_to_next_flush_without_debounce() {
    let (upstream, handle) = start(Upstream::default());
    let t0 = Instant::now();

    let first = tokio::spawn(handle.read_one(call("X", "f")));
    time::sleep(Duration::from_millis(80)).await;
    let second = handle.read_one(call("Y", "g")).await.unwrap();

    assert_eq!(second, value("Y.g"));
    first.await.unwrap().unwrap();

    // The in-progress call was not extended with Y.
    assert_eq!(upstream.batches(), vec![vec![call("X", "f")], vec![call("Y", "g")]]);
    let starts = upstream.starts();
    assert!(starts[0] - t0 >= WINDOW);
    // The second flush starts as soon as the first settles, with no new window.
    let gap = starts[1] - starts[0];
    assert!(gap >= LATENCY && gap < LATENCY + WINDOW, "gap = {gap:?}");
}

#[tokio::test(start_paused = true)]
async fn sequential_reads_use_separate_flushes() {
    let (upstream, handle) = start(Upstream::default());

    let a = handle.read_one(call("A", "f")).await.unwrap();
    let b = handle.read_one(call("B", "f")).await.unwrap();

    assert_eq!((a, b), (value("A.f"), value("B.f")));
    assert_eq!(upstream.batches().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn identity_change_discards_stale_result() {
    let (upstream, handle) = start(Upstream::default());

    let binding = handle.bind_single(Some(call("A", "f")), ReadOptions::default());
    // A is in flight from 50ms to 150ms.
    time::sleep(Duration::from_millis(80)).await;
    binding.update(ReadTarget::Single(Some(call("B", "f"))));

    // A settles at 150ms; B is still loading and must not show A's value.
    time::sleep(Duration::from_millis(90)).await;
    let state = binding.state();
    assert_eq!(state.status, ReadStatus::Loading);
    assert_eq!(state.data, None);

    let state = binding.settled().await;
    assert_eq!(state.status, ReadStatus::Success);
    assert_eq!(binding.value(), Some(json!("B.f")));
    assert_eq!(upstream.batches().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn bindings_share_calls_with_direct_reads() {
    let (upstream, handle) = start(Upstream::default());

    let binding = handle.bind_single(Some(call("X", "f")), ReadOptions::default());
    let direct = handle.read_one(call("X", "f"));

    assert_eq!(direct.await.unwrap(), value("X.f"));
    binding.settled().await;
    assert_eq!(binding.value(), Some(json!("X.f")));
    assert_eq!(upstream.batches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn buffered_work_is_flushed_after_last_handle_drops() {
    let (upstream, handle) = start(Upstream::default());
    let pending = handle.read_one(call("X", "f"));
    drop(handle);

    assert_eq!(pending.await.unwrap(), value("X.f"));
    assert_eq!(upstream.batches().len(), 1);
}
