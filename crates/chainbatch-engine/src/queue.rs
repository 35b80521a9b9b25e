//! Debounced request queue.
//!
//! A single background task owns the buffer, the debounce timer and the
//! dispatcher. Callers hold a cloneable [`BatchHandle`] and talk to the task
//! over a channel; each caller gets its result back on its own `oneshot`.
//!
//! Scheduler states:
//! ```text
//! Idle ──arrival──▶ Armed ──window elapsed──▶ Flushing ──▶ Idle
//!                   ▲  │ arrival resets                │
//!                   └──┘ the window                     └─ more buffered: flush again, no delay
//! ```
//! While a flush is running the task keeps receiving. An arrival whose calls
//! are all in flight is answered by the running call. One with some calls in
//! flight takes those results and sends only the rest in the next flush.
//! Anything else waits for the next flush.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};

use chainbatch_core::{
    BatchConfig, BatchError, CallSet, CallSpec, MulticallTransport, ReadData, ReadOutcome,
};

use crate::dedup::Attachment;
use crate::dispatch::BatchDispatcher;
use crate::pending::{request_id, PendingRequest};
use crate::stats::{BatchStats, StatsSnapshot};

/// Where the flush scheduler currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing buffered.
    Idle,
    /// Requests buffered, debounce timer running.
    Armed,
    /// A bulk call is in flight.
    Flushing,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Armed => write!(f, "armed"),
            Self::Flushing => write!(f, "flushing"),
        }
    }
}

/// The queue task. Constructed and started with [`RequestQueue::spawn`].
pub struct RequestQueue {
    rx: mpsc::UnboundedReceiver<PendingRequest>,
    buffer: Vec<PendingRequest>,
    dispatcher: BatchDispatcher,
    window: Duration,
    max_debounce: Option<Duration>,
    state: watch::Sender<SchedulerState>,
}

impl RequestQueue {
    /// Start a queue on the current Tokio runtime and return its handle.
    ///
    /// The task stops once every handle has been dropped and everything it
    /// holds has been flushed.
    pub fn spawn(transport: Arc<dyn MulticallTransport>, config: BatchConfig) -> BatchHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let stats = Arc::new(BatchStats::default());

        let queue = Self {
            rx,
            buffer: Vec::new(),
            dispatcher: BatchDispatcher::new(transport, &config, Arc::clone(&stats)),
            window: config.batch_window(),
            max_debounce: config.max_debounce(),
            state: state_tx,
        };
        tokio::spawn(queue.run());

        BatchHandle {
            tx,
            stats,
            state: state_rx,
        }
    }

    async fn run(mut self) {
        tracing::debug!(window_ms = self.window.as_millis() as u64, "request queue started");

        while let Some(first) = self.rx.recv().await {
            self.buffer.push(first);
            self.set_state(SchedulerState::Armed);
            self.debounce().await;

            loop {
                self.set_state(SchedulerState::Flushing);
                let batch = std::mem::take(&mut self.buffer);
                self.flush(batch).await;

                while let Ok(req) = self.rx.try_recv() {
                    self.buffer.push(req);
                }
                if self.buffer.is_empty() {
                    break;
                }
                tracing::trace!(buffered = self.buffer.len(), "requests arrived during flush");
            }
            self.set_state(SchedulerState::Idle);
        }

        tracing::debug!("request queue stopped");
    }

    /// Accumulate until the window passes with no arrival (or the optional
    /// cap is reached, or every handle is gone).
    async fn debounce(&mut self) {
        let cap = self.max_debounce.map(|d| Instant::now() + d);
        loop {
            let mut deadline = Instant::now() + self.window;
            if let Some(cap) = cap {
                deadline = deadline.min(cap);
            }
            tokio::select! {
                _ = time::sleep_until(deadline) => return,
                item = self.rx.recv() => match item {
                    Some(req) => self.buffer.push(req),
                    None => return,
                },
            }
        }
    }

    async fn flush(&mut self, mut requests: Vec<PendingRequest>) {
        let mut plan = self.dispatcher.dedupe(&requests);
        tracing::debug!(
            requests = requests.len(),
            calls = plan.routed_calls(),
            unique = plan.unique_calls.len(),
            "flushing batch"
        );

        let mut partial = Vec::new();
        let mut upstream = self.dispatcher.dispatch(plan.unique_calls.clone());
        let dispatched = loop {
            tokio::select! {
                result = &mut upstream => break result,
                Some(req) = self.rx.recv() => match self.dispatcher.attach(&mut plan, &req) {
                    Attachment::Full => requests.push(req),
                    Attachment::Partial(in_flight) => partial.push((req, in_flight)),
                    Attachment::Detached => self.buffer.push(req),
                },
            }
        };

        let carried = self.dispatcher.demultiplex(&plan, requests, partial, dispatched);
        self.buffer.extend(carried);
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }
}

/// Cloneable entry point to a [`RequestQueue`].
#[derive(Clone)]
pub struct BatchHandle {
    tx: mpsc::UnboundedSender<PendingRequest>,
    stats: Arc<BatchStats>,
    state: watch::Receiver<SchedulerState>,
}

impl BatchHandle {
    /// Queue `calls` and return a future for their result.
    ///
    /// The request is queued immediately, not when the future is first
    /// polled. Dropping the future abandons the result, not the upstream call.
    pub fn enqueue(&self, id: impl Into<String>, calls: CallSet) -> Settlement {
        let (req, rx) = PendingRequest::new(id.into(), calls);
        let len = req.calls.len();
        match self.tx.send(req) {
            Ok(()) => {
                self.stats.record_enqueued(len);
                Settlement { rx: Some(rx) }
            }
            Err(_) => Settlement { rx: None },
        }
    }

    /// Read one call.
    pub fn read_one(
        &self,
        call: CallSpec,
    ) -> impl Future<Output = Result<ReadOutcome, BatchError>> + Send + 'static {
        let calls = CallSet::Single(call);
        let settlement = self.enqueue(request_id(&calls), calls);
        async move {
            let data = settlement.await?;
            Ok(data.into_outcomes().pop().unwrap_or(ReadOutcome::Empty))
        }
    }

    /// Read several calls; the result has the same length and order.
    pub fn read_many(
        &self,
        calls: Vec<CallSpec>,
    ) -> impl Future<Output = Result<Vec<ReadOutcome>, BatchError>> + Send + 'static {
        let calls = CallSet::Multiple(calls);
        let settlement = self.enqueue(request_id(&calls), calls);
        async move { Ok(settlement.await?.into_outcomes()) }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Returns `true` once the queue task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchHandle")
            .field("state", &self.scheduler_state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Future returned by [`BatchHandle::enqueue`].
#[derive(Debug)]
#[must_use = "dropping a Settlement discards the result"]
pub struct Settlement {
    rx: Option<oneshot::Receiver<Result<ReadData, BatchError>>>,
}

impl Future for Settlement {
    type Output = Result<ReadData, BatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().rx.as_mut() {
            None => Poll::Ready(Err(BatchError::QueueClosed)),
            Some(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(BatchError::Abandoned))),
        }
    }
}
