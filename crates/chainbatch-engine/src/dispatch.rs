//! One bulk upstream call per flush, and the fan-out of its results.
//!
//! The dispatcher owns the [`InFlightCache`]. Whatever goes wrong upstream
//! (an error, a timeout, a short result list, a panic inside the transport)
//! is contained here and turned into one uniform outcome for every request
//! of the flush.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};

use chainbatch_core::{
    BatchConfig, BatchError, CallOutcome, CallSpec, FailureMode, MulticallTransport, ReadData,
    ReadOutcome, TransportError,
};

use crate::dedup::{Attachment, DedupPlan, InFlightCache, Slot};
use crate::pending::PendingRequest;
use crate::stats::BatchStats;

/// Result of one bulk upstream call.
pub type Dispatched = Result<Vec<CallOutcome>, TransportError>;

/// A mid-flush arrival with some calls in flight, and the in-flight index
/// answering each such position.
pub type PartialAttachment = (PendingRequest, Vec<Option<usize>>);

pub struct BatchDispatcher {
    transport: Arc<dyn MulticallTransport>,
    cache: InFlightCache,
    failure_mode: FailureMode,
    timeout: Duration,
    timeout_ms: u64,
    stats: Arc<BatchStats>,
}

impl BatchDispatcher {
    pub fn new(
        transport: Arc<dyn MulticallTransport>,
        config: &BatchConfig,
        stats: Arc<BatchStats>,
    ) -> Self {
        Self {
            transport,
            cache: InFlightCache::new(),
            failure_mode: config.failure_mode,
            timeout: config.request_timeout(),
            timeout_ms: config.request_timeout_ms,
            stats,
        }
    }

    /// Plan a flush of `requests`; their keys are in flight until
    /// [`demultiplex`](Self::demultiplex).
    pub fn dedupe(&mut self, requests: &[PendingRequest]) -> DedupPlan {
        let plan = self.cache.dedupe(requests);
        self.stats.record_flush(&plan);
        plan
    }

    /// Route a mid-flush arrival onto the in-flight call where possible.
    pub fn attach(&mut self, plan: &mut DedupPlan, request: &PendingRequest) -> Attachment {
        let attachment = self.cache.attach(plan, request);
        match &attachment {
            Attachment::Full => {
                self.stats.record_attached();
                tracing::debug!(id = %request.id, "request attached to in-flight call");
            }
            Attachment::Partial(in_flight) => {
                self.stats.record_attached();
                tracing::debug!(
                    id = %request.id,
                    reused = in_flight.iter().flatten().count(),
                    "request partially attached to in-flight call"
                );
            }
            Attachment::Detached => {}
        }
        attachment
    }

    pub fn in_flight(&self) -> &InFlightCache {
        &self.cache
    }

    /// Issue the bulk call for `calls`.
    ///
    /// No upstream interaction happens for an empty list. The call runs in
    /// its own task so a panicking transport cannot take the queue down.
    pub fn dispatch(&self, calls: Vec<CallSpec>) -> BoxFuture<'static, Dispatched> {
        if calls.is_empty() {
            return future::ready(Ok(vec![])).boxed();
        }

        self.stats.record_upstream(calls.len());
        let transport = Arc::clone(&self.transport);
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms;
        tracing::debug!(calls = calls.len(), transport = %transport.name(), "dispatching bulk call");

        let task = tokio::spawn(async move {
            let expected = calls.len();
            let outcomes = tokio::time::timeout(timeout, transport.execute(&calls))
                .await
                .map_err(|_| TransportError::Timeout { ms: timeout_ms })??;
            if outcomes.len() != expected {
                return Err(TransportError::LengthMismatch {
                    expected,
                    actual: outcomes.len(),
                });
            }
            Ok(outcomes)
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(TransportError::Other(format!("transport task failed: {e}"))),
            }
        }
        .boxed()
    }

    /// Settle every request of the flush and release its in-flight keys.
    ///
    /// Partially attached requests take their in-flight results and are
    /// handed back for the next flush, unless the failure policy settles
    /// them now.
    pub fn demultiplex(
        &mut self,
        plan: &DedupPlan,
        requests: Vec<PendingRequest>,
        partial: Vec<PartialAttachment>,
        dispatched: Dispatched,
    ) -> Vec<PendingRequest> {
        self.cache.settle();
        debug_assert_eq!(plan.routing.len(), requests.len());

        match dispatched {
            Ok(outcomes) => {
                let outcomes: Vec<ReadOutcome> = outcomes
                    .into_iter()
                    .map(|o| o.normalize(self.failure_mode))
                    .collect();
                let answer = |i: usize| outcomes.get(i).cloned().unwrap_or(ReadOutcome::Empty);

                for (req, slots) in requests.into_iter().zip(&plan.routing) {
                    let per_position = slots
                        .iter()
                        .enumerate()
                        .map(|(pos, slot)| match slot {
                            Slot::Upstream(i) => answer(*i),
                            Slot::Unresolved => ReadOutcome::Empty,
                            Slot::Carried => req.carried(pos).cloned().unwrap_or(ReadOutcome::Empty),
                        })
                        .collect();
                    let kind = req.kind();
                    req.settle(Ok(ReadData::from_outcomes(kind, per_position)));
                }

                partial
                    .into_iter()
                    .map(|(mut req, in_flight)| {
                        req.carried = in_flight.into_iter().map(|idx| idx.map(answer)).collect();
                        req
                    })
                    .collect()
            }
            Err(e) => {
                self.stats.record_transport_failure();
                tracing::warn!(
                    error = %e,
                    requests = requests.len() + partial.len(),
                    calls = plan.unique_calls.len(),
                    "bulk call failed; settling batch"
                );
                let reason = e.to_string();
                match self.failure_mode {
                    FailureMode::Swallow => {
                        for req in requests {
                            let data = ReadData::empty(req.kind(), req.calls.len());
                            req.settle(Ok(data));
                        }
                        partial
                            .into_iter()
                            .map(|(mut req, in_flight)| {
                                req.carried = in_flight
                                    .into_iter()
                                    .map(|idx| idx.map(|_| ReadOutcome::Empty))
                                    .collect();
                                req
                            })
                            .collect()
                    }
                    FailureMode::Report => {
                        let failed = requests.into_iter().chain(partial.into_iter().map(|(req, _)| req));
                        for req in failed {
                            req.settle(Err(BatchError::Transport(reason.clone())));
                        }
                        Vec::new()
                    }
                }
            }
        }
    }
}
