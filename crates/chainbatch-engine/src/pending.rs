//! A queued unit of work and its completion handle.

use tokio::sync::oneshot;
use tokio::time::Instant;

use chainbatch_core::{BatchError, CallSet, ReadData, ReadOutcome, RequestKind};

/// Diagnostic label for a request: the call's key, or the operation names of
/// a multiple request.
pub fn request_id(calls: &CallSet) -> String {
    match calls {
        CallSet::Single(call) => call.key().to_string(),
        CallSet::Multiple(calls) => {
            let ops: Vec<&str> = calls.iter().map(|c| c.operation.as_str()).collect();
            format!("batch-{}", ops.join("-"))
        }
    }
}

pub(crate) type Completion = oneshot::Sender<Result<ReadData, BatchError>>;

/// Calls waiting to be flushed, plus the handle their caller awaits.
///
/// The completion is consumed on settlement, so a request settles at most
/// once. Dropping an unsettled request makes its caller see
/// [`BatchError::Abandoned`].
#[derive(Debug)]
pub struct PendingRequest {
    /// Caller-supplied label, not required to be unique.
    pub id: String,
    pub calls: CallSet,
    pub enqueued_at: Instant,
    /// Per-position outcomes already answered by an earlier flush. Empty
    /// unless the request arrived while some of its calls were in flight.
    pub(crate) carried: Vec<Option<ReadOutcome>>,
    completion: Completion,
}

impl PendingRequest {
    pub(crate) fn new(
        id: String,
        calls: CallSet,
    ) -> (Self, oneshot::Receiver<Result<ReadData, BatchError>>) {
        let (tx, rx) = oneshot::channel();
        let req = Self {
            id,
            calls,
            enqueued_at: Instant::now(),
            carried: Vec::new(),
            completion: tx,
        };
        (req, rx)
    }

    pub fn kind(&self) -> RequestKind {
        self.calls.kind()
    }

    /// Outcome for `position` answered by an earlier flush, if any.
    pub(crate) fn carried(&self, position: usize) -> Option<&ReadOutcome> {
        self.carried.get(position).and_then(Option::as_ref)
    }

    /// Settle the request. A caller that stopped waiting is ignored.
    pub fn settle(self, result: Result<ReadData, BatchError>) {
        if self.completion.send(result).is_err() {
            tracing::trace!(id = %self.id, "caller stopped waiting; settlement dropped");
        }
    }
}
