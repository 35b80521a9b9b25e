//! Caller-facing read bindings.
//!
//! A [`ReadBinding`] represents one logical read (a single call or an ordered
//! list of calls) and its lifecycle:
//!
//! ```text
//! Idle ──submit──▶ Loading ──settled Ok──▶ Success
//!                     ▲    └─settled Err─▶ Error
//!                     └── reissue() / identity change ──┘
//! ```
//!
//! Only the most recent submission may update the state. A result for a
//! superseded submission is dropped when it arrives.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use chainbatch_core::{BatchError, CallSet, CallSpec, ReadData};

use crate::pending::request_id;
use crate::queue::BatchHandle;

/// Lifecycle of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Not submitted: disabled, or an identity field is unresolved.
    Idle,
    Loading,
    Success,
    /// The request itself failed (queue gone, or a reported transport failure).
    Error,
}

impl std::fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Observable state of a binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadState {
    pub status: ReadStatus,
    /// Last settled data; kept while a new submission is loading.
    pub data: Option<ReadData>,
    pub error: Option<BatchError>,
}

impl ReadState {
    fn idle() -> Self {
        Self {
            status: ReadStatus::Idle,
            data: None,
            error: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == ReadStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == ReadStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == ReadStatus::Error
    }
}

/// What a binding reads.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadTarget {
    /// One call; `None` while its destination is not known yet.
    Single(Option<CallSpec>),
    Multiple(Vec<CallSpec>),
}

impl ReadTarget {
    /// Identity of the target: the keys of its calls. Changing anything that
    /// affects a key changes the identity; changing the caller does not.
    pub fn identity(&self) -> Option<String> {
        match self {
            Self::Single(None) => None,
            Self::Single(Some(call)) => Some(call.key().to_string()),
            Self::Multiple(calls) => {
                let keys: Vec<String> = calls.iter().map(|c| c.key().to_string()).collect();
                Some(keys.join("|"))
            }
        }
    }

    /// The calls to submit, or `None` if any call is unresolved.
    fn call_set(&self) -> Option<CallSet> {
        match self {
            Self::Single(Some(call)) if call.is_resolved() => Some(CallSet::Single(call.clone())),
            Self::Single(_) => None,
            Self::Multiple(calls) if calls.iter().all(CallSpec::is_resolved) => {
                Some(CallSet::Multiple(calls.clone()))
            }
            Self::Multiple(_) => None,
        }
    }
}

/// Caching hints. Stored and exposed, never acted on by the binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryHints {
    pub stale_time: Option<Duration>,
    pub gc_time: Option<Duration>,
    pub refetch_interval: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// A disabled binding stays `Idle` and never enqueues.
    pub enabled: bool,
    pub hints: QueryHints,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            hints: QueryHints::default(),
        }
    }
}

impl ReadOptions {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn with_hints(mut self, hints: QueryHints) -> Self {
        self.hints = hints;
        self
    }
}

struct Submission {
    target: ReadTarget,
    options: ReadOptions,
    identity: Option<String>,
    generation: u64,
}

struct BindingInner {
    handle: BatchHandle,
    submission: Mutex<Submission>,
    state: watch::Sender<ReadState>,
}

impl BindingInner {
    fn lock(&self) -> MutexGuard<'_, Submission> {
        self.submission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, generation: u64, result: Result<ReadData, BatchError>) {
        let submission = self.lock();
        if submission.generation != generation {
            tracing::trace!(
                generation,
                current = submission.generation,
                "discarding result of superseded submission"
            );
            return;
        }
        self.state.send_modify(|state| match result {
            Ok(data) => {
                state.status = ReadStatus::Success;
                state.data = Some(data);
                state.error = None;
            }
            Err(e) => {
                state.status = ReadStatus::Error;
                state.data = None;
                state.error = Some(e);
            }
        });
    }
}

/// Handle for one logical read. Cheap to clone; clones share state.
///
/// Must be created and driven from within a Tokio runtime.
#[derive(Clone)]
pub struct ReadBinding {
    inner: Arc<BindingInner>,
}

impl ReadBinding {
    /// Create a binding and submit it right away if it is enabled and resolved.
    pub fn new(handle: BatchHandle, target: ReadTarget, options: ReadOptions) -> Self {
        let (state, _) = watch::channel(ReadState::idle());
        let identity = target.identity();
        let binding = Self {
            inner: Arc::new(BindingInner {
                handle,
                submission: Mutex::new(Submission {
                    target,
                    options,
                    identity,
                    generation: 0,
                }),
                state,
            }),
        };
        binding.submit();
        binding
    }

    pub fn state(&self) -> ReadState {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> ReadStatus {
        self.inner.state.borrow().status
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<ReadState> {
        self.inner.state.subscribe()
    }

    /// Value of a single read, if it settled with one.
    pub fn value(&self) -> Option<Value> {
        self.inner.state.borrow().data.as_ref()?.value().cloned()
    }

    /// Per-position values of the last settlement.
    pub fn values(&self) -> Option<Vec<Option<Value>>> {
        self.inner.state.borrow().data.as_ref().map(ReadData::values)
    }

    pub fn target(&self) -> ReadTarget {
        self.inner.lock().target.clone()
    }

    pub fn options(&self) -> ReadOptions {
        self.inner.lock().options.clone()
    }

    /// Replace the target. Resubmits only if its identity changed; the
    /// pending submission for the old identity is abandoned.
    pub fn update(&self, target: ReadTarget) {
        let changed = {
            let mut submission = self.inner.lock();
            let identity = target.identity();
            submission.target = target;
            if submission.identity == identity {
                false
            } else {
                submission.identity = identity;
                true
            }
        };
        if changed {
            self.submit();
        }
    }

    /// Enable or disable the binding. Disabling abandons a pending submission.
    pub fn set_enabled(&self, enabled: bool) {
        let changed = {
            let mut submission = self.inner.lock();
            let changed = submission.options.enabled != enabled;
            submission.options.enabled = enabled;
            changed
        };
        if changed {
            self.submit();
        }
    }

    /// Resubmit unconditionally.
    pub fn reissue(&self) {
        self.submit();
    }

    /// Wait until the current submission is no longer loading.
    pub async fn settled(&self) -> ReadState {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|state| !state.is_loading()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    fn submit(&self) {
        let mut submission = self.inner.lock();
        submission.generation += 1;
        let generation = submission.generation;

        let calls = if submission.options.enabled {
            submission.target.call_set()
        } else {
            None
        };
        let Some(calls) = calls else {
            self.inner.state.send_modify(|state| {
                state.status = ReadStatus::Idle;
                state.error = None;
            });
            return;
        };

        self.inner.state.send_modify(|state| {
            state.status = ReadStatus::Loading;
            state.error = None;
        });
        let settlement = self.inner.handle.enqueue(request_id(&calls), calls);
        drop(submission);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = settlement.await;
            inner.settle(generation, result);
        });
    }
}

impl std::fmt::Debug for ReadBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadBinding")
            .field("status", &self.status())
            .field("target", &self.target())
            .finish()
    }
}

impl BatchHandle {
    pub fn bind(&self, target: ReadTarget, options: ReadOptions) -> ReadBinding {
        ReadBinding::new(self.clone(), target, options)
    }

    /// Bind a single read. `None` keeps the binding idle until a call is set.
    pub fn bind_single(&self, call: Option<CallSpec>, options: ReadOptions) -> ReadBinding {
        self.bind(ReadTarget::Single(call), options)
    }

    pub fn bind_multiple(&self, calls: Vec<CallSpec>, options: ReadOptions) -> ReadBinding {
        self.bind(ReadTarget::Multiple(calls), options)
    }
}
