//! chainbatch-engine: coalesce independent reads into bulk upstream calls.
//!
//! Callers enqueue reads through a [`BatchHandle`] (directly, or through a
//! [`ReadBinding`] that tracks a lifecycle state). A single [`RequestQueue`]
//! task debounces arrivals, deduplicates equivalent calls, issues one bulk
//! call per flush and fans the results back out.
//!
//! # Quick start
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainbatch_core::{BatchConfig, CallSpec, JsonRpcMulticall, RpcTransport};
//! use chainbatch_engine::{ReadOptions, RequestQueue};
//!
//! # async fn demo(rpc: Arc<dyn RpcTransport>) {
//! let handle = RequestQueue::spawn(Arc::new(JsonRpcMulticall::new(rpc)), BatchConfig::default());
//!
//! // Two reads of the same value share one upstream call.
//! let call = CallSpec::new("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045", "eth_getBalance", vec!["latest".into()], 1);
//! let (a, b) = tokio::join!(handle.read_one(call.clone()), handle.read_one(call.clone()));
//!
//! let binding = handle.bind_single(Some(call), ReadOptions::default());
//! let state = binding.settled().await;
//! # }
//! ```

pub mod binding;
pub mod dedup;
pub mod dispatch;
pub mod pending;
pub mod queue;
pub mod stats;

pub use binding::{QueryHints, ReadBinding, ReadOptions, ReadState, ReadStatus, ReadTarget};
pub use dedup::{Attachment, DedupPlan, InFlightCache, Slot};
pub use dispatch::{BatchDispatcher, Dispatched, PartialAttachment};
pub use pending::PendingRequest;
pub use queue::{BatchHandle, RequestQueue, SchedulerState, Settlement};
pub use stats::{BatchStats, StatsSnapshot};
