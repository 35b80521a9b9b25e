//! chainbatch-core: call identity, outcomes and transport traits for ChainBatch.
//!
//! # Overview
//!
//! ChainBatch coalesces many independent single-value reads into one bulk
//! upstream round trip. The core crate defines:
//!
//! - [`CallSpec`] / [`BatchKey`]: a read and its canonical identity
//! - [`CallOutcome`] / [`ReadOutcome`] / [`ReadData`]: per-call results
//! - [`MulticallTransport`]: the allow-partial-failure bulk execute seam
//! - [`JsonRpcMulticall`]: bulk execute over a JSON-RPC batch
//! - [`NetworkRouter`]: per-network fan-out of a bulk call
//! - [`BatchConfig`]: debounce window, timeout and failure mode

pub mod call;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod outcome;
pub mod request;
pub mod router;
pub mod transport;

pub use call::{BatchKey, CallSet, CallSpec, Network, RequestKind};
pub use config::BatchConfig;
pub use error::{BatchError, TransportError};
pub use jsonrpc::{CallEncoder, DestinationFirst, JsonRpcMulticall};
pub use outcome::{CallOutcome, FailureMode, ReadData, ReadOutcome};
pub use request::{JsonRpcRequest, JsonRpcResponse, RpcId};
pub use router::NetworkRouter;
pub use transport::{MulticallTransport, RpcTransport};
