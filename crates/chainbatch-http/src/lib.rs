//! chainbatch-http: JSON-RPC over HTTP for ChainBatch.
//!
//! [`HttpRpcClient`] implements [`chainbatch_core::RpcTransport`]; wrap it in
//! [`chainbatch_core::JsonRpcMulticall`] to use it as the upstream of a
//! batch queue.

pub mod client;

pub use client::{HttpClientConfig, HttpRpcClient};
