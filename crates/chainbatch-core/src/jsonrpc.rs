//! [`MulticallTransport`] over a JSON-RPC 2.0 batch.
//!
//! Every bulk call becomes one JSON-RPC batch request. Responses are matched
//! back to calls by id, so servers that reply out of order are handled. An
//! error object in a response fails that call only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::call::CallSpec;
use crate::error::TransportError;
use crate::outcome::CallOutcome;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::{MulticallTransport, RpcTransport};

/// Maps a call to a JSON-RPC `(method, params)` pair.
pub trait CallEncoder: Send + Sync + 'static {
    fn encode(&self, call: &CallSpec) -> (String, Vec<Value>);
}

/// `method = operation`, `params = [destination, arguments...]`.
///
/// Fits account-scoped node methods such as
/// `eth_getBalance(address, "latest")`. Contract reads that need ABI encoding
/// plug in their own [`CallEncoder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DestinationFirst;

impl CallEncoder for DestinationFirst {
    fn encode(&self, call: &CallSpec) -> (String, Vec<Value>) {
        let mut params = Vec::with_capacity(call.arguments.len() + 1);
        params.push(Value::String(call.destination.clone()));
        params.extend(call.arguments.iter().cloned());
        (call.operation.clone(), params)
    }
}

/// Bulk transport sending each bulk call as one JSON-RPC batch.
pub struct JsonRpcMulticall {
    rpc: Arc<dyn RpcTransport>,
    encoder: Arc<dyn CallEncoder>,
    next_id: AtomicU64,
}

impl JsonRpcMulticall {
    /// Wrap `rpc` using the [`DestinationFirst`] encoding.
    pub fn new(rpc: Arc<dyn RpcTransport>) -> Self {
        Self::with_encoder(rpc, Arc::new(DestinationFirst))
    }

    pub fn with_encoder(rpc: Arc<dyn RpcTransport>, encoder: Arc<dyn CallEncoder>) -> Self {
        Self {
            rpc,
            encoder,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl MulticallTransport for JsonRpcMulticall {
    async fn execute(&self, calls: &[CallSpec]) -> Result<Vec<CallOutcome>, TransportError> {
        if calls.is_empty() {
            return Ok(vec![]);
        }

        let base = self.next_id.fetch_add(calls.len() as u64, Ordering::Relaxed);
        let reqs: Vec<JsonRpcRequest> = calls
            .iter()
            .enumerate()
            .map(|(i, call)| {
                let (method, params) = self.encoder.encode(call);
                JsonRpcRequest::new(base + i as u64, method, params)
            })
            .collect();

        tracing::debug!(calls = reqs.len(), url = %self.rpc.url(), "sending JSON-RPC batch");
        let responses = self.rpc.send_batch(reqs).await?;

        let mut by_id: HashMap<u64, JsonRpcResponse> = responses
            .into_iter()
            .filter_map(|resp| resp.id.as_u64().map(|id| (id, resp)))
            .collect();

        let outcomes = (0..calls.len() as u64)
            .map(|i| match by_id.remove(&(base + i)) {
                Some(resp) => resp.into_outcome(),
                None => CallOutcome::Failure(format!("no response for request id {}", base + i)),
            })
            .collect();
        Ok(outcomes)
    }

    fn name(&self) -> &str {
        self.rpc.url()
    }
}
