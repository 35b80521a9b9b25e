//! Transport traits: the bulk "execute many reads" seam and the JSON-RPC
//! transport it is usually built on.

use async_trait::async_trait;

use crate::call::CallSpec;
use crate::error::TransportError;
use crate::outcome::CallOutcome;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Upstream bulk execution with partial failure.
///
/// `execute` runs every call in one round trip and returns one outcome per
/// call, in input order. A call the upstream rejects is reported as
/// [`CallOutcome::Failure`] and must not affect the others; `Err` is reserved
/// for failures of the bulk call as a whole.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn MulticallTransport>`.
#[async_trait]
pub trait MulticallTransport: Send + Sync + 'static {
    async fn execute(&self, calls: &[CallSpec]) -> Result<Vec<CallOutcome>, TransportError>;

    /// Identifier used in logs (URL or name).
    fn name(&self) -> &str;
}

/// A JSON-RPC 2.0 transport.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Send a batch of JSON-RPC requests.
    ///
    /// Default implementation sends them sequentially; override for true batching.
    async fn send_batch(
        &self,
        reqs: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        let mut responses = Vec::with_capacity(reqs.len());
        for req in reqs {
            responses.push(self.send(req).await?);
        }
        Ok(responses)
    }

    /// Return the transport's identifier (URL or name).
    fn url(&self) -> &str;
}
