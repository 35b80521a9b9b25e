//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! A bulk read is sent as one JSON array in one HTTP request. The client
//! never retries; a failed request is reported to the caller as is.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainbatch_core::error::TransportError;
use chainbatch_core::request::{JsonRpcRequest, JsonRpcResponse};
use chainbatch_core::transport::RpcTransport;

/// Configuration for `HttpRpcClient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_request_timeout", with = "millis")]
    pub request_timeout: Duration,
    /// Extra headers sent with every request (e.g. an API key).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            headers: HashMap::new(),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// HTTP JSON-RPC client for one endpoint.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
}

impl HttpRpcClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let headers = header_map(&config.headers)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpClientConfig::default())
    }

    /// POST `body` and return the raw response body of a 2xx reply.
    async fn post<B: Serialize + ?Sized>(&self, body: &B) -> Result<String, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        resp.text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }
}

/// Decode the reply to a batch request. Servers that reject the batch as a
/// whole answer with one error object instead of an array.
fn decode_batch(body: &str) -> Result<Vec<JsonRpcResponse>, TransportError> {
    let value: Value = serde_json::from_str(body)?;
    if value.is_array() {
        return Ok(serde_json::from_value(value)?);
    }
    let resp: JsonRpcResponse = serde_json::from_value(value)?;
    match resp.error {
        Some(err) => Err(TransportError::Rpc(err)),
        None => Err(TransportError::Other(
            "batch request answered with a single response".into(),
        )),
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Other(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Other(format!("invalid value for header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        tracing::trace!(url = %self.url, method = %req.method, "sending request");
        let body = self.post(&req).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// True HTTP batch: send all requests as a JSON array in one HTTP call.
    async fn send_batch(
        &self,
        reqs: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        tracing::debug!(url = %self.url, size = reqs.len(), "sending batch");
        let body = self.post(&reqs).await?;
        decode_batch(&body)
    }

    fn url(&self) -> &str {
        &self.url
    }
}
