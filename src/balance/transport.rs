//! JSON-RPC transport to blockchain nodes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every POST carries a single request, so the id never needs to vary.
pub const REQUEST_ID: u64 = 1;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id: REQUEST_ID,
        }
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    /// Collapse into the `result` value or the matching [`RpcError`].
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(error) = self.error {
            return Err(RpcError::Rpc { code: error.code, message: error.message });
        }
        self.result.ok_or_else(|| RpcError::Malformed("missing result".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Sends one JSON-RPC request to one endpoint and returns its `result`.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, url: &str, request: &JsonRpcRequest) -> Result<Value, RpcError>;
}

#[cfg(feature = "native")]
pub use http::HttpTransport;

#[cfg(feature = "native")]
mod http {
    use super::*;
    use std::time::Duration;

    /// HTTPS POST transport over reqwest.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
    }

    impl HttpTransport {
        pub fn new(timeout: Duration) -> Result<Self, RpcError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| RpcError::Transport(format!("client: {e}")))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl RpcTransport for HttpTransport {
        async fn call(&self, url: &str, request: &JsonRpcRequest) -> Result<Value, RpcError> {
            let response = self
                .client
                .post(url)
                .json(request)
                .send()
                .await
                .map_err(|e| RpcError::Transport(e.to_string()))?;

            if !response.status().is_success() {
                return Err(RpcError::Status(response.status().as_u16()));
            }

            let body: JsonRpcResponse = response
                .json()
                .await
                .map_err(|e| RpcError::Malformed(e.to_string()))?;
            body.into_result()
        }
    }
}
