//! Minimal JSON-RPC2 over HTTP POST.
//!
//! One best-effort call per invocation: no retry, no backoff and no timeout other
//! than whatever the shared `reqwest::Client` was built with.

use crate::core::error::{UpstreamError, UpstreamResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

pub const JSONRPC_VERSION: &str = "2.0";
pub const RPC2_PATH: &str = "api/rpc2";

// standard JSON-RPC2 codes used by the proxy
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<P>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A failure envelope, as sent back to proxy callers.
#[derive(Debug, Serialize)]
pub struct RpcFailure {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub error: RpcErrorObject,
}

impl RpcFailure {
    pub fn new(id: Value, code: i64, message: impl Into<String>) -> Self {
        RpcFailure {
            jsonrpc: JSONRPC_VERSION,
            id,
            error: RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            },
        }
    }
}

/// Joins `base` and `path` with exactly one slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RpcClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        RpcClient {
            http,
            endpoint: join_url(base_url, RPC2_PATH),
            api_key,
        }
    }

    /// Calls `method` and returns its `result`.
    pub async fn call<T, P>(&self, method: &str, params: Option<P>) -> UpstreamResult<T>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: Uuid::new_v4().to_string(),
            method,
            params,
        };
        debug!(method, id = %request.id, "rpc2 call");
        let payload = self.post(&request).await?;
        into_result(method, payload)
    }

    /// Sends an envelope built elsewhere and hands back the raw response body.
    pub async fn forward(&self, envelope: &Value) -> UpstreamResult<Value> {
        self.post(envelope).await
    }

    async fn post<B: Serialize + ?Sized>(&self, body: &B) -> UpstreamResult<Value> {
        let mut req = self.http.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(UpstreamError::Http(res.status()));
        }
        let bytes = res.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn into_result<T: DeserializeOwned>(method: &str, mut payload: Value) -> UpstreamResult<T> {
    if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
        let error: RpcErrorObject = serde_json::from_value(error.clone())?;
        return Err(UpstreamError::Rpc {
            method: method.to_string(),
            code: error.code,
            message: error.message,
        });
    }
    let result = payload
        .get_mut("result")
        .map(Value::take)
        .unwrap_or(Value::Null);
    Ok(serde_json::from_value(result)?)
}
