use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong talking to the monitoring backend.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    #[error("upstream HTTP {0}")]
    Http(StatusCode),
    #[error("RPC2 {method} error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected upstream payload: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;
