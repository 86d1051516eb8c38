use crate::config::Bootstrap;
use crate::core::api::{fetch_json, KomariClient, UpstreamMode};
use crate::core::collector::Collector;
use crate::core::doctor::Doctor;
use crate::core::error::{UpstreamError, UpstreamResult};
use crate::core::rpc::{RpcFailure, INTERNAL_ERROR, INVALID_REQUEST, JSONRPC_VERSION, PARSE_ERROR};
use crate::handler::response::*;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

pub struct AppState {
    pub config: Arc<Bootstrap>,
    pub http: reqwest::Client,
    pub collector: Option<Collector>,
}

impl AppState {
    pub fn new(config: Bootstrap, http: reqwest::Client) -> AppState {
        let collector = config.komari.base_url.as_deref().map(|base_url| {
            Collector::new(
                KomariClient::new(http.clone(), base_url, config.komari.api_key.clone()),
                Doctor::new(config.komari.online_policy),
                config.komari.mode,
            )
        });
        AppState {
            config: Arc::new(config),
            http,
            collector,
        }
    }

    fn komari(&self) -> UpstreamResult<&Collector> {
        self.collector
            .as_ref()
            .ok_or(UpstreamError::NotConfigured("KOMARI_BASE_URL"))
    }
}

pub async fn servers(State(state): State<Arc<AppState>>) -> Response {
    match fetch_servers(&state).await {
        Ok(body) => json(StatusCode::OK, &body, CORS_GET, Some(CachePolicy::PublicFast)),
        Err(e) => {
            error!("API proxy error: {}", e);
            json_error(
                "Failed to fetch server status",
                StatusCode::INTERNAL_SERVER_ERROR,
                CORS_GET,
                Some(CachePolicy::NoCache),
            )
        }
    }
}

async fn fetch_servers(state: &AppState) -> UpstreamResult<Value> {
    if let Some(collector) = &state.collector {
        let stats = collector.collect(Utc::now()).await?;
        return Ok(serde_json::to_value(stats)?);
    }
    match &state.config.legacy_backend_url {
        Some(url) => fetch_json(&state.http, url).await,
        None => Err(UpstreamError::NotConfigured("KOMARI_BASE_URL")),
    }
}

// RPC answers get the REST envelope so the frontend sees one shape
async fn fetch_public(state: &AppState) -> UpstreamResult<Value> {
    let komari = state.komari()?;
    match komari.mode() {
        UpstreamMode::Rpc2 => Ok(success_envelope(komari.client().get_public_info().await?)),
        UpstreamMode::Rest => komari.client().rest_public().await,
    }
}

async fn fetch_version(state: &AppState) -> UpstreamResult<Value> {
    let komari = state.komari()?;
    match komari.mode() {
        UpstreamMode::Rpc2 => Ok(success_envelope(komari.client().get_version().await?)),
        UpstreamMode::Rest => komari.client().rest_version().await,
    }
}

pub async fn public(State(state): State<Arc<AppState>>) -> Response {
    match fetch_public(&state).await {
        Ok(body) => json(StatusCode::OK, &body, CORS_GET, Some(CachePolicy::PublicShort)),
        Err(e) => {
            error!("Proxy /api/public error: {}", e);
            json_error(
                "Failed to fetch public settings",
                StatusCode::INTERNAL_SERVER_ERROR,
                CORS_GET,
                None,
            )
        }
    }
}

pub async fn version(State(state): State<Arc<AppState>>) -> Response {
    match fetch_version(&state).await {
        Ok(body) => json(StatusCode::OK, &body, CORS_GET, Some(CachePolicy::PublicMedium)),
        Err(e) => {
            error!("Proxy /api/version error: {}", e);
            json_error(
                "Failed to fetch version",
                StatusCode::INTERNAL_SERVER_ERROR,
                CORS_GET,
                None,
            )
        }
    }
}

fn rpc_failure(status: StatusCode, id: Value, code: i64, message: impl Into<String>) -> Response {
    json(status, &RpcFailure::new(id, code, message), CORS_RPC, None)
}

/// Passes a JSON-RPC2 envelope through to the upstream and returns its answer verbatim.
pub async fn rpc2(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let envelope: Value = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(_) => return rpc_failure(StatusCode::BAD_REQUEST, Value::Null, PARSE_ERROR, "Parse error"),
    };
    let id = envelope.get("id").cloned().unwrap_or(Value::Null);
    let valid = envelope.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
        && envelope
            .get("method")
            .and_then(Value::as_str)
            .map_or(false, |m| !m.is_empty());
    if !valid {
        return rpc_failure(StatusCode::BAD_REQUEST, id, INVALID_REQUEST, "Invalid Request");
    }

    let result = match state.komari() {
        Ok(komari) => komari.client().rpc().forward(&envelope).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(answer) => json(StatusCode::OK, &answer, CORS_RPC, None),
        Err(UpstreamError::Http(status)) => rpc_failure(
            status,
            id,
            INTERNAL_ERROR,
            format!("Upstream error: {}", status),
        ),
        Err(e) => {
            error!("RPC2 proxy error: {}", e);
            rpc_failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                Value::Null,
                INTERNAL_ERROR,
                "Internal error",
            )
        }
    }
}

pub async fn rpc2_preflight() -> Response {
    preflight(CORS_RPC_PREFLIGHT)
}

#[derive(Debug, Error)]
pub enum WsUrlError {
    #[error("KOMARI_BASE_URL not configured")]
    NotConfigured,
    #[error("invalid base url: {0}")]
    Parse(#[from] url::ParseError),
    #[error("cannot use scheme {0} for websocket")]
    Scheme(String),
}

fn set_param(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match pairs.iter().position(|(k, _)| k == key) {
        Some(i) => {
            pairs[i].1 = value.to_string();
            let mut seen = 0;
            pairs.retain(|(k, _)| {
                if k == key {
                    seen += 1;
                    seen == 1
                } else {
                    true
                }
            });
        }
        None => pairs.push((key.to_string(), value.to_string())),
    }
}

/// The upstream websocket endpoint the browser should dial: `https` becomes `wss`,
/// anything else `ws`; incoming query parameters are kept and the API key rides along
/// as `token`.
pub fn build_ws_url(
    base_url: Option<&str>,
    api_key: Option<&str>,
    params: &[(String, String)],
) -> Result<String, WsUrlError> {
    let base_url = base_url.ok_or(WsUrlError::NotConfigured)?;
    let mut url = url::Url::parse(base_url)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| WsUrlError::Scheme(url.scheme().to_string()))?;
    let path = format!("{}/api/rpc2/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    let mut pairs = Vec::new();
    for (key, value) in params {
        set_param(&mut pairs, key, value);
    }
    if let Some(key) = api_key {
        set_param(&mut pairs, "token", key);
    }
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs.iter());
    }
    Ok(url.to_string())
}

pub async fn rpc2_ws(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let komari = &state.config.komari;
    match build_ws_url(komari.base_url.as_deref(), komari.api_key.as_deref(), &params) {
        Ok(ws_url) => json(
            StatusCode::OK,
            &json!({
                "ws_url": ws_url,
                "message": "WebSocket proxy endpoint. Connect to the ws_url for WebSocket RPC2 communication."
            }),
            CORS_GET,
            None,
        ),
        Err(e) => {
            error!("WebSocket proxy error: {}", e);
            json_error(
                "Failed to setup WebSocket proxy",
                StatusCode::INTERNAL_SERVER_ERROR,
                CORS_GET,
                None,
            )
        }
    }
}

pub async fn ws_preflight() -> Response {
    preflight(CORS_GET_PREFLIGHT)
}

pub async fn favicon(State(state): State<Arc<AppState>>) -> Response {
    let url = match &state.config.favicon_url {
        Some(url) => url,
        None => return text(StatusCode::NOT_FOUND, "FAVICON_URL not configured", CORS_GET),
    };
    let res = match state.http.get(url).send().await {
        Ok(res) => res,
        Err(e) => {
            error!("favicon fetch error: {}", e);
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Favicon proxy error", CORS_GET);
        }
    };
    if !res.status().is_success() {
        return text(StatusCode::BAD_GATEWAY, "Failed to fetch favicon", CORS_GET);
    }
    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("image/x-icon"));
    match res.bytes().await {
        Ok(bytes) => {
            let mut out = (StatusCode::OK, bytes).into_response();
            out.headers_mut().insert(CONTENT_TYPE, content_type);
            out.headers_mut().insert(
                CACHE_CONTROL,
                HeaderValue::from_static(CachePolicy::PublicHour.as_str()),
            );
            decorate(out, CORS_GET, None)
        }
        Err(e) => {
            error!("favicon read error: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Favicon proxy error", CORS_GET)
        }
    }
}
