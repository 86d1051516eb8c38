use axum::{
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL,
        },
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Cache presets, one per route freshness class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// live server status
    PublicFast,
    /// public settings
    PublicShort,
    /// version
    PublicMedium,
    /// proxied static assets
    PublicHour,
    NoCache,
}

impl CachePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CachePolicy::PublicFast => "public, s-maxage=1, stale-while-revalidate=2",
            CachePolicy::PublicShort => "public, s-maxage=5, stale-while-revalidate=10",
            CachePolicy::PublicMedium => "public, s-maxage=60, stale-while-revalidate=300",
            CachePolicy::PublicHour => "public, max-age=3600",
            CachePolicy::NoCache => "no-cache",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Cors {
    pub methods: &'static str,
    pub headers: &'static str,
}

pub const CORS_GET: Cors = Cors {
    methods: "GET",
    headers: "Content-Type",
};
pub const CORS_GET_PREFLIGHT: Cors = Cors {
    methods: "GET, OPTIONS",
    headers: "Content-Type",
};
pub const CORS_RPC: Cors = Cors {
    methods: "POST",
    headers: "Content-Type, Authorization",
};
pub const CORS_RPC_PREFLIGHT: Cors = Cors {
    methods: "POST, OPTIONS",
    headers: "Content-Type, Authorization",
};

pub fn decorate(mut res: Response, cors: Cors, cache: Option<CachePolicy>) -> Response {
    let headers = res.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(cors.methods),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(cors.headers),
    );
    if let Some(cache) = cache {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(cache.as_str()));
    }
    res
}

pub fn json<T: Serialize>(
    status: StatusCode,
    body: &T,
    cors: Cors,
    cache: Option<CachePolicy>,
) -> Response {
    decorate((status, Json(body)).into_response(), cors, cache)
}

/// `{status: "success", message: "", data}`
pub fn success_envelope(data: Value) -> Value {
    json!({ "status": "success", "message": "", "data": data })
}

/// `{error: message}`
pub fn json_error(
    message: &str,
    status: StatusCode,
    cors: Cors,
    cache: Option<CachePolicy>,
) -> Response {
    json(status, &json!({ "error": message }), cors, cache)
}

pub fn text(status: StatusCode, body: &'static str, cors: Cors) -> Response {
    decorate((status, body).into_response(), cors, None)
}

pub fn preflight(cors: Cors) -> Response {
    decorate(StatusCode::OK.into_response(), cors, None)
}
