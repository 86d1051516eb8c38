//! Status-page backend for a Komari monitoring server.
//!
//! Routes, all under `/api`:
//!
//! - `GET /servers`: node list + latest status, normalized to `{updated, servers}`.
//! - `GET /public`, `GET /version`: pass-through of the upstream settings.
//! - `POST /rpc2`: JSON-RPC2 proxy.
//! - `GET /rpc2/ws`: where to connect for websocket RPC2.
//! - `GET /favicon`: proxied site icon.

pub mod config;
pub mod core;
pub mod handler;
