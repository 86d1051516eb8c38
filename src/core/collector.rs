use crate::core::api::{KomariClient, UpstreamMode};
use crate::core::doctor::Doctor;
use crate::core::ent::*;
use crate::core::error::UpstreamResult;
use crate::core::normalize;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;

/// Produces the `{updated, servers}` snapshot from the upstream.
#[derive(Debug, Clone)]
pub struct Collector {
    client: KomariClient,
    dc: Doctor,
    mode: UpstreamMode,
}

impl Collector {
    pub fn new(client: KomariClient, dc: Doctor, mode: UpstreamMode) -> Collector {
        Collector { client, dc, mode }
    }

    pub fn client(&self) -> &KomariClient {
        &self.client
    }

    pub fn mode(&self) -> UpstreamMode {
        self.mode
    }

    pub async fn collect(&self, now: DateTime<Utc>) -> UpstreamResult<StatsResponse> {
        let servers = match self.mode {
            UpstreamMode::Rpc2 => self.collect_rpc(now).await?,
            UpstreamMode::Rest => self.collect_rest(now).await?,
        };
        tracing::debug!("collected {} servers", servers.len());
        Ok(StatsResponse {
            updated: now.timestamp(),
            servers,
        })
    }

    // a failed status batch leaves every node offline instead of failing the page
    async fn collect_rpc(&self, now: DateTime<Utc>) -> UpstreamResult<Vec<Server>> {
        let nodes = self.client.get_nodes(None).await?;
        let uuids: Vec<String> = nodes.iter().map(|n| n.uuid.clone()).collect();
        let statuses = match self.client.get_nodes_latest_status(&uuids).await {
            Ok(statuses) => statuses,
            Err(e) => {
                tracing::warn!("latest status unavailable, rendering nodes offline: {}", e);
                HashMap::new()
            }
        };
        Ok(normalize::merge(&nodes, &statuses, &self.dc, now))
    }

    // one recent-status request per node, all in flight at once
    async fn collect_rest(&self, now: DateTime<Utc>) -> UpstreamResult<Vec<Server>> {
        let nodes = self.client.rest_nodes().await?;
        let latest = join_all(nodes.iter().map(|node| self.latest_rest_status(node))).await;
        Ok(nodes
            .iter()
            .zip(latest.iter())
            .map(|(node, status)| normalize::to_server(node, status.as_ref(), &self.dc, now))
            .collect())
    }

    async fn latest_rest_status(&self, node: &KomariNode) -> Option<NodeStatus> {
        match self.client.rest_recent(&node.uuid).await {
            Ok(records) => records.into_iter().max_by_key(NodeStatus::timestamp),
            Err(e) => {
                tracing::warn!("recent status for {} failed: {}", node.uuid, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::doctor::OnlinePolicy;
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn collector(uri: &str, mode: UpstreamMode) -> Collector {
        Collector::new(
            KomariClient::new(reqwest::Client::new(), uri, None),
            Doctor::new(OnlinePolicy::Tiered),
            mode,
        )
    }

    #[tokio::test]
    async fn rpc_collects_and_merges() {
        let server = MockServer::start().await;
        let now = Utc::now();
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "common:getNodes" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": [
                    { "uuid": "u1", "name": "alpha", "region": "SG", "virtualization": "lxc" },
                    { "uuid": "u2", "name": "beta" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "common:getNodesLatestStatus" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {
                    "u1": { "client": "u1", "time": now.to_rfc3339(), "cpu": 40.0, "ram": 2048 }
                }
            })))
            .mount(&server)
            .await;

        let stats = collector(&server.uri(), UpstreamMode::Rpc2)
            .collect(now)
            .await
            .unwrap();
        assert_eq!(stats.updated, now.timestamp());
        assert_eq!(stats.servers.len(), 2);
        assert!(stats.servers[0].online);
        assert_eq!(stats.servers[0].kind, "LXC");
        assert_eq!(stats.servers[0].memory_used, 2);
        assert!(!stats.servers[1].online);
    }

    #[tokio::test]
    async fn rpc_status_failure_renders_offline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "common:getNodes" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": [{ "uuid": "u1", "name": "alpha" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "common:getNodesLatestStatus" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "boom" }
            })))
            .mount(&server)
            .await;

        let stats = collector(&server.uri(), UpstreamMode::Rpc2)
            .collect(Utc::now())
            .await
            .unwrap();
        assert_eq!(stats.servers.len(), 1);
        assert!(!stats.servers[0].is_online());
    }

    #[tokio::test]
    async fn malformed_status_only_affects_its_node() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "common:getNodes" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": [{ "uuid": "u1", "name": "alpha" }, { "uuid": "u2", "name": "beta" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "common:getNodesLatestStatus" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": {
                    "u1": { "online": true, "cpu": 5.0 },
                    "u2": { "online": true, "cpu": null }
                }
            })))
            .mount(&server)
            .await;

        let stats = collector(&server.uri(), UpstreamMode::Rpc2)
            .collect(Utc::now())
            .await
            .unwrap();
        assert_eq!(stats.servers[0].name, "alpha");
        assert!(stats.servers[0].online);
        assert_eq!(stats.servers[0].cpu, 5.0);
        assert_eq!(stats.servers[1].name, "beta");
        assert!(!stats.servers[1].online);
    }

    #[tokio::test]
    async fn rest_fan_out_tolerates_per_node_failure() {
        let server = MockServer::start().await;
        let now = Utc::now();
        Mock::given(method("GET"))
            .and(path("/api/nodes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success", "message": "",
                "data": [
                    { "uuid": "ok", "name": "good" },
                    { "uuid": "bad", "name": "broken" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/recent/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success", "message": "",
                "data": [
                    { "time": "2000-01-01T00:00:00Z", "cpu": 1.0 },
                    { "time": now.to_rfc3339(), "cpu": 9.0 },
                    { "time": "2001-01-01T00:00:00Z", "cpu": 2.0 }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/recent/bad"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let stats = collector(&server.uri(), UpstreamMode::Rest)
            .collect(now)
            .await
            .unwrap();
        assert_eq!(stats.servers.len(), 2);
        assert!(stats.servers[0].online);
        assert_eq!(stats.servers[0].cpu, 9.0);
        assert_eq!(stats.servers[1].name, "broken");
        assert!(!stats.servers[1].online);
    }

    #[tokio::test]
    async fn node_list_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/nodes"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = collector(&server.uri(), UpstreamMode::Rest)
            .collect(Utc::now())
            .await;
        assert!(result.is_err());
    }
}
