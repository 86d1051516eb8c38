use crate::core::ent::*;
use crate::core::error::{UpstreamError, UpstreamResult};
use crate::core::rpc::{join_url, RpcClient};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which wire shape the monitoring backend speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamMode {
    #[default]
    Rpc2,
    Rest,
}

/// Typed access to a Komari backend, over JSON-RPC2 or the older REST paths.
#[derive(Debug, Clone)]
pub struct KomariClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rpc: RpcClient,
}

impl KomariClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        KomariClient {
            rpc: RpcClient::new(http.clone(), base_url, api_key.clone()),
            http,
            base_url: base_url.to_string(),
            api_key,
        }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub async fn get_nodes(&self, uuid: Option<&str>) -> UpstreamResult<Vec<KomariNode>> {
        let params = uuid.map(|uuid| json!({ "uuid": uuid }));
        let payload: NodesPayload = self.rpc.call("common:getNodes", params).await?;
        Ok(payload.into_nodes())
    }

    /// Latest record per node, keyed by uuid. An empty `uuids` asks for every node.
    pub async fn get_nodes_latest_status(
        &self,
        uuids: &[String],
    ) -> UpstreamResult<HashMap<String, NodeStatus>> {
        let params = (!uuids.is_empty()).then(|| json!({ "uuids": uuids }));
        let raw: Option<HashMap<String, Value>> = self
            .rpc
            .call("common:getNodesLatestStatus", params)
            .await?;
        // 单条记录解析失败只丢弃该节点
        let statuses = raw
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(uuid, record)| match serde_json::from_value(record) {
                Ok(status) => Some((uuid, status)),
                Err(e) => {
                    warn!("dropping malformed status for {}: {}", uuid, e);
                    None
                }
            })
            .collect();
        Ok(statuses)
    }

    pub async fn get_public_info(&self) -> UpstreamResult<Value> {
        self.rpc.call("common:getPublicInfo", None::<()>).await
    }

    pub async fn get_version(&self) -> UpstreamResult<Value> {
        self.rpc.call("common:getVersion", None::<()>).await
    }

    pub async fn get_node_recent_status(&self, uuid: &str) -> UpstreamResult<Vec<NodeStatus>> {
        let payload: Option<RecordsPayload> = self
            .rpc
            .call("common:getNodeRecentStatus", Some(json!({ "uuid": uuid })))
            .await?;
        Ok(payload.map(RecordsPayload::into_records).unwrap_or_default())
    }

    /// Historical records; params are passed through untouched.
    pub async fn get_records(&self, params: Value) -> UpstreamResult<Value> {
        self.rpc.call("common:getRecords", Some(params)).await
    }

    pub async fn rest_nodes(&self) -> UpstreamResult<Vec<KomariNode>> {
        let envelope: RestEnvelope<Vec<KomariNode>> = self.rest_get("api/nodes").await?;
        Ok(envelope.into_inner())
    }

    pub async fn rest_recent(&self, uuid: &str) -> UpstreamResult<Vec<NodeStatus>> {
        let envelope: RestEnvelope<Option<Vec<NodeStatus>>> =
            self.rest_get(&format!("api/recent/{}", uuid)).await?;
        Ok(envelope.into_inner().unwrap_or_default())
    }

    pub async fn rest_version(&self) -> UpstreamResult<Value> {
        self.rest_get("api/version").await
    }

    pub async fn rest_public(&self) -> UpstreamResult<Value> {
        self.rest_get("api/public").await
    }

    async fn rest_get<T: DeserializeOwned>(&self, path: &str) -> UpstreamResult<T> {
        let url = join_url(&self.base_url, path);
        debug!(%url, "rest call");
        let mut req = self
            .http
            .get(&url)
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache");
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

/// GETs a JSON document from an arbitrary URL, used for backends that already
/// serve the dashboard contract.
pub async fn fetch_json(http: &reqwest::Client, url: &str) -> UpstreamResult<Value> {
    let res = http
        .get(url)
        .header("Cache-Control", "no-cache")
        .header("Pragma", "no-cache")
        .send()
        .await?;
    if !res.status().is_success() {
        return Err(UpstreamError::Http(res.status()));
    }
    let bytes = res.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn rpc_result(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1, "result": result
        }))
    }

    #[tokio::test]
    async fn get_nodes_accepts_keyed_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .and(body_partial_json(json!({ "method": "common:getNodes" })))
            .respond_with(rpc_result(json!({
                "u1": { "name": "tokyo-1", "region": "JP" }
            })))
            .mount(&server)
            .await;

        let client = KomariClient::new(reqwest::Client::new(), &server.uri(), None);
        let nodes = client.get_nodes(None).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].uuid, "u1");
        assert_eq!(nodes[0].region, "JP");
    }

    #[tokio::test]
    async fn latest_status_sends_uuids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "common:getNodesLatestStatus",
                "params": { "uuids": ["u1"] }
            })))
            .respond_with(rpc_result(json!({
                "u1": { "client": "u1", "cpu": 12.5, "online": true }
            })))
            .mount(&server)
            .await;

        let client = KomariClient::new(reqwest::Client::new(), &server.uri(), None);
        let statuses = client
            .get_nodes_latest_status(&["u1".to_string()])
            .await
            .unwrap();
        assert_eq!(statuses["u1"].cpu, 12.5);
        assert_eq!(statuses["u1"].online, Some(true));
    }

    #[tokio::test]
    async fn latest_status_null_result_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_result(Value::Null))
            .mount(&server)
            .await;

        let client = KomariClient::new(reqwest::Client::new(), &server.uri(), None);
        assert!(client.get_nodes_latest_status(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn latest_status_skips_malformed_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_result(json!({
                "u1": { "client": "u1", "cpu": 5.0, "online": true },
                "u2": { "client": "u2", "cpu": null, "online": true }
            })))
            .mount(&server)
            .await;

        let client = KomariClient::new(reqwest::Client::new(), &server.uri(), None);
        let statuses = client.get_nodes_latest_status(&[]).await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses["u1"].online, Some(true));
        assert!(!statuses.contains_key("u2"));
    }

    #[tokio::test]
    async fn records_pass_params_through() {
        let server = MockServer::start().await;
        let params = json!({ "uuid": "u1", "hours": 4, "type": "load" });
        Mock::given(method("POST"))
            .and(path("/api/rpc2"))
            .and(body_partial_json(json!({
                "method": "common:getRecords",
                "params": params.clone()
            })))
            .respond_with(rpc_result(json!({
                "count": 1,
                "records": { "u1": [{ "cpu": 7.5 }] }
            })))
            .mount(&server)
            .await;

        let client = KomariClient::new(reqwest::Client::new(), &server.uri(), None);
        let result = client.get_records(params).await.unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["records"]["u1"][0]["cpu"], 7.5);
    }

    #[tokio::test]
    async fn recent_status_unwraps_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "common:getNodeRecentStatus",
                "params": { "uuid": "u1" }
            })))
            .respond_with(rpc_result(json!({
                "count": 2,
                "records": [{ "cpu": 1.0 }, { "cpu": 2.0 }]
            })))
            .mount(&server)
            .await;

        let client = KomariClient::new(reqwest::Client::new(), &server.uri(), None);
        let records = client.get_node_recent_status("u1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].cpu, 2.0);
    }

    #[tokio::test]
    async fn rest_nodes_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/nodes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "",
                "data": [{ "uuid": "u1", "name": "a" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/recent/u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "cpu": 3.0 }
            ])))
            .mount(&server)
            .await;

        let client = KomariClient::new(reqwest::Client::new(), &server.uri(), None);
        let nodes = client.rest_nodes().await.unwrap();
        assert_eq!(nodes[0].name, "a");
        let recent = client.rest_recent("u1").await.unwrap();
        assert_eq!(recent[0].cpu, 3.0);
    }

    #[tokio::test]
    async fn rest_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = KomariClient::new(reqwest::Client::new(), &server.uri(), None);
        let err = client.rest_version().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Http(s) if s.as_u16() == 404));
    }
}
