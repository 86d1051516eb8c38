use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A monitored host as the upstream knows it. Sizes are in bytes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KomariNode {
    pub uuid: String,
    pub name: String,
    pub cpu_name: String,
    pub virtualization: String,
    pub arch: String,
    pub os: String,
    pub region: String,
    pub group: String,
    #[serde(deserialize_with = "serde_helpers::tags")]
    pub tags: Vec<String>,
    pub mem_total: u64,
    pub swap_total: u64,
    pub disk_total: u64,
    pub weight: i64,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

/// One point-in-time record for a node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeStatus {
    #[serde(alias = "uuid")]
    pub client: String,
    #[serde(deserialize_with = "serde_helpers::timestamp")]
    pub time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_helpers::timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub cpu: f64,
    pub ram: u64,
    pub ram_total: u64,
    pub swap: u64,
    pub swap_total: u64,
    pub load: f64,
    pub load5: f64,
    pub load15: f64,
    pub disk: u64,
    pub disk_total: u64,
    // bytes per second
    pub net_in: u64,
    pub net_out: u64,
    // cumulative bytes
    pub net_total_up: u64,
    pub net_total_down: u64,
    pub process: u64,
    pub connections: u64,
    pub connections_udp: u64,
    // seconds
    pub uptime: u64,
    pub online: Option<bool>,
}

impl NodeStatus {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.time.or(self.updated_at)
    }
}

/// What the dashboard renders for one host.
///
/// Memory and swap are in KiB, disk in MiB, network rates in bytes per second and
/// network totals in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub name: String,
    pub alias: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
    pub online: bool,
    pub online4: bool,
    pub online6: bool,
    /// `"{seconds}s"`, or empty when unknown.
    pub uptime: String,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub network_in: u64,
    pub network_out: u64,
    pub cpu: f64,
    pub memory_total: u64,
    pub memory_used: u64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub hdd_total: u64,
    pub hdd_used: u64,
    pub weight: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_ts: Option<i64>,
}

impl Server {
    pub fn is_online(&self) -> bool {
        self.online || self.online4 || self.online6
    }

    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Epoch seconds.
    pub updated: i64,
    pub servers: Vec<Server>,
}

/// `common:getNodes` answers with either a list or a uuid-keyed object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NodesPayload {
    List(Vec<KomariNode>),
    Keyed(BTreeMap<String, KomariNode>),
    Single(KomariNode),
}

impl NodesPayload {
    pub fn into_nodes(self) -> Vec<KomariNode> {
        match self {
            NodesPayload::List(nodes) => nodes,
            NodesPayload::Keyed(map) => map
                .into_iter()
                .map(|(uuid, mut node)| {
                    if node.uuid.is_empty() {
                        node.uuid = uuid;
                    }
                    node
                })
                .collect(),
            NodesPayload::Single(node) => vec![node],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RecordsPayload {
    List(Vec<NodeStatus>),
    Wrapped { records: Vec<NodeStatus> },
}

impl RecordsPayload {
    pub fn into_records(self) -> Vec<NodeStatus> {
        match self {
            RecordsPayload::List(records) => records,
            RecordsPayload::Wrapped { records } => records,
        }
    }
}

/// REST responses come as `{status, message, data}` on current backends and bare on
/// older ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RestEnvelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> RestEnvelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            RestEnvelope::Wrapped { data } => data,
            RestEnvelope::Bare(data) => data,
        }
    }
}

mod serde_helpers {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Text(String),
        Number(f64),
    }

    // epoch values above this are milliseconds
    const MILLIS_CUTOFF: f64 = 1e12;

    /// RFC 3339 text or an epoch number (seconds or milliseconds). Anything
    /// unparseable becomes `None`.
    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawTime>::deserialize(deserializer)?;
        Ok(match raw {
            Some(RawTime::Text(text)) => DateTime::parse_from_rfc3339(text.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Some(RawTime::Number(n)) if n.is_finite() && n > 0.0 => {
                let millis = if n > MILLIS_CUTOFF { n } else { n * 1000.0 };
                Utc.timestamp_millis_opt(millis as i64).single()
            }
            _ => None,
        })
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTags {
        Text(String),
        List(Vec<String>),
    }

    /// `"a;b"` or `["a", "b"]`.
    pub fn tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawTags>::deserialize(deserializer)?;
        let tags = match raw {
            Some(RawTags::Text(text)) => text
                .split(|c: char| c == ';' || c == ',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
            Some(RawTags::List(list)) => list,
            None => Vec::new(),
        };
        Ok(tags)
    }
}
