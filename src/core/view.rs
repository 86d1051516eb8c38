//! Derived dashboard state. Everything here is recomputed from the latest snapshot.

use crate::core::ent::Server;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Bucket for servers without a location. Always listed last.
pub const UNKNOWN_REGION: &str = "Unknown Region";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_servers: usize,
    pub online_servers: usize,
    pub avg_cpu_usage: i64,
    pub avg_memory_usage: i64,
    /// Summed over online servers, bytes per second.
    pub total_rx_speed: u64,
    pub total_tx_speed: u64,
    /// Summed over online servers, bytes.
    pub total_download: u64,
    pub total_upload: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionGroup {
    pub region: String,
    pub online: usize,
    pub servers: Vec<Server>,
}

pub fn dashboard_stats(servers: &[Server]) -> DashboardStats {
    let mut stats = DashboardStats {
        total_servers: servers.len(),
        ..Default::default()
    };
    let mut cpu = 0.0;
    let mut memory = 0.0;
    for server in servers.iter().filter(|s| s.is_online()) {
        stats.online_servers += 1;
        if server.cpu.is_finite() {
            cpu += server.cpu;
        }
        if server.memory_total > 0 {
            memory += server.memory_used as f64 / server.memory_total as f64 * 100.0;
        }
        // values come off the wire, don't trust them to fit
        stats.total_rx_speed = stats.total_rx_speed.saturating_add(server.network_rx);
        stats.total_tx_speed = stats.total_tx_speed.saturating_add(server.network_tx);
        stats.total_download = stats.total_download.saturating_add(server.network_in);
        stats.total_upload = stats.total_upload.saturating_add(server.network_out);
    }
    if stats.online_servers > 0 {
        let n = stats.online_servers as f64;
        stats.avg_cpu_usage = (cpu / n).round() as i64;
        stats.avg_memory_usage = (memory / n).round() as i64;
    }
    stats
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Weight descending, then online first, then display name.
pub fn compare_servers(a: &Server, b: &Server) -> Ordering {
    b.weight
        .cmp(&a.weight)
        .then_with(|| b.is_online().cmp(&a.is_online()))
        .then_with(|| compare_names(a.display_name(), b.display_name()))
}

pub fn sort_servers(servers: &mut [Server]) {
    servers.sort_by(compare_servers);
}

pub fn sorted(servers: &[Server]) -> Vec<Server> {
    let mut servers = servers.to_vec();
    sort_servers(&mut servers);
    servers
}

pub fn region_of(server: &Server) -> &str {
    let location = server.location.trim();
    if location.is_empty() {
        UNKNOWN_REGION
    } else {
        location
    }
}

fn compare_regions(a: &str, b: &str) -> Ordering {
    match (a == UNKNOWN_REGION, b == UNKNOWN_REGION) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_names(a, b),
    }
}

/// Buckets servers by region. Input order is kept inside each bucket, so sort first
/// for a stable display.
pub fn group_by_region(servers: &[Server]) -> Vec<RegionGroup> {
    let mut buckets: HashMap<&str, Vec<Server>> = HashMap::new();
    for server in servers {
        buckets
            .entry(region_of(server))
            .or_default()
            .push(server.clone());
    }
    let mut groups: Vec<RegionGroup> = buckets
        .into_iter()
        .map(|(region, servers)| RegionGroup {
            region: region.to_string(),
            online: servers.iter().filter(|s| s.is_online()).count(),
            servers,
        })
        .collect();
    groups.sort_by(|a, b| compare_regions(&a.region, &b.region));
    groups
}

pub fn unique_regions(servers: &[Server]) -> Vec<String> {
    group_by_region(servers)
        .into_iter()
        .map(|g| g.region)
        .collect()
}

pub fn filter_by_region<'a>(servers: &'a [Server], region: &str) -> Vec<&'a Server> {
    servers.iter().filter(|s| region_of(s) == region).collect()
}
