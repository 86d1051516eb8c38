//! Reshapes upstream records into the dashboard's `Server` contract.

use crate::core::doctor::Doctor;
use crate::core::ent::{KomariNode, NodeStatus, Server};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use std::collections::HashMap;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * 1024;

lazy_static! {
    static ref VIRT_LABELS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("kvm", "KVM");
        m.insert("qemu", "QEMU");
        m.insert("lxc", "LXC");
        m.insert("lxc-libvirt", "LXC");
        m.insert("openvz", "OpenVZ");
        m.insert("xen", "Xen");
        m.insert("xen-hvm", "Xen");
        m.insert("vmware", "VMware");
        m.insert("microsoft", "Hyper-V");
        m.insert("hyperv", "Hyper-V");
        m.insert("hyper-v", "Hyper-V");
        m.insert("oracle", "VirtualBox");
        m.insert("virtualbox", "VirtualBox");
        m.insert("parallels", "Parallels");
        m.insert("bhyve", "bhyve");
        m.insert("docker", "Docker");
        m.insert("podman", "Podman");
        m.insert("wsl", "WSL");
        m.insert("systemd-nspawn", "nspawn");
        m.insert("none", "Dedicated");
        m.insert("unknown", "Dedicated");
        m.insert("dedicated", "Dedicated");
        m
    };
}

pub fn bytes_to_kib(bytes: u64) -> u64 {
    bytes / KIB
}

pub fn bytes_to_mib(bytes: u64) -> u64 {
    bytes / MIB
}

/// Case-insensitive lookup; unknown values are returned as given.
pub fn virtualization_label(raw: &str) -> String {
    let key = raw.trim().to_ascii_lowercase();
    match VIRT_LABELS.get(key.as_str()) {
        Some(label) => label.to_string(),
        None => raw.trim().to_string(),
    }
}

/// Display type of a node: its virtualization label, or the architecture when the
/// virtualization is not reported.
pub fn server_type(node: &KomariNode) -> String {
    if node.virtualization.trim().is_empty() {
        node.arch.trim().to_string()
    } else {
        virtualization_label(&node.virtualization)
    }
}

fn non_zero_or(primary: u64, fallback: u64) -> u64 {
    if primary > 0 {
        primary
    } else {
        fallback
    }
}

/// Builds one `Server` from a node and its latest record. A node without a record keeps
/// its capacity totals and is shown offline with every metric at zero.
pub fn to_server(
    node: &KomariNode,
    status: Option<&NodeStatus>,
    dc: &Doctor,
    now: DateTime<Utc>,
) -> Server {
    let name = if node.name.trim().is_empty() {
        node.uuid.clone()
    } else {
        node.name.clone()
    };
    let mut server = Server {
        alias: name.clone(),
        name,
        kind: server_type(node),
        location: node.region.trim().to_string(),
        weight: node.weight,
        memory_total: bytes_to_kib(node.mem_total),
        swap_total: bytes_to_kib(node.swap_total),
        hdd_total: bytes_to_mib(node.disk_total),
        ..Default::default()
    };

    let status = match status {
        Some(status) => status,
        None => return server,
    };

    let online = dc.check_node(status, now);
    let has_v4 = node.ipv4.as_deref().map_or(false, |ip| !ip.is_empty());
    let has_v6 = node.ipv6.as_deref().map_or(false, |ip| !ip.is_empty());
    server.online = online;
    server.online4 = online && (has_v4 || !has_v6);
    server.online6 = online && has_v6;

    server.uptime = if status.uptime > 0 {
        format!("{}s", status.uptime)
    } else {
        String::new()
    };
    server.cpu = status.cpu;
    server.load_1 = status.load;
    server.load_5 = status.load5;
    server.load_15 = status.load15;
    server.network_rx = status.net_in;
    server.network_tx = status.net_out;
    server.network_in = status.net_total_down;
    server.network_out = status.net_total_up;
    server.memory_total = bytes_to_kib(non_zero_or(status.ram_total, node.mem_total));
    server.memory_used = bytes_to_kib(status.ram);
    server.swap_total = bytes_to_kib(non_zero_or(status.swap_total, node.swap_total));
    server.swap_used = bytes_to_kib(status.swap);
    server.hdd_total = bytes_to_mib(non_zero_or(status.disk_total, node.disk_total));
    server.hdd_used = bytes_to_mib(status.disk);
    server.process_count = Some(status.process);
    server.tcp_count = Some(status.connections);
    server.udp_count = Some(status.connections_udp);
    server.latest_ts = status.timestamp().map(|t| t.timestamp());
    server
}

/// Joins nodes with their uuid-keyed latest records, preserving node order.
pub fn merge(
    nodes: &[KomariNode],
    statuses: &HashMap<String, NodeStatus>,
    dc: &Doctor,
    now: DateTime<Utc>,
) -> Vec<Server> {
    nodes
        .iter()
        .map(|node| to_server(node, statuses.get(&node.uuid), dc, now))
        .collect()
}
