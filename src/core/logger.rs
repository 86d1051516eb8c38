use crate::core::ent::{Server, StatsResponse};
use crate::core::format::*;
use crate::core::poller::Event;
use crate::core::view::{self, DashboardStats};

use chrono::TimeZone;
use std::fmt::{Display, Write as _};
use std::io::{self, Write};

/// Renders polled snapshots as a plain-text dashboard.
pub struct Logger<W: Write, Tz: TimeZone> {
    out: W,
    tz: Tz,
    region: Option<String>,
    last_updated: Option<i64>,
}

impl<W, Tz> Logger<W, Tz>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(out: W, tz: Tz, region: Option<String>) -> Self {
        Logger {
            out,
            tz,
            region,
            last_updated: None,
        }
    }

    pub fn log(&mut self, event: Event) -> io::Result<()> {
        match event {
            Event::Snapshot(stats) => {
                self.last_updated = Some(stats.updated);
                let page = render(&stats, self.region.as_deref(), &self.tz);
                self.out.write_all(page.as_bytes())?;
            }
            Event::Failed(msg) => {
                tracing::warn!("poll failed: {}", msg);
                let since = match self.last_updated {
                    Some(ts) => format_date_time(ts, &self.tz),
                    None => "never".to_string(),
                };
                writeln!(self.out, "! fetch failed, showing data from {}", since)?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn usage(used: u64, total: u64) -> String {
    format!("{}%", format_percent(used as f64, total as f64))
}

fn swap_usage(server: &Server) -> String {
    if server.swap_total == 0 {
        "unconfigured".to_string()
    } else {
        usage(server.swap_used, server.swap_total)
    }
}

fn summary_line(stats: &DashboardStats) -> String {
    format!(
        "servers {}/{}  cpu {}%  mem {}%  rate ↓{} ↑{}  traffic ↓{} ↑{}",
        stats.online_servers,
        stats.total_servers,
        stats.avg_cpu_usage,
        stats.avg_memory_usage,
        format_speed(stats.total_rx_speed as f64, 2),
        format_speed(stats.total_tx_speed as f64, 2),
        format_bytes(stats.total_download as f64, 2),
        format_bytes(stats.total_upload as f64, 2),
    )
}

fn server_line(server: &Server) -> String {
    let uptime = humanize_uptime(&server.uptime);
    format!(
        "  {} {:<20} {:<10} cpu {:>3}%  mem {:>4}  swap {:>4}  disk {:>4}  ↓{} ↑{}  up {}",
        if server.is_online() { "●" } else { "○" },
        server.display_name(),
        server.kind,
        server.cpu.round() as i64,
        usage(server.memory_used, server.memory_total),
        swap_usage(server),
        usage(server.hdd_used, server.hdd_total),
        format_speed(server.network_rx as f64, 1),
        format_speed(server.network_tx as f64, 1),
        if uptime.is_empty() { "—".to_string() } else { uptime },
    )
}

/// One full dashboard page: header, totals, then servers grouped by region in display
/// order. `region` narrows the page to one group.
pub fn render<Tz>(stats: &StatsResponse, region: Option<&str>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let servers = match region {
        Some(region) => view::filter_by_region(&stats.servers, region)
            .into_iter()
            .cloned()
            .collect(),
        None => stats.servers.clone(),
    };
    let servers = view::sorted(&servers);

    let mut page = String::new();
    let _ = writeln!(page, "Server Status  updated {}", format_date_time(stats.updated, tz));
    let _ = writeln!(page, "{}", summary_line(&view::dashboard_stats(&servers)));
    for group in view::group_by_region(&servers) {
        let _ = writeln!(
            page,
            "[{}] {}/{} online",
            group.region,
            group.online,
            group.servers.len()
        );
        for server in &group.servers {
            let _ = writeln!(page, "{}", server_line(server));
        }
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stats() -> StatsResponse {
        StatsResponse {
            updated: 0,
            servers: vec![
                Server {
                    name: "tokyo".into(),
                    alias: "tokyo".into(),
                    kind: "KVM".into(),
                    location: "JP".into(),
                    online: true,
                    online4: true,
                    cpu: 12.4,
                    memory_total: 100,
                    memory_used: 50,
                    uptime: "90061s".into(),
                    ..Default::default()
                },
                Server {
                    name: "lost".into(),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn renders_groups_with_unknown_last() {
        let page = render(&stats(), None, &Utc);
        let lines: Vec<&str> = page.lines().collect();
        assert_eq!(lines[0], "Server Status  updated 1970-01-01 00:00:00");
        assert!(lines[1].starts_with("servers 1/2  cpu 12%  mem 50%"));
        assert_eq!(lines[2], "[JP] 1/1 online");
        assert!(lines[3].contains("tokyo"));
        assert!(lines[3].contains("swap unconfigured"));
        assert!(lines[3].contains("up 1d 1h 1m"));
        assert_eq!(lines[4], format!("[{}] 0/1 online", view::UNKNOWN_REGION));
        assert!(lines[5].contains("○ lost"));
        assert!(lines[5].ends_with("up —"));
    }

    #[test]
    fn region_filter_narrows_page() {
        let page = render(&stats(), Some("JP"), &Utc);
        assert!(page.contains("servers 1/1"));
        assert!(!page.contains("lost"));
    }

    #[test]
    fn failure_after_snapshot_mentions_last_update() {
        let mut logger = Logger::new(Vec::new(), Utc, None);
        logger.log(Event::Snapshot(stats())).unwrap();
        logger.log(Event::Failed("boom".into())).unwrap();
        let out = String::from_utf8(logger.into_inner()).unwrap();
        assert!(out.ends_with("! fetch failed, showing data from 1970-01-01 00:00:00\n"));
    }
}
