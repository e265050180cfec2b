//! Agent metrics collection and Prometheus text exposition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use proxy_tunnel::{TunnelStats, TunnelStatus};

/// Process-level counters backing `/metrics`.
#[derive(Debug)]
pub struct AgentMetrics {
    start_time: Instant,

    /// Requests served by the admin surface.
    pub admin_requests: AtomicU64,

    /// Successful tunnel connection attempts.
    pub tunnel_connects: AtomicU64,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            admin_requests: AtomicU64::new(0),
            tunnel_connects: AtomicU64::new(0),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn admin_request(&self) {
        self.admin_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tunnel_connected(&self) {
        self.tunnel_connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Render the exposition text for `/metrics`.
    pub fn prometheus_export(&self, status: TunnelStatus, stats: &TunnelStats) -> String {
        format!(
            "# HELP proxy_agent_uptime_seconds Agent uptime in seconds\n\
             # TYPE proxy_agent_uptime_seconds gauge\n\
             proxy_agent_uptime_seconds {}\n\
             # HELP proxy_agent_tunnel_status Tunnel status (0=disconnected, 1=connecting, 2=connected)\n\
             # TYPE proxy_agent_tunnel_status gauge\n\
             proxy_agent_tunnel_status {}\n\
             # HELP proxy_agent_tunnel_connects_total Successful tunnel connections\n\
             # TYPE proxy_agent_tunnel_connects_total counter\n\
             proxy_agent_tunnel_connects_total {}\n\
             # HELP proxy_agent_tunnel_bytes_received_total Bytes received over the tunnel\n\
             # TYPE proxy_agent_tunnel_bytes_received_total counter\n\
             proxy_agent_tunnel_bytes_received_total {}\n\
             # HELP proxy_agent_tunnel_reads_total Read operations on the tunnel connection\n\
             # TYPE proxy_agent_tunnel_reads_total counter\n\
             proxy_agent_tunnel_reads_total {}\n\
             # HELP proxy_agent_admin_requests_total Requests served by the admin endpoints\n\
             # TYPE proxy_agent_admin_requests_total counter\n\
             proxy_agent_admin_requests_total {}\n",
            self.uptime_secs(),
            status.as_gauge(),
            self.tunnel_connects.load(Ordering::Relaxed),
            stats.bytes_received(),
            stats.reads(),
            self.admin_requests.load(Ordering::Relaxed),
        )
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = AgentMetrics::new();
        assert_eq!(metrics.admin_requests.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tunnel_connects.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn exposition_contains_all_series() {
        let metrics = AgentMetrics::new();
        metrics.tunnel_connected();
        metrics.admin_request();
        metrics.admin_request();

        let stats = TunnelStats::new();
        let text = metrics.prometheus_export(TunnelStatus::Connected, &stats);

        assert!(text.contains("proxy_agent_uptime_seconds"));
        assert!(text.contains("proxy_agent_tunnel_status 2"));
        assert!(text.contains("proxy_agent_tunnel_connects_total 1"));
        assert!(text.contains("proxy_agent_tunnel_bytes_received_total 0"));
        assert!(text.contains("proxy_agent_admin_requests_total 2"));
    }

    #[test]
    fn status_gauge_tracks_disconnection() {
        let metrics = AgentMetrics::new();
        let stats = TunnelStats::new();
        let text = metrics.prometheus_export(TunnelStatus::Disconnected, &stats);
        assert!(text.contains("proxy_agent_tunnel_status 0"));
    }
}
