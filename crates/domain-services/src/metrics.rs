//! Stats emission: fire-and-forget values sent to a stats collector.
//!
//! Datagram format: `"<kind> <key> <value>"`, value with two decimals,
//! kind one of `t` (timer), `c` (counter), `g` (gauge).

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use anyhow::{Context, Result};
use parking_lot::Mutex;

/// Key under which the alive node count is reported.
pub const NODE_COUNT_KEY: &str = "ds-node-count";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Timer,
    Counter,
    Gauge,
}

impl StatKind {
    pub fn as_char(self) -> char {
        match self {
            StatKind::Timer => 't',
            StatKind::Counter => 'c',
            StatKind::Gauge => 'g',
        }
    }
}

/// Somewhere to send stats. Implementations must not block or fail the
/// caller; delivery is best effort.
pub trait MetricsSink: Send + Sync {
    fn record(&self, kind: StatKind, key: &str, value: f64);
}

/// Format one stat the way the collector expects it.
pub fn format_stat(kind: StatKind, key: &str, value: f64) -> String {
    format!("{} {} {:.2}", kind.as_char(), key, value)
}

// ── UDP ───────────────────────────────────────────────────────────────────────

/// Sends each stat as one UDP datagram to a collector.
pub struct UdpStatsSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpStatsSink {
    pub fn new(target: SocketAddr) -> Result<Self> {
        let bind: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind).context("failed to bind stats socket")?;
        socket
            .set_nonblocking(true)
            .context("failed to make stats socket non-blocking")?;
        Ok(Self { socket, target })
    }
}

impl MetricsSink for UdpStatsSink {
    fn record(&self, kind: StatKind, key: &str, value: f64) {
        let line = format_stat(kind, key, value);
        if let Err(e) = self.socket.send_to(line.as_bytes(), self.target) {
            tracing::warn!(error = %e, target = %self.target, "stats send failed");
        }
    }
}

// ── Log ───────────────────────────────────────────────────────────────────────

/// Writes stats to the log. Used when no collector is configured.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, kind: StatKind, key: &str, value: f64) {
        tracing::info!(kind = ?kind, key, value, "stat");
    }
}

// ── Memory ────────────────────────────────────────────────────────────────────

/// Keeps every recorded stat. For tests and local inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(StatKind, String, f64)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(StatKind, String, f64)> {
        self.records.lock().clone()
    }
}

impl MetricsSink for MemorySink {
    fn record(&self, kind: StatKind, key: &str, value: f64) {
        self.records.lock().push((kind, key.to_string(), value));
    }
}
