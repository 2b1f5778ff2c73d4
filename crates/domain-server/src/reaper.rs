//! Liveness reaper: removes nodes that stopped checking in.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;

use domain_services::{usec_now, Micros, SharedRegistry};

pub struct LivenessReaper {
    registry: SharedRegistry,
    timeout: Duration,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl LivenessReaper {
    pub fn new(
        registry: SharedRegistry,
        timeout: Duration,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            registry,
            timeout,
            interval,
            shutdown,
        }
    }

    /// One scan. Returns the number of nodes removed.
    pub fn reap(&self, now: Micros) -> usize {
        let removed = self.registry.remove_stale(self.timeout, now);
        if removed > 0 {
            tracing::debug!(
                removed,
                alive = self.registry.count_alive(),
                "reaped silent nodes"
            );
        }
        removed
    }

    /// Scan on every interval tick until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        tracing::info!(
            timeout_ms = self.timeout.as_millis() as u64,
            interval_ms = self.interval.as_millis() as u64,
            "liveness reaper starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("liveness reaper shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    self.reap(usec_now());
                }
            }
        }
    }
}
