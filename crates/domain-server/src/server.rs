//! The domain server's main loop.
//!
//! Receives check-ins, keeps the registry current and answers each one with
//! a node list. Assignment requests and the node count stat run off their
//! own interval timers inside the same task.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use domain_core::config::DomainConfig;
use domain_core::wire::{decode_header, decode_request, MAX_PACKET_SIZE};
use domain_core::{NodeId, PacketType};
use domain_services::{
    usec_now, BroadcastBuilder, Micros, MetricsSink, Requester, SharedRegistry, StatKind,
    NODE_COUNT_KEY,
};

use crate::assignment::AssignmentDispatcher;

/// Runtime knobs for the server loop, resolved from config and flags.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// This host's address as co-located nodes report it.
    pub host_address: Ipv4Addr,
    pub local_mode: bool,
    pub assignment_server: SocketAddr,
    pub pool: Option<String>,
    pub assignment_interval: Duration,
    pub stats_interval: Duration,
}

impl ServerSettings {
    pub fn from_config(config: &DomainConfig, host_address: Ipv4Addr) -> Self {
        Self {
            host_address,
            local_mode: config.network.local_mode,
            assignment_server: config.assignment.server,
            pool: config.assignment.pool.clone(),
            assignment_interval: config.assignment.interval(),
            stats_interval: config.metrics.interval(),
        }
    }
}

/// A reply ready to send.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub bytes: Bytes,
    pub destination: SocketAddr,
    pub node_id: NodeId,
    pub created: bool,
}

/// Per-packet request handling, separated from the socket so it can be
/// driven directly.
pub struct Directory {
    registry: SharedRegistry,
    builder: BroadcastBuilder,
    host_address: Ipv4Addr,
    local_mode: bool,
    next_id: NodeId,
}

impl Directory {
    pub fn new(registry: SharedRegistry, host_address: Ipv4Addr, local_mode: bool) -> Self {
        Self {
            registry,
            builder: BroadcastBuilder::default(),
            host_address,
            local_mode,
            next_id: NodeId::FIRST,
        }
    }

    /// Id the next new node will receive.
    pub fn next_id(&self) -> NodeId {
        self.next_id
    }

    /// Handle one datagram. Returns the reply, or None if the datagram is
    /// to be ignored.
    pub fn handle_packet(
        &mut self,
        data: &[u8],
        source: SocketAddr,
        now: Micros,
    ) -> Option<Outbound> {
        let header = match decode_header(data) {
            Ok(h) => h,
            Err(e) => {
                tracing::trace!(error = %e, %source, "dropping datagram");
                return None;
            }
        };

        let packet_type = match PacketType::try_from(header.packet_type) {
            Ok(t) if t.is_directory_request() => t,
            _ => {
                tracing::trace!(
                    packet_type = header.packet_type,
                    %source,
                    "ignoring packet type"
                );
                return None;
            }
        };

        if !header.version_matches() {
            tracing::debug!(version = header.version, %source, "protocol version mismatch");
            return None;
        }

        let request = match decode_request(data) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    %source,
                    bytes = hex::encode(&data[..data.len().min(16)]),
                    "malformed request"
                );
                return None;
            }
        };

        let SocketAddr::V4(mut public_address) = source else {
            tracing::debug!(%source, "ignoring IPv6 sender");
            return None;
        };

        // A node on this host reports our own address as its public one.
        // Outside local-testing mode, zero it so other nodes use the domain
        // server's address, and answer on the node's local address.
        let mut destination = public_address;
        if *public_address.ip() == self.host_address && !self.local_mode {
            public_address.set_ip(Ipv4Addr::UNSPECIFIED);
            destination = request.local_address;
        }

        let woke =
            packet_type == PacketType::AnnounceForDuty && request.sender_type.is_singleton();
        let (node, created) = self.registry.check_in(
            public_address,
            request.local_address,
            request.sender_type,
            self.next_id,
            now,
            woke,
        );
        if created {
            self.next_id = self.next_id.next();
            tracing::info!(
                id = %node.id,
                node_type = %node.node_type,
                public = %node.public_address,
                local = %node.local_address,
                "node registered"
            );
        }

        let nodes = self.registry.snapshot();
        let reply = self
            .builder
            .build(&Requester::from(&node), &request.interests, &nodes);
        if reply.is_truncated() {
            tracing::warn!(
                id = %node.id,
                entries = reply.entries,
                dropped = reply.dropped,
                "reply full, entries left out"
            );
        }

        Some(Outbound {
            bytes: reply.bytes,
            destination: SocketAddr::V4(destination),
            node_id: node.id,
            created,
        })
    }
}

pub struct ServerLoop {
    socket: Arc<UdpSocket>,
    registry: SharedRegistry,
    directory: Directory,
    dispatcher: AssignmentDispatcher,
    metrics: Arc<dyn MetricsSink>,
    assignment_interval: Duration,
    stats_interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl ServerLoop {
    pub fn new(
        socket: Arc<UdpSocket>,
        registry: SharedRegistry,
        settings: ServerSettings,
        metrics: Arc<dyn MetricsSink>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let directory = Directory::new(
            registry.clone(),
            settings.host_address,
            settings.local_mode,
        );
        let dispatcher = AssignmentDispatcher::new(
            socket.clone(),
            settings.assignment_server,
            settings.pool,
        );
        Self {
            socket,
            registry,
            directory,
            dispatcher,
            metrics,
            assignment_interval: settings.assignment_interval,
            stats_interval: settings.stats_interval,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let mut assignment_interval = tokio::time::interval(self.assignment_interval);
        let mut stats_interval = tokio::time::interval(self.stats_interval);

        tracing::info!(addr = %self.socket.local_addr()?, "domain server listening");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("server loop shutting down");
                    return Ok(());
                }

                _ = assignment_interval.tick() => {
                    self.dispatcher.dispatch_missing(&self.registry).await;
                }

                _ = stats_interval.tick() => {
                    let alive = self.registry.count_alive();
                    self.metrics.record(StatKind::Timer, NODE_COUNT_KEY, alive as f64);
                }

                result = self.socket.recv_from(&mut buf) => {
                    let (len, source) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "recv_from failed");
                            continue;
                        }
                    };

                    let Some(out) = self.directory.handle_packet(&buf[..len], source, usec_now())
                    else {
                        continue;
                    };

                    if let Err(e) = self.socket.send_to(&out.bytes, out.destination).await {
                        tracing::warn!(
                            error = %e,
                            destination = %out.destination,
                            "reply send failed"
                        );
                    }
                }
            }
        }
    }
}
