//! Domain server integration harness.
//!
//! Each test starts a complete domain server inside the test process,
//! bound to ephemeral loopback ports: the check-in loop, the liveness
//! reaper and the status page, plus a UDP socket standing in for the
//! assignment server. Nodes are played by plain UDP sockets.
//!
//!   cargo test --test integration

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use domain_core::wire::{decode_reply, DomainReply, MAX_PACKET_SIZE};
use domain_core::{Assignment, InterestSet, NodeType, PacketType, Request};
use domain_server::{LivenessReaper, ServerLoop, ServerSettings};
use domain_services::{new_registry, MemorySink, SharedRegistry};

mod assignment;
mod checkin;
mod liveness;
mod local_mode;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Address the harness pretends the host has. Loopback clients do not match
/// it, so they are treated as remote unless a test overrides it.
pub const REMOTE_HOST: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

pub const REPLY_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DomainOptions {
    pub host_address: Ipv4Addr,
    pub local_mode: bool,
    pub pool: Option<String>,
    pub liveness_timeout: Duration,
    pub check_interval: Duration,
    pub assignment_interval: Duration,
    pub stats_interval: Duration,
}

impl Default for DomainOptions {
    fn default() -> Self {
        Self {
            host_address: REMOTE_HOST,
            local_mode: false,
            pool: None,
            liveness_timeout: Duration::from_secs(2),
            check_interval: Duration::from_millis(50),
            assignment_interval: Duration::from_millis(50),
            stats_interval: Duration::from_millis(50),
        }
    }
}

/// A running domain server.
pub struct Domain {
    pub addr: SocketAddr,
    pub status_addr: SocketAddr,
    pub registry: SharedRegistry,
    pub metrics: Arc<MemorySink>,
    /// Receives whatever the server sends to its assignment server.
    pub assignment_server: UdpSocket,
    shutdown: broadcast::Sender<()>,
    tasks: JoinSet<Result<()>>,
}

impl Domain {
    pub async fn start() -> Result<Self> {
        Self::start_with(DomainOptions::default()).await
    }

    pub async fn start_with(options: DomainOptions) -> Result<Self> {
        let socket = Arc::new(
            UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
                .await
                .context("bind domain socket")?,
        );
        let addr = socket.local_addr()?;
        let assignment_server = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let status_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let status_addr = status_listener.local_addr()?;

        let registry = new_registry();
        let metrics = Arc::new(MemorySink::new());
        let (shutdown, _) = broadcast::channel::<()>(1);
        let mut tasks = JoinSet::new();

        let settings = ServerSettings {
            host_address: options.host_address,
            local_mode: options.local_mode,
            assignment_server: assignment_server.local_addr()?,
            pool: options.pool,
            assignment_interval: options.assignment_interval,
            stats_interval: options.stats_interval,
        };
        tasks.spawn(
            ServerLoop::new(
                socket,
                registry.clone(),
                settings,
                metrics.clone(),
                shutdown.subscribe(),
            )
            .run(),
        );
        tasks.spawn(
            LivenessReaper::new(
                registry.clone(),
                options.liveness_timeout,
                options.check_interval,
                shutdown.subscribe(),
            )
            .run(),
        );

        let mut stop = shutdown.subscribe();
        tasks.spawn(domain_api::serve_on(
            status_listener,
            domain_api::StatusState {
                registry: registry.clone(),
            },
            async move {
                let _ = stop.recv().await;
            },
        ));

        Ok(Self {
            addr,
            status_addr,
            registry,
            metrics,
            assignment_server,
            shutdown,
            tasks,
        })
    }

    /// Signal shutdown and wait for every task to finish cleanly.
    pub async fn stop(mut self) -> Result<()> {
        let _ = self.shutdown.send(());
        while let Some(joined) = tokio::time::timeout(REPLY_WAIT, self.tasks.join_next())
            .await
            .context("domain tasks did not stop")?
        {
            joined.context("domain task panicked")??;
        }
        Ok(())
    }

    /// Next assignment request the server sent.
    pub async fn next_assignment(&self) -> Result<Assignment> {
        let mut buf = [0u8; 256];
        let (n, _) = tokio::time::timeout(REPLY_WAIT, self.assignment_server.recv_from(&mut buf))
            .await
            .context("no assignment request")??;
        Ok(Assignment::decode(&buf[..n])?)
    }

    /// Discard assignment requests already queued.
    pub fn drain_assignments(&self) {
        let mut buf = [0u8; 256];
        while self.assignment_server.try_recv_from(&mut buf).is_ok() {}
    }
}

/// A fake node: one UDP socket that declares its own address as local.
pub struct Node {
    pub socket: UdpSocket,
    pub node_type: NodeType,
    pub local_address: SocketAddrV4,
}

impl Node {
    pub async fn bind(node_type: NodeType) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let SocketAddr::V4(local_address) = socket.local_addr()? else {
            bail!("expected an IPv4 socket");
        };
        Ok(Self {
            socket,
            node_type,
            local_address,
        })
    }

    pub fn request(&self, packet_type: PacketType, interests: &[NodeType]) -> Result<Vec<u8>> {
        let request = Request {
            packet_type,
            sender_type: self.node_type,
            local_address: self.local_address,
            interests: InterestSet::new(interests.iter().copied()),
        };
        Ok(request.encode()?.to_vec())
    }

    pub async fn send(&self, domain: SocketAddr, datagram: &[u8]) -> Result<()> {
        self.socket.send_to(datagram, domain).await?;
        Ok(())
    }

    pub async fn recv_raw(&self) -> Result<Vec<u8>> {
        recv_raw(&self.socket).await
    }

    /// Send one request and wait for the reply.
    pub async fn check_in(
        &self,
        domain: SocketAddr,
        packet_type: PacketType,
        interests: &[NodeType],
    ) -> Result<DomainReply> {
        let datagram = self.request(packet_type, interests)?;
        self.send(domain, &datagram).await?;
        Ok(decode_reply(&self.recv_raw().await?)?)
    }

    pub async fn announce(&self, domain: SocketAddr, interests: &[NodeType]) -> Result<DomainReply> {
        self.check_in(domain, PacketType::AnnounceForDuty, interests)
            .await
    }
}

pub async fn recv_raw(socket: &UdpSocket) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let (n, _) = tokio::time::timeout(REPLY_WAIT, socket.recv_from(&mut buf))
        .await
        .context("no reply from domain server")??;
    buf.truncate(n);
    Ok(buf)
}

/// True if nothing arrives on `socket` within `wait`.
pub async fn stays_silent(socket: &UdpSocket, wait: Duration) -> bool {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    tokio::time::timeout(wait, socket.recv_from(&mut buf))
        .await
        .is_err()
}
