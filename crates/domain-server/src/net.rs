//! Socket setup and host address discovery.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Any routable destination works; connecting a UDP socket sends nothing.
const ROUTE_PROBE: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(198, 51, 100, 1), 9);

/// The IPv4 address this host uses for outbound traffic, i.e. the address
/// co-located nodes report as their public one.
pub fn detect_host_address() -> Result<Ipv4Addr> {
    let probe = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    probe
        .connect(ROUTE_PROBE)
        .context("no IPv4 route to probe the host address")?;
    match probe.local_addr()? {
        SocketAddr::V4(v4) if !v4.ip().is_unspecified() => Ok(*v4.ip()),
        other => anyhow::bail!("unexpected probe address {other}"),
    }
}

/// Bind the check-in socket on every IPv4 interface.
pub fn bind_udp(port: u16) -> Result<UdpSocket> {
    bind_udp_on(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
}

pub fn bind_udp_on(addr: SocketAddrV4) -> Result<UdpSocket> {
    let socket =
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;
    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&SocketAddr::V4(addr).into())
        .with_context(|| format!("bind({addr})"))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).context("failed to convert to tokio UdpSocket")
}
