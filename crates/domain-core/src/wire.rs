//! Domain wire format: every datagram the domain server reads or writes.
//!
//! All multi-byte integers are big-endian. The fixed-layout pieces
//! (header, packed address, request prefix) are #[repr(C, packed)] with
//! zerocopy derives; variable-length replies are assembled through
//! [`PacketWriter`], which refuses to write past its capacity.

use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::node::{InterestSet, NodeId, NodeType};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Protocol version compiled into this build.
/// Packets carrying any other version are ignored without a reply.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Largest datagram the server will ever emit.
pub const MAX_PACKET_SIZE: usize = 1500;

/// Bytes in a packet header (type + version).
pub const HEADER_LEN: usize = 2;

/// Bytes in a packed socket address.
pub const ADDRESS_LEN: usize = 7;

/// Bytes in a packed node identifier.
pub const IDENTIFIER_LEN: usize = 2;

/// Bytes in one reply entry: type, id, public address, local address.
pub const NODE_ENTRY_LEN: usize = 1 + IDENTIFIER_LEN + 2 * ADDRESS_LEN;

/// Address family byte for IPv4 (matches AF_INET).
pub const ADDRESS_FAMILY_INET: u8 = 2;

/// UDP port the domain server listens on.
pub const DOMAIN_LISTEN_PORT: u16 = 39999;

// ── Packet Type ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Header tag on every reply the domain server sends.
    Domain = b'D',
    /// Periodic check-in from an already running node.
    ListRequest = b'L',
    /// First check-in from a newly started node.
    AnnounceForDuty = b'C',
    /// Provisioning request sent to the assignment server.
    CreateAssignment = b's',
}

impl PacketType {
    /// True for the two packet types the server answers with a node list.
    pub fn is_directory_request(self) -> bool {
        matches!(self, PacketType::ListRequest | PacketType::AnnounceForDuty)
    }
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'D' => Ok(PacketType::Domain),
            b'L' => Ok(PacketType::ListRequest),
            b'C' => Ok(PacketType::AnnounceForDuty),
            b's' => Ok(PacketType::CreateAssignment),
            other => Err(WireError::UnknownPacketType(other)),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(p: PacketType) -> u8 {
        p as u8
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

/// Leading two bytes of every domain protocol datagram.
///
/// Wire size: 2 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct PacketHeader {
    pub packet_type: u8,
    pub version: u8,
}

assert_eq_size!(PacketHeader, [u8; HEADER_LEN]);

impl PacketHeader {
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type: packet_type.into(),
            version: PROTOCOL_VERSION,
        }
    }

    /// Number of bytes the header occupies on the wire.
    pub const fn header_len(&self) -> usize {
        HEADER_LEN
    }

    pub fn version_matches(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

/// Read the header off the front of a datagram.
pub fn decode_header(buf: &[u8]) -> Result<PacketHeader, WireError> {
    PacketHeader::read_from_prefix(buf).ok_or(WireError::MalformedPacket {
        len: buf.len(),
        needed: HEADER_LEN,
    })
}

/// Does the datagram carry the protocol version this build speaks?
/// Truncated datagrams never match.
pub fn version_matches(buf: &[u8]) -> bool {
    decode_header(buf).map(|h| h.version_matches()).unwrap_or(false)
}

// ── Addresses & Identifiers ───────────────────────────────────────────────────

/// An IPv4 socket address as carried on the wire.
///
/// Wire size: 7 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct PackedAddress {
    pub family: u8,
    pub ip: [u8; 4],
    /// Big-endian port.
    pub port: [u8; 2],
}

assert_eq_size!(PackedAddress, [u8; ADDRESS_LEN]);

impl From<&SocketAddrV4> for PackedAddress {
    fn from(addr: &SocketAddrV4) -> Self {
        Self {
            family: ADDRESS_FAMILY_INET,
            ip: addr.ip().octets(),
            port: addr.port().to_be_bytes(),
        }
    }
}

impl TryFrom<PackedAddress> for SocketAddrV4 {
    type Error = WireError;

    fn try_from(packed: PackedAddress) -> Result<Self, Self::Error> {
        if packed.family != ADDRESS_FAMILY_INET {
            return Err(WireError::UnknownAddressFamily(packed.family));
        }
        Ok(SocketAddrV4::new(
            Ipv4Addr::from(packed.ip),
            u16::from_be_bytes(packed.port),
        ))
    }
}

pub fn pack_address(addr: &SocketAddrV4) -> [u8; ADDRESS_LEN] {
    let mut out = [0u8; ADDRESS_LEN];
    out.copy_from_slice(PackedAddress::from(addr).as_bytes());
    out
}

pub fn unpack_address(bytes: &[u8]) -> Result<SocketAddrV4, WireError> {
    let packed = PackedAddress::read_from_prefix(bytes).ok_or(WireError::MalformedPacket {
        len: bytes.len(),
        needed: ADDRESS_LEN,
    })?;
    SocketAddrV4::try_from(packed)
}

pub fn pack_identifier(id: NodeId) -> [u8; IDENTIFIER_LEN] {
    id.0.to_be_bytes()
}

pub fn unpack_identifier(bytes: &[u8]) -> Result<NodeId, WireError> {
    match bytes {
        [hi, lo, ..] => Ok(NodeId(u16::from_be_bytes([*hi, *lo]))),
        _ => Err(WireError::MalformedPacket {
            len: bytes.len(),
            needed: IDENTIFIER_LEN,
        }),
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

/// Fixed-size front of a ListRequest / AnnounceForDuty datagram.
/// The interest tags follow it directly.
///
/// Wire size: 11 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct RequestPrefix {
    pub header: PacketHeader,
    pub sender_type: u8,
    pub local_address: PackedAddress,
    pub interest_count: u8,
}

assert_eq_size!(RequestPrefix, [u8; 11]);

/// A decoded directory request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub packet_type: PacketType,
    pub sender_type: NodeType,
    pub local_address: SocketAddrV4,
    pub interests: InterestSet,
}

impl Request {
    /// Encode the request the way a node sends it.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut w = PacketWriter::new(self.packet_type);
        w.put_u8(self.sender_type.into())?;
        w.put_address(&self.local_address)?;
        let count = u8::try_from(self.interests.len()).map_err(|_| WireError::Overflow {
            needed: self.interests.len(),
            remaining: u8::MAX as usize,
        })?;
        w.put_u8(count)?;
        for t in self.interests.iter() {
            w.put_u8(t.into())?;
        }
        Ok(w.freeze())
    }
}

/// Decode a directory request. Does not check the version; callers gate on
/// [`version_matches`] first so mismatched peers are ignored, not rejected.
pub fn decode_request(buf: &[u8]) -> Result<Request, WireError> {
    let prefix = RequestPrefix::read_from_prefix(buf).ok_or(WireError::MalformedPacket {
        len: buf.len(),
        needed: std::mem::size_of::<RequestPrefix>(),
    })?;

    let packet_type = PacketType::try_from(prefix.header.packet_type)?;
    let sender_type = NodeType::try_from(prefix.sender_type)?;
    let local_address = SocketAddrV4::try_from(prefix.local_address)?;

    let tags = &buf[std::mem::size_of::<RequestPrefix>()..];
    let count = prefix.interest_count as usize;
    if tags.len() < count {
        return Err(WireError::MalformedPacket {
            len: buf.len(),
            needed: std::mem::size_of::<RequestPrefix>() + count,
        });
    }

    Ok(Request {
        packet_type,
        sender_type,
        local_address,
        interests: InterestSet::from_tags(&tags[..count]),
    })
}

// ── Packet Writer ─────────────────────────────────────────────────────────────

/// Bounded output buffer for building a datagram.
///
/// Every write checks the remaining capacity first and fails with
/// [`WireError::Overflow`] rather than growing past the bound.
#[derive(Debug)]
pub struct PacketWriter {
    buf: BytesMut,
    capacity: usize,
}

impl PacketWriter {
    /// Start a packet of the given type, bounded by [`MAX_PACKET_SIZE`].
    pub fn new(packet_type: PacketType) -> Self {
        Self::with_capacity(packet_type, MAX_PACKET_SIZE)
    }

    /// Start a packet with a custom bound. The bound never drops below the
    /// header size.
    pub fn with_capacity(packet_type: PacketType, capacity: usize) -> Self {
        let capacity = capacity.max(HEADER_LEN);
        let mut buf = BytesMut::with_capacity(capacity);
        buf.put_slice(PacketHeader::new(packet_type).as_bytes());
        Self { buf, capacity }
    }

    /// Write cursor: bytes written so far, header included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Fail unless `n` more bytes fit.
    pub fn ensure(&self, n: usize) -> Result<(), WireError> {
        if n > self.remaining() {
            return Err(WireError::Overflow {
                needed: n,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), WireError> {
        self.ensure(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.ensure(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub fn put_identifier(&mut self, id: NodeId) -> Result<(), WireError> {
        self.put_slice(&pack_identifier(id))
    }

    pub fn put_address(&mut self, addr: &SocketAddrV4) -> Result<(), WireError> {
        self.put_slice(&pack_address(addr))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Append one reply entry. The entry is written whole or not at all.
pub fn encode_node_entry(
    w: &mut PacketWriter,
    node_type: NodeType,
    id: NodeId,
    public_address: &SocketAddrV4,
    local_address: &SocketAddrV4,
) -> Result<(), WireError> {
    w.ensure(NODE_ENTRY_LEN)?;
    w.put_u8(node_type.into())?;
    w.put_identifier(id)?;
    w.put_address(public_address)?;
    w.put_address(local_address)?;
    Ok(())
}

/// One decoded reply entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeEntry {
    pub node_type: NodeType,
    pub id: NodeId,
    pub public_address: SocketAddrV4,
    pub local_address: SocketAddrV4,
}

/// A decoded domain reply: the peer entries plus the requester's own id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainReply {
    pub entries: Vec<NodeEntry>,
    pub own_id: NodeId,
}

/// Decode a reply as a node would. Used by tests and tooling.
pub fn decode_reply(buf: &[u8]) -> Result<DomainReply, WireError> {
    let header = decode_header(buf)?;
    let packet_type = PacketType::try_from(header.packet_type)?;
    if packet_type != PacketType::Domain {
        return Err(WireError::UnknownPacketType(header.packet_type));
    }

    let body = &buf[HEADER_LEN..];
    if body.len() < IDENTIFIER_LEN || (body.len() - IDENTIFIER_LEN) % NODE_ENTRY_LEN != 0 {
        return Err(WireError::MalformedPacket {
            len: buf.len(),
            needed: HEADER_LEN + IDENTIFIER_LEN,
        });
    }

    let (entry_bytes, trailer) = body.split_at(body.len() - IDENTIFIER_LEN);
    let mut entries = Vec::with_capacity(entry_bytes.len() / NODE_ENTRY_LEN);
    for chunk in entry_bytes.chunks_exact(NODE_ENTRY_LEN) {
        entries.push(NodeEntry {
            node_type: NodeType::try_from(chunk[0])?,
            id: unpack_identifier(&chunk[1..])?,
            public_address: unpack_address(&chunk[1 + IDENTIFIER_LEN..])?,
            local_address: unpack_address(&chunk[1 + IDENTIFIER_LEN + ADDRESS_LEN..])?,
        });
    }

    Ok(DomainReply {
        entries,
        own_id: unpack_identifier(trailer)?,
    })
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting or building wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed packet: {len} bytes, need at least {needed}")]
    MalformedPacket { len: usize, needed: usize },

    #[error("unknown packet type: 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("unknown node type: 0x{0:02x}")]
    UnknownNodeType(u8),

    #[error("unknown address family: {0}")]
    UnknownAddressFamily(u8),

    #[error("unknown assignment command: {0}")]
    UnknownAssignmentCommand(u8),

    #[error("assignment pool is not a NUL-terminated UTF-8 string")]
    InvalidPool,

    #[error("packet overflow: {needed} bytes needed, {remaining} remaining")]
    Overflow { needed: usize, remaining: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
