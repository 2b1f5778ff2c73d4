//! Reply construction: the interest-filtered node list sent back to every
//! requester.
//!
//! Non-singleton nodes are written as they are found. Singleton types are
//! held back during the scan and only the instance with the newest wake
//! timestamp is written once the scan is over, so a node never learns about
//! more than one mixer of a kind.

use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use bytes::Bytes;

use domain_core::wire::{
    encode_node_entry, PacketWriter, IDENTIFIER_LEN, MAX_PACKET_SIZE, NODE_ENTRY_LEN,
};
use domain_core::{InterestSet, NodeId, NodeType, PacketType};

use crate::registry::Node;

/// The node a reply is being built for.
#[derive(Debug, Clone, Copy)]
pub struct Requester {
    pub id: NodeId,
    pub node_type: NodeType,
    pub public_address: SocketAddrV4,
    pub local_address: SocketAddrV4,
}

impl Requester {
    pub fn is(&self, node: &Node) -> bool {
        node.matches(&self.public_address, &self.local_address, self.node_type)
    }
}

impl From<&Node> for Requester {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            node_type: node.node_type,
            public_address: node.public_address,
            local_address: node.local_address,
        }
    }
}

/// A finished reply datagram.
#[derive(Debug, Clone)]
pub struct Reply {
    pub bytes: Bytes,
    /// Peer entries written.
    pub entries: usize,
    /// Entries left out because the datagram was full.
    pub dropped: usize,
}

impl Reply {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped > 0
    }
}

/// Builds replies bounded by a maximum datagram size.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastBuilder {
    max_packet_size: usize,
}

impl Default for BroadcastBuilder {
    fn default() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }
}

impl BroadcastBuilder {
    pub fn new(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }

    /// Build the reply for `requester` from the live node sequence.
    pub fn build<'a>(
        &self,
        requester: &Requester,
        interests: &InterestSet,
        nodes: impl IntoIterator<Item = &'a Node>,
    ) -> Reply {
        let mut w = PacketWriter::with_capacity(PacketType::Domain, self.max_packet_size);
        let mut entries = 0;
        let mut dropped = 0;

        // The requester's id always goes last; keep room for it.
        let limit = w.capacity().saturating_sub(IDENTIFIER_LEN);
        let mut append = |w: &mut PacketWriter, node: &Node| {
            let fits = w.len() + NODE_ENTRY_LEN <= limit;
            let written = fits
                && encode_node_entry(
                    w,
                    node.node_type,
                    node.id,
                    &node.public_address,
                    &node.local_address,
                )
                .is_ok();
            if written {
                entries += 1;
            } else {
                dropped += 1;
            }
        };

        if !interests.is_empty() {
            let mut newest_singletons: BTreeMap<NodeType, &Node> = BTreeMap::new();

            for node in nodes {
                if requester.is(node) || !interests.contains(node.node_type) {
                    continue;
                }

                if node.node_type.is_singleton() {
                    let newest = newest_singletons.entry(node.node_type).or_insert(node);
                    if newest.wake < node.wake {
                        *newest = node;
                    }
                    continue;
                }

                // Agents learn about each other through the avatar mixer.
                if requester.node_type == NodeType::Agent && node.node_type == NodeType::Agent {
                    continue;
                }

                append(&mut w, node);
            }

            for node in newest_singletons.into_values() {
                append(&mut w, node);
            }
        }

        // Room was reserved above, so this only fails for a capacity below
        // header + identifier, in which case the reply is just the header.
        if w.put_identifier(requester.id).is_err() {
            tracing::warn!(capacity = w.capacity(), "no room for requester id in reply");
        }

        Reply {
            bytes: w.freeze(),
            entries,
            dropped,
        }
    }
}
