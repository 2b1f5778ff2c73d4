//! Node registry: the domain server's live directory.
//!
//! Written by the server loop on every check-in, pruned by the reaper and
//! read by the status page. A single mutex guards the whole directory so a
//! scan-and-remove can never interleave with an add-or-update or a snapshot
//! taken for a reply.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use domain_core::{NodeId, NodeType};

use crate::clock::{duration_micros, Micros};

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Address the node's datagrams arrive from. The IP is zero when the
    /// node shares a host with the domain server.
    pub public_address: SocketAddrV4,
    /// Address the node reports for itself on its own network.
    pub local_address: SocketAddrV4,
    /// Last valid check-in.
    pub last_heard: Micros,
    /// Last time this node became the active instance of its singleton type.
    /// Zero until set.
    pub wake: Micros,
}

impl Node {
    /// Does this record belong to the given identity triple?
    pub fn matches(
        &self,
        public_address: &SocketAddrV4,
        local_address: &SocketAddrV4,
        node_type: NodeType,
    ) -> bool {
        self.node_type == node_type
            && self.public_address == *public_address
            && self.local_address == *local_address
    }

    /// The address the server should use to reach this node: the local one
    /// when the public IP is the zero sentinel, otherwise the public one.
    pub fn active_address(&self) -> SocketAddrV4 {
        if *self.public_address.ip() == Ipv4Addr::UNSPECIFIED {
            self.local_address
        } else {
            self.public_address
        }
    }
}

/// The node directory. Construct one per server and share it with
/// [`SharedRegistry`].
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Mutex<Vec<Node>>,
}

/// The registry as handed to the server loop, the reaper and the status page.
pub type SharedRegistry = Arc<NodeRegistry>;

/// Create a new empty shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(NodeRegistry::new())
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the record for an identity triple, or create one with
    /// `candidate_id`, and mark it heard at `now`.
    ///
    /// Returns the node and whether it was created. The caller advances its
    /// id counter only when `created` is true.
    pub fn add_or_update(
        &self,
        public_address: SocketAddrV4,
        local_address: SocketAddrV4,
        node_type: NodeType,
        candidate_id: NodeId,
        now: Micros,
    ) -> (Node, bool) {
        self.check_in(public_address, local_address, node_type, candidate_id, now, false)
    }

    /// [`add_or_update`](Self::add_or_update) that also stamps `wake` when
    /// `woke` is set. Lookup and timestamps happen under one lock, so a
    /// concurrent [`remove_stale`](Self::remove_stale) sees either the old
    /// record or the refreshed one.
    pub fn check_in(
        &self,
        public_address: SocketAddrV4,
        local_address: SocketAddrV4,
        node_type: NodeType,
        candidate_id: NodeId,
        now: Micros,
        woke: bool,
    ) -> (Node, bool) {
        let mut nodes = self.nodes.lock();

        if let Some(node) = nodes
            .iter_mut()
            .find(|n| n.matches(&public_address, &local_address, node_type))
        {
            node.last_heard = now;
            if woke {
                node.wake = now;
            }
            return (node.clone(), false);
        }

        let node = Node {
            id: candidate_id,
            node_type,
            public_address,
            local_address,
            last_heard: now,
            wake: if woke { now } else { 0 },
        };
        nodes.push(node.clone());
        tracing::debug!(
            id = %node.id,
            node_type = %node.node_type,
            public = %node.public_address,
            local = %node.local_address,
            "node added"
        );
        (node, true)
    }

    pub fn get(&self, id: NodeId) -> Option<Node> {
        self.nodes.lock().iter().find(|n| n.id == id).cloned()
    }

    /// Copy of every live node in insertion order.
    pub fn snapshot(&self) -> Vec<Node> {
        self.nodes.lock().clone()
    }

    /// Traverse the live nodes. Each call takes a fresh snapshot, so the
    /// traversal can be restarted at will without holding the lock.
    pub fn iter(&self) -> std::vec::IntoIter<Node> {
        self.snapshot().into_iter()
    }

    pub fn count_alive(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    pub fn has_node_of_type(&self, node_type: NodeType) -> bool {
        self.nodes.lock().iter().any(|n| n.node_type == node_type)
    }

    /// Record a check-in. Returns false if the node is gone.
    pub fn touch_heard(&self, id: NodeId, timestamp: Micros) -> bool {
        self.update(id, |n| n.last_heard = timestamp)
    }

    /// Record that the node became the active instance of its type.
    /// Returns false if the node is gone.
    pub fn touch_wake(&self, id: NodeId, timestamp: Micros) -> bool {
        self.update(id, |n| n.wake = timestamp)
    }

    /// Remove every node not heard from within `timeout` of `now`.
    /// Returns how many were removed.
    pub fn remove_stale(&self, timeout: Duration, now: Micros) -> usize {
        let deadline = now.saturating_sub(duration_micros(timeout));
        let mut nodes = self.nodes.lock();
        let before = nodes.len();
        nodes.retain(|n| {
            let alive = n.last_heard >= deadline;
            if !alive {
                tracing::info!(
                    id = %n.id,
                    node_type = %n.node_type,
                    addr = %n.active_address(),
                    "node timed out"
                );
            }
            alive
        });
        before - nodes.len()
    }

    fn update(&self, id: NodeId, f: impl FnOnce(&mut Node)) -> bool {
        match self.nodes.lock().iter_mut().find(|n| n.id == id) {
            Some(node) => {
                f(node);
                true
            }
            None => false,
        }
    }
}
