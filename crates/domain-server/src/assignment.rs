//! Requests missing singleton services from the assignment server.
//!
//! Runs on every assignment tick. Each provisionable type with no live
//! instance gets one Create request; the assignment server is responsible
//! for not spawning duplicates, so repeating the request is harmless.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use domain_core::{Assignment, NodeType};
use domain_services::NodeRegistry;

pub struct AssignmentDispatcher {
    socket: Arc<UdpSocket>,
    server: SocketAddr,
    pool: Option<String>,
}

impl AssignmentDispatcher {
    pub fn new(socket: Arc<UdpSocket>, server: SocketAddr, pool: Option<String>) -> Self {
        Self {
            socket,
            server,
            pool,
        }
    }

    /// Provisionable singleton types with no live node.
    pub fn missing_types(registry: &NodeRegistry) -> Vec<NodeType> {
        NodeType::ALL
            .into_iter()
            .filter(|t| t.is_provisionable() && !registry.has_node_of_type(*t))
            .collect()
    }

    /// Send a Create assignment for every missing type. Returns how many
    /// requests went out.
    pub async fn dispatch_missing(&self, registry: &NodeRegistry) -> usize {
        let mut sent = 0;
        for target in Self::missing_types(registry) {
            let assignment = Assignment::create(target, self.pool.clone());
            let bytes = match assignment.encode() {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(error = %e, node_type = %target, "cannot encode assignment");
                    continue;
                }
            };
            match self.socket.send_to(&bytes, self.server).await {
                Ok(_) => {
                    tracing::trace!(node_type = %target, server = %self.server, "assignment requested");
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, server = %self.server, "assignment send failed")
                }
            }
        }
        sent
    }
}
