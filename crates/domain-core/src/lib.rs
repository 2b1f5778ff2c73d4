//! domain-core: wire format, node types and configuration for the domain
//! server. Every other crate in the workspace depends on this one.

pub mod assignment;
pub mod config;
pub mod node;
pub mod wire;

pub use assignment::{Assignment, AssignmentCommand};
pub use node::{InterestSet, NodeId, NodeType};
pub use wire::{PacketType, PacketWriter, Request, WireError};
