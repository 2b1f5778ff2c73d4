//! domain-server: the UDP directory service nodes check in with.

pub mod assignment;
pub mod net;
pub mod reaper;
pub mod server;

pub use assignment::AssignmentDispatcher;
pub use reaper::LivenessReaper;
pub use server::{Directory, Outbound, ServerLoop, ServerSettings};
