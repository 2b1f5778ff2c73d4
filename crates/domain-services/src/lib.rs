//! domain-services: the live node directory, reply construction and stats
//! sinks shared by the daemon and the status page.

pub mod broadcast;
pub mod clock;
pub mod metrics;
pub mod registry;

pub use broadcast::{BroadcastBuilder, Reply, Requester};
pub use clock::{usec_now, Micros};
pub use metrics::{MemorySink, MetricsSink, StatKind, TracingSink, UdpStatsSink, NODE_COUNT_KEY};
pub use registry::{new_registry, Node, NodeRegistry, SharedRegistry};
