//! Node identity types shared by the codec, the registry and the status page.

use std::fmt;

use crate::wire::WireError;

// ── Node Type ────────────────────────────────────────────────────────────────

/// Kind of participant announcing itself to the domain server.
///
/// The discriminant is the one-byte tag carried on the wire. The derived
/// `Ord` compares discriminants, so singleton entries are appended to a
/// reply in tag order (`D`, `M`, `V`, `W`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum NodeType {
    /// The domain server itself.
    Domain = b'D',
    /// Mixes positional audio for every agent in the domain.
    AudioMixer = b'M',
    /// Relays avatar state between agents.
    AvatarMixer = b'W',
    VoxelServer = b'V',
    /// An interactive client.
    Agent = b'I',
    AudioInjector = b'A',
    AnimationServer = b'a',
}

impl NodeType {
    /// Every known node type, in declaration order.
    pub const ALL: [NodeType; 7] = [
        NodeType::Domain,
        NodeType::AudioMixer,
        NodeType::AvatarMixer,
        NodeType::VoxelServer,
        NodeType::Agent,
        NodeType::AudioInjector,
        NodeType::AnimationServer,
    ];

    /// Singleton types of which at most one instance is ever broadcast.
    pub fn is_singleton(self) -> bool {
        matches!(
            self,
            NodeType::Domain | NodeType::AudioMixer | NodeType::AvatarMixer | NodeType::VoxelServer
        )
    }

    /// Singleton services the assignment server can spawn on demand.
    pub fn is_provisionable(self) -> bool {
        matches!(self, NodeType::AudioMixer | NodeType::AvatarMixer)
    }

    /// Human-readable name, as shown on the status page.
    pub fn name(self) -> &'static str {
        match self {
            NodeType::Domain => "Domain",
            NodeType::AudioMixer => "Audio Mixer",
            NodeType::AvatarMixer => "Avatar Mixer",
            NodeType::VoxelServer => "Voxel Server",
            NodeType::Agent => "Agent",
            NodeType::AudioInjector => "Audio Injector",
            NodeType::AnimationServer => "Animation Server",
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for NodeType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.tag() == value)
            .ok_or(WireError::UnknownNodeType(value))
    }
}

impl From<NodeType> for u8 {
    fn from(t: NodeType) -> u8 {
        t as u8
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Node Id ──────────────────────────────────────────────────────────────────

/// Server-assigned node identifier. Two bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u16);

impl NodeId {
    /// First id handed out by a fresh server.
    pub const FIRST: NodeId = NodeId(1);

    /// The id after this one. Wraps at u16::MAX; creation is reported
    /// explicitly by the registry, so a wrapped counter is never mistaken
    /// for an existing record.
    pub fn next(self) -> NodeId {
        NodeId(self.0.wrapping_add(1))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Interest Set ─────────────────────────────────────────────────────────────

/// The node types a requester wants to hear about.
///
/// Tags that do not name a known type are dropped at parse time; they could
/// never match a registered node anyway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestSet(Vec<NodeType>);

impl InterestSet {
    pub fn new(types: impl IntoIterator<Item = NodeType>) -> Self {
        let mut set = Vec::new();
        for t in types {
            if !set.contains(&t) {
                set.push(t);
            }
        }
        Self(set)
    }

    pub fn from_tags(tags: &[u8]) -> Self {
        Self::new(tags.iter().filter_map(|&b| NodeType::try_from(b).ok()))
    }

    pub fn contains(&self, t: NodeType) -> bool {
        self.0.contains(&t)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeType> + '_ {
        self.0.iter().copied()
    }
}
