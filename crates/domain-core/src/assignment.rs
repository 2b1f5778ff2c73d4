//! Assignment requests: asks the assignment server to spawn a missing
//! singleton service.
//!
//! Wire layout:
//!   [1B CreateAssignment][1B version][1B command][1B node type][pool bytes][0x00]
//!
//! The pool is optional; without one only the NUL terminator is sent.

use bytes::Bytes;

use crate::node::NodeType;
use crate::wire::{decode_header, PacketType, PacketWriter, WireError, HEADER_LEN};

/// UDP port the assignment server listens on.
pub const ASSIGNMENT_SERVER_PORT: u16 = 7007;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AssignmentCommand {
    Create = 0,
}

impl TryFrom<u8> for AssignmentCommand {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AssignmentCommand::Create),
            other => Err(WireError::UnknownAssignmentCommand(other)),
        }
    }
}

/// A fire-and-forget provisioning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub command: AssignmentCommand,
    pub target: NodeType,
    /// Restricts fulfillment to workers in this pool.
    pub pool: Option<String>,
}

impl Assignment {
    pub fn create(target: NodeType, pool: Option<String>) -> Self {
        Self {
            command: AssignmentCommand::Create,
            target,
            pool,
        }
    }

    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut w = PacketWriter::new(PacketType::CreateAssignment);
        w.put_u8(self.command as u8)?;
        w.put_u8(self.target.into())?;
        if let Some(pool) = &self.pool {
            if pool.as_bytes().contains(&0) {
                return Err(WireError::InvalidPool);
            }
            w.put_slice(pool.as_bytes())?;
        }
        w.put_u8(0)?;
        Ok(w.freeze())
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let header = decode_header(buf)?;
        if PacketType::try_from(header.packet_type)? != PacketType::CreateAssignment {
            return Err(WireError::UnknownPacketType(header.packet_type));
        }

        let body = &buf[HEADER_LEN..];
        let [command, target, rest @ ..] = body else {
            return Err(WireError::MalformedPacket {
                len: buf.len(),
                needed: HEADER_LEN + 3,
            });
        };

        let nul = rest.iter().position(|&b| b == 0).ok_or(WireError::InvalidPool)?;
        let pool = match &rest[..nul] {
            [] => None,
            bytes => Some(
                std::str::from_utf8(bytes)
                    .map_err(|_| WireError::InvalidPool)?
                    .to_owned(),
            ),
        };

        Ok(Self {
            command: AssignmentCommand::try_from(*command)?,
            target: NodeType::try_from(*target)?,
            pool,
        })
    }
}
