//! Protocol Messages
//!
//! Every message is built by the sender right before transmission and dropped
//! by the receiver right after dispatch.
use crate::membership::MemberDigest;
use crate::node::NodeIdentity;

/// Wire discriminant carried in the one-byte message header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    JoinRequest = 0,
    JoinReply = 1,
    Gossip = 2,
}

impl TryFrom<u8> for MessageType {
    type Error = crate::error::DecodeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(MessageType::JoinRequest),
            1 => Ok(MessageType::JoinReply),
            2 => Ok(MessageType::Gossip),
            other => Err(crate::error::DecodeError::UnknownMessageType(other)),
        }
    }
}

/// All message types exchanged between members
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolMessage {
    /// A node asking the introducer to let it into the group
    JoinRequest {
        identity: NodeIdentity,
        heartbeat: i64,
    },

    /// The responder's full table, sent back to a joiner
    JoinReply { entries: Vec<MemberDigest> },

    /// Periodic full-table push to a random peer
    Gossip { entries: Vec<MemberDigest> },
}

impl ProtocolMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ProtocolMessage::JoinRequest { .. } => MessageType::JoinRequest,
            ProtocolMessage::JoinReply { .. } => MessageType::JoinReply,
            ProtocolMessage::Gossip { .. } => MessageType::Gossip,
        }
    }

    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolMessage::JoinRequest { .. } => "join_request",
            ProtocolMessage::JoinReply { .. } => "join_reply",
            ProtocolMessage::Gossip { .. } => "gossip",
        }
    }
}
