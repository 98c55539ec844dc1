//! Fixed-layout wire codec
//!
//! All integers are big-endian. Layout:
//!
//! ```text
//! header        msg_type: u8          JOIN_REQUEST=0, JOIN_REPLY=1, GOSSIP=2
//! JOIN_REQUEST  ip: u32, port: u16, heartbeat: i64
//! JOIN_REPLY    count: u32, count x entry
//! GOSSIP        count: u32, count x entry
//! entry         ip: u32, port: u16, heartbeat: i64, status: u8
//! ```
//!
//! Every length is checked before a field is read; any mismatch is a
//! `DecodeError`.
use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::messages::{MessageType, ProtocolMessage};
use crate::error::DecodeError;
use crate::membership::{MemberDigest, MemberStatus};
use crate::node::NodeIdentity;

const HEADER_LEN: usize = 1;
const IDENTITY_LEN: usize = 4 + 2;
const JOIN_REQUEST_BODY_LEN: usize = IDENTITY_LEN + 8;
const COUNT_LEN: usize = 4;

/// Encoded size of one membership entry
pub const ENTRY_WIRE_LEN: usize = IDENTITY_LEN + 8 + 1;

/// Largest message that fits one UDP datagram over IPv4
pub const MAX_MESSAGE_LEN: usize = 65_507;

/// Most entries a single JOIN_REPLY or GOSSIP can carry within `MAX_MESSAGE_LEN`
pub const MAX_ENTRIES_PER_MESSAGE: usize =
    (MAX_MESSAGE_LEN - HEADER_LEN - COUNT_LEN) / ENTRY_WIRE_LEN;

/// Encoded size of `message`
pub fn encoded_len(message: &ProtocolMessage) -> usize {
    match message {
        ProtocolMessage::JoinRequest { .. } => HEADER_LEN + JOIN_REQUEST_BODY_LEN,
        ProtocolMessage::JoinReply { entries } | ProtocolMessage::Gossip { entries } => {
            HEADER_LEN + COUNT_LEN + entries.len() * ENTRY_WIRE_LEN
        }
    }
}

pub fn encode(message: &ProtocolMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(message));
    buf.put_u8(message.message_type() as u8);
    match message {
        ProtocolMessage::JoinRequest {
            identity,
            heartbeat,
        } => {
            put_identity(&mut buf, identity);
            buf.put_i64(*heartbeat);
        }
        ProtocolMessage::JoinReply { entries } | ProtocolMessage::Gossip { entries } => {
            // Callers split tables at MAX_ENTRIES_PER_MESSAGE, far below u32::MAX
            buf.put_u32(entries.len() as u32);
            for entry in entries {
                put_identity(&mut buf, &entry.identity);
                buf.put_i64(entry.heartbeat);
                buf.put_u8(entry.status.to_wire());
            }
        }
    }
    buf.freeze()
}

pub fn decode(data: &[u8]) -> Result<ProtocolMessage, DecodeError> {
    let mut buf = data;
    if !buf.has_remaining() {
        return Err(DecodeError::Empty);
    }
    let message_type = MessageType::try_from(buf.get_u8())?;

    let message = match message_type {
        MessageType::JoinRequest => {
            ensure_remaining(buf, JOIN_REQUEST_BODY_LEN)?;
            let identity = get_identity(&mut buf);
            let heartbeat = buf.get_i64();
            ProtocolMessage::JoinRequest {
                identity,
                heartbeat,
            }
        }
        MessageType::JoinReply => ProtocolMessage::JoinReply {
            entries: decode_entries(&mut buf)?,
        },
        MessageType::Gossip => ProtocolMessage::Gossip {
            entries: decode_entries(&mut buf)?,
        },
    };

    if buf.has_remaining() {
        return Err(DecodeError::TrailingBytes(buf.remaining()));
    }
    Ok(message)
}

fn decode_entries(buf: &mut &[u8]) -> Result<Vec<MemberDigest>, DecodeError> {
    ensure_remaining(*buf, COUNT_LEN)?;
    let count = buf.get_u32();
    let needed = (count as usize)
        .checked_mul(ENTRY_WIRE_LEN)
        .ok_or(DecodeError::CountOverflow(count))?;
    ensure_remaining(*buf, needed)?;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let identity = get_identity(buf);
        let heartbeat = buf.get_i64();
        let status = MemberStatus::from_wire(buf.get_u8())?;
        entries.push(MemberDigest {
            identity,
            heartbeat,
            status,
        });
    }
    Ok(entries)
}

fn ensure_remaining(buf: &[u8], needed: usize) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn put_identity(buf: &mut BytesMut, identity: &NodeIdentity) {
    buf.put_u32(identity.ip());
    buf.put_u16(identity.port());
}

fn get_identity(buf: &mut &[u8]) -> NodeIdentity {
    let ip = buf.get_u32();
    let port = buf.get_u16();
    NodeIdentity::new(ip, port)
}
