//! Membership protocol wire messages and their codec.
pub mod codec;
pub mod messages;

pub use codec::{
    decode, encode, encoded_len, ENTRY_WIRE_LEN, MAX_ENTRIES_PER_MESSAGE, MAX_MESSAGE_LEN,
};
pub use messages::{MessageType, ProtocolMessage};
