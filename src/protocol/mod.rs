//! Protocol module
//!
//! Wire-level pieces of the 317 game protocol used by the world:
//! - Packet framing and outgoing message builders
//! - Inbound message decoding (chat, commands, walking)

pub mod inbound;
pub mod packets;

pub use inbound::{InboundAction, MessageReader, MessageRepository};
pub use packets::{IncomingGamePacket, OutgoingGamePacket, PacketSize};
