//! Packet framing
//!
//! Defines packet sizes and the incoming/outgoing frame types exchanged
//! with the connection layer, plus builders for the outbound messages the
//! world sends on its own.

use bytes::Bytes;

use crate::error::{ProtocolError, Result};
use crate::game::position::Position;
use crate::net::buffer::PacketBuffer;

/// Player update
pub const PLAYER_UPDATE_OPCODE: u8 = 81;

/// Map region change
pub const MAP_REGION_OPCODE: u8 = 73;

/// Chatbox game message
pub const SYSTEM_MESSAGE_OPCODE: u8 = 253;

/// Packet size type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSize {
    /// Fixed size packet
    Fixed(usize),
    /// Variable size (1 byte length prefix)
    VariableByte,
    /// Variable size (2 byte length prefix)
    VariableShort,
}

impl PacketSize {
    /// Largest payload the size type can describe
    pub fn max_payload(&self) -> usize {
        match self {
            PacketSize::Fixed(size) => *size,
            PacketSize::VariableByte => u8::MAX as usize,
            PacketSize::VariableShort => u16::MAX as usize,
        }
    }

    /// Check if this is a variable length packet
    pub fn is_variable(&self) -> bool {
        matches!(self, PacketSize::VariableByte | PacketSize::VariableShort)
    }
}

/// Incoming game packet, already stripped of its opcode and length
#[derive(Debug, Clone)]
pub struct IncomingGamePacket {
    /// Packet opcode (decrypted)
    pub opcode: u8,
    /// Packet data
    pub data: Vec<u8>,
}

impl IncomingGamePacket {
    /// Create a new incoming packet
    pub fn new(opcode: u8, data: Vec<u8>) -> Self {
        Self { opcode, data }
    }

    /// Payload length in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get a packet buffer for reading the data
    pub fn buffer(&self) -> PacketBuffer {
        PacketBuffer::from_bytes(&self.data)
    }
}

/// Outgoing game packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingGamePacket {
    /// Packet opcode
    pub opcode: u8,
    /// Packet data
    pub data: Bytes,
    /// Length prefix type
    pub size: PacketSize,
}

impl OutgoingGamePacket {
    /// Create a fixed-length packet
    pub fn fixed(opcode: u8, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = PacketSize::Fixed(data.len());
        Self { opcode, data, size }
    }

    /// Create a packet with a one byte length prefix
    pub fn variable_byte(opcode: u8, data: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            data: data.into(),
            size: PacketSize::VariableByte,
        }
    }

    /// Create a packet with a two byte length prefix
    pub fn variable_short(opcode: u8, data: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            data: data.into(),
            size: PacketSize::VariableShort,
        }
    }

    /// Frame the packet: opcode, optional length prefix, payload.
    ///
    /// Opcode ciphering is left to the connection layer.
    pub fn encode(&self) -> Result<Bytes> {
        let len = self.data.len();
        if len > self.size.max_payload() {
            return Err(ProtocolError::PacketTooLarge {
                size: len,
                max: self.size.max_payload(),
            }
            .into());
        }

        let mut buffer = PacketBuffer::with_capacity(3 + len);
        buffer.write_ubyte(self.opcode);
        match self.size {
            PacketSize::Fixed(_) => {}
            PacketSize::VariableByte => buffer.write_ubyte(len as u8),
            PacketSize::VariableShort => buffer.write_ushort(len as u16),
        }
        buffer.write_bytes(&self.data);
        Ok(buffer.into_inner().freeze())
    }
}

/// Build a chatbox game message
pub fn build_system_message(message: &str) -> OutgoingGamePacket {
    let mut buffer = PacketBuffer::with_capacity(message.len() + 1);
    buffer.write_string(message);
    OutgoingGamePacket::variable_byte(SYSTEM_MESSAGE_OPCODE, buffer.into_inner().freeze())
}

/// Build the map region message that makes the client load the 104x104
/// area centred on `position`
pub fn build_map_region(position: Position) -> OutgoingGamePacket {
    let mut buffer = PacketBuffer::with_capacity(4);
    buffer.write_short_a(position.chunk_x());
    buffer.write_ushort(position.chunk_y());
    OutgoingGamePacket::fixed(MAP_REGION_OPCODE, buffer.into_inner().freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fixed_encode() {
        let packet = OutgoingGamePacket::fixed(10, vec![1, 2, 3]);
        assert_eq!(packet.size, PacketSize::Fixed(3));
        assert_eq!(&packet.encode().unwrap()[..], &[10, 1, 2, 3]);
    }

    #[test]
    fn test_variable_encode() {
        let packet = OutgoingGamePacket::variable_byte(20, vec![9, 9]);
        assert_eq!(&packet.encode().unwrap()[..], &[20, 2, 9, 9]);

        let packet = OutgoingGamePacket::variable_short(81, vec![7; 300]);
        let encoded = packet.encode().unwrap();
        assert_eq!(&encoded[..3], &[81, 0x01, 0x2C]);
        assert_eq!(encoded.len(), 303);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let packet = OutgoingGamePacket::variable_byte(253, vec![0; 256]);
        assert!(packet.encode().is_err());
    }

    #[test]
    fn test_system_message() {
        let packet = build_system_message("Hi");
        assert_eq!(&packet.encode().unwrap()[..], &[253, 3, b'H', b'i', 10]);
    }

    #[test]
    fn test_map_region() {
        let packet = build_map_region(Position::new(3222, 3218, 0));
        // 3222 >> 3 = 402 = 0x0192, low byte of x carries the A transform
        assert_eq!(
            &packet.encode().unwrap()[..],
            &[73, 0x01, 0x12, 0x01, 0x92]
        );
    }

    #[test]
    fn test_incoming_buffer() {
        let packet = IncomingGamePacket::new(4, vec![1, 2]);
        assert_eq!(packet.size(), 2);
        assert_eq!(packet.buffer().read_ushort(), 0x0102);
    }
}
