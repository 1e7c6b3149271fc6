//! Packet buffer implementation
//!
//! Provides a byte buffer with 317-protocol read/write operations including:
//! - Standard integer types (byte, short, int, long)
//! - Little-endian variants
//! - Value transforms (byte A/C/S, short A, little-endian short A)
//! - Bit access mode for movement records
//! - Newline-terminated strings

use bytes::{BufMut, BytesMut};

use crate::error::{ProtocolError, Result};

/// Maximum payload of a variable-short packet
pub const MAX_PACKET_SIZE: usize = 65535;

/// String terminator used by the 317 client
pub const STRING_TERMINATOR: u8 = 10;

/// Packet buffer for reading and writing game protocol data
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
    /// Bit access position (in bits)
    bit_pos: usize,
    /// Whether currently in bit access mode
    in_bit_mode: bool,
    /// Whether the active bit mode consumes (rather than produces) bits
    bit_reading: bool,
    /// A byte write was refused during the current bit section
    stray_bytes: bool,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self::wrap(BytesMut::new())
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::wrap(BytesMut::with_capacity(capacity))
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::wrap(BytesMut::from(bytes))
    }

    /// Create a packet buffer by wrapping a BytesMut
    pub fn wrap(data: BytesMut) -> Self {
        Self {
            data,
            read_pos: 0,
            bit_pos: 0,
            in_bit_mode: false,
            bit_reading: false,
            stray_bytes: false,
        }
    }

    // ============ Properties ============

    /// Get the current read position
    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Whether the buffer is currently in bit access mode
    #[inline]
    pub fn in_bit_mode(&self) -> bool {
        self.in_bit_mode
    }

    /// Current bit cursor, meaningful only in bit access mode
    #[inline]
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the underlying BytesMut
    #[inline]
    pub fn into_inner(self) -> BytesMut {
        self.data
    }

    /// Clear the buffer and reset positions, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
        self.bit_pos = 0;
        self.in_bit_mode = false;
        self.bit_reading = false;
        self.stray_bytes = false;
    }

    /// Fail with a malformed-packet error unless `count` bytes can be read
    pub fn ensure_remaining(&self, count: usize) -> Result<()> {
        if self.remaining() < count {
            return Err(ProtocolError::InvalidPacketSize {
                expected: self.read_pos + count,
                actual: self.data.len(),
            }
            .into());
        }
        Ok(())
    }

    // ============ Reading Methods ============

    /// Read a signed byte
    pub fn read_byte(&mut self) -> i8 {
        self.read_ubyte() as i8
    }

    /// Read an unsigned byte
    pub fn read_ubyte(&mut self) -> u8 {
        if self.read_pos >= self.data.len() {
            return 0;
        }
        let value = self.data[self.read_pos];
        self.read_pos += 1;
        value
    }

    /// Read an unsigned big-endian short (2 bytes)
    pub fn read_ushort(&mut self) -> u16 {
        let b1 = self.read_ubyte() as u16;
        let b2 = self.read_ubyte() as u16;
        (b1 << 8) | b2
    }

    /// Read an unsigned little-endian short (2 bytes)
    pub fn read_ushort_le(&mut self) -> u16 {
        let b1 = self.read_ubyte() as u16;
        let b2 = self.read_ubyte() as u16;
        (b2 << 8) | b1
    }

    /// Read byte A (value - 128)
    pub fn read_byte_a(&mut self) -> u8 {
        self.read_ubyte().wrapping_sub(128)
    }

    /// Read byte C (negated)
    pub fn read_byte_c(&mut self) -> i8 {
        self.read_byte().wrapping_neg()
    }

    /// Read byte S (128 - value)
    pub fn read_byte_s(&mut self) -> u8 {
        128u8.wrapping_sub(self.read_ubyte())
    }

    /// Read little-endian short A
    pub fn read_ushort_le_a(&mut self) -> u16 {
        let b1 = self.read_ubyte().wrapping_sub(128) as u16;
        let b2 = self.read_ubyte() as u16;
        (b2 << 8) | b1
    }

    /// Read a newline-terminated string
    pub fn read_string(&mut self) -> String {
        let mut bytes = Vec::new();
        while self.has_remaining() {
            let b = self.read_ubyte();
            if b == STRING_TERMINATOR {
                break;
            }
            bytes.push(b);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Read a specific number of bytes
    pub fn read_bytes(&mut self, length: usize) -> Vec<u8> {
        let end = (self.read_pos + length).min(self.data.len());
        let bytes = self.data[self.read_pos..end].to_vec();
        self.read_pos = end;
        bytes
    }

    /// Read `length` bytes stored back to front, undoing the A transform
    pub fn read_bytes_reversed_a(&mut self, length: usize) -> Vec<u8> {
        let mut bytes = self.read_bytes(length);
        bytes.reverse();
        for b in &mut bytes {
            *b = b.wrapping_sub(128);
        }
        bytes
    }

    // ============ Writing Methods (Big-Endian) ============

    /// Byte writes are refused inside a bit section; `end_bit_access` reports it
    fn byte_access(&mut self) -> bool {
        if self.in_bit_mode {
            self.stray_bytes = true;
            return false;
        }
        true
    }

    /// Write a signed byte
    pub fn write_byte(&mut self, value: i8) {
        if self.byte_access() {
            self.data.put_i8(value);
        }
    }

    /// Write an unsigned byte
    pub fn write_ubyte(&mut self, value: u8) {
        if self.byte_access() {
            self.data.put_u8(value);
        }
    }

    /// Write a signed big-endian short (2 bytes)
    pub fn write_short(&mut self, value: i16) {
        if self.byte_access() {
            self.data.put_i16(value);
        }
    }

    /// Write an unsigned big-endian short (2 bytes)
    pub fn write_ushort(&mut self, value: u16) {
        if self.byte_access() {
            self.data.put_u16(value);
        }
    }

    /// Write a signed big-endian int (4 bytes)
    pub fn write_int(&mut self, value: i32) {
        if self.byte_access() {
            self.data.put_i32(value);
        }
    }

    /// Write a signed big-endian long (8 bytes)
    pub fn write_long(&mut self, value: i64) {
        if self.byte_access() {
            self.data.put_i64(value);
        }
    }

    // ============ Writing Methods (Little-Endian) ============

    /// Write an unsigned little-endian short (2 bytes)
    pub fn write_ushort_le(&mut self, value: u16) {
        if self.byte_access() {
            self.data.put_u16_le(value);
        }
    }

    // ============ Transformed Writing Methods ============

    /// Write byte A (value + 128)
    pub fn write_byte_a(&mut self, value: u8) {
        self.write_ubyte(value.wrapping_add(128));
    }

    /// Write byte C (negated)
    pub fn write_byte_c(&mut self, value: u8) {
        self.write_ubyte(value.wrapping_neg());
    }

    /// Write byte S (128 - value)
    pub fn write_byte_s(&mut self, value: u8) {
        self.write_ubyte(128u8.wrapping_sub(value));
    }

    /// Write short A (big-endian with A modifier on second byte)
    pub fn write_short_a(&mut self, value: u16) {
        self.write_ubyte((value >> 8) as u8);
        self.write_ubyte((value as u8).wrapping_add(128));
    }

    /// Write little-endian short A
    pub fn write_ushort_le_a(&mut self, value: u16) {
        self.write_ubyte((value as u8).wrapping_add(128));
        self.write_ubyte((value >> 8) as u8);
    }

    // ============ Strings and Slices ============

    /// Write a newline-terminated string
    pub fn write_string(&mut self, value: &str) {
        if self.byte_access() {
            self.data.extend_from_slice(value.as_bytes());
            self.data.put_u8(STRING_TERMINATOR);
        }
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.byte_access() {
            self.data.extend_from_slice(bytes);
        }
    }

    /// Write bytes in reverse order
    pub fn write_bytes_reversed(&mut self, bytes: &[u8]) {
        for &b in bytes.iter().rev() {
            self.write_ubyte(b);
        }
    }

    // ============ Bit Access ============

    /// Enter bit access mode, appending bits after the current end
    pub fn start_bit_access(&mut self) -> Result<()> {
        if self.in_bit_mode {
            return Err(ProtocolError::BitModeActive.into());
        }
        self.bit_pos = self.data.len() * 8;
        self.in_bit_mode = true;
        self.bit_reading = false;
        Ok(())
    }

    /// Enter bit access mode, consuming bits from the read position
    pub fn start_bit_read(&mut self) -> Result<()> {
        if self.in_bit_mode {
            return Err(ProtocolError::BitModeActive.into());
        }
        self.bit_pos = self.read_pos * 8;
        self.in_bit_mode = true;
        self.bit_reading = true;
        Ok(())
    }

    /// Exit bit access mode. The last partial byte is zero padded.
    pub fn end_bit_access(&mut self) -> Result<()> {
        if !self.in_bit_mode {
            return Err(ProtocolError::NotInBitMode.into());
        }
        let byte_pos = (self.bit_pos + 7) / 8;
        if self.bit_reading {
            self.read_pos = byte_pos.min(self.data.len());
        } else if self.data.len() < byte_pos {
            self.data.resize(byte_pos, 0);
        }
        self.in_bit_mode = false;
        self.bit_reading = false;
        if std::mem::take(&mut self.stray_bytes) {
            return Err(ProtocolError::BitModeActive.into());
        }
        Ok(())
    }

    /// Write a single bit
    pub fn write_bit(&mut self, flag: bool) -> Result<()> {
        self.write_bits(1, flag as u32)
    }

    /// Write the low `count` bits of `value`, most significant first
    pub fn write_bits(&mut self, count: usize, value: u32) -> Result<()> {
        if !self.in_bit_mode || self.bit_reading {
            return Err(ProtocolError::NotInBitMode.into());
        }
        if count == 0 || count > 32 {
            return Err(ProtocolError::FieldOutOfRange {
                field: "bit_count",
                value: count as i64,
                bits: 32,
            }
            .into());
        }
        if count < 32 && (value >> count) != 0 {
            return Err(ProtocolError::FieldOutOfRange {
                field: "bits",
                value: value as i64,
                bits: count,
            }
            .into());
        }

        let end = self.bit_pos + count;
        let needed = (end + 7) / 8;
        if self.data.len() < needed {
            self.data.resize(needed, 0);
        }

        for i in 0..count {
            let pos = self.bit_pos + i;
            let mask = 0x80u8 >> (pos % 8);
            if (value >> (count - 1 - i)) & 1 == 1 {
                self.data[pos / 8] |= mask;
            } else {
                self.data[pos / 8] &= !mask;
            }
        }
        self.bit_pos = end;
        Ok(())
    }

    /// Write a two's complement value, checking it is representable in `count` bits
    pub fn write_signed_bits(&mut self, field: &'static str, count: usize, value: i32) -> Result<()> {
        if count == 0 || count >= 32 {
            return Err(ProtocolError::FieldOutOfRange {
                field,
                value: value as i64,
                bits: count,
            }
            .into());
        }
        let min = -(1i32 << (count - 1));
        let max = (1i32 << (count - 1)) - 1;
        if value < min || value > max {
            return Err(ProtocolError::FieldOutOfRange {
                field,
                value: value as i64,
                bits: count,
            }
            .into());
        }
        self.write_bits(count, (value as u32) & ((1u32 << count) - 1))
    }

    /// Read `count` bits, most significant first
    pub fn read_bits(&mut self, count: usize) -> Result<u32> {
        if !self.in_bit_mode || !self.bit_reading {
            return Err(ProtocolError::NotInBitMode.into());
        }
        if count == 0 || count > 32 {
            return Err(ProtocolError::FieldOutOfRange {
                field: "bit_count",
                value: count as i64,
                bits: 32,
            }
            .into());
        }
        if self.bit_pos + count > self.data.len() * 8 {
            return Err(ProtocolError::InvalidPacketSize {
                expected: (self.bit_pos + count + 7) / 8,
                actual: self.data.len(),
            }
            .into());
        }

        let mut value = 0u32;
        for i in 0..count {
            let pos = self.bit_pos + i;
            let bit = (self.data[pos / 8] >> (7 - pos % 8)) & 1;
            value = (value << 1) | bit as u32;
        }
        self.bit_pos += count;
        Ok(value)
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self::from_bytes(&vec)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RustscapeError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_basic_read_write() {
        let mut buf = PacketBuffer::new();
        buf.write_ubyte(0xAB);
        buf.write_ushort(0x1234);
        buf.write_ushort_le(0x5678);

        assert_eq!(buf.as_bytes(), &[0xAB, 0x12, 0x34, 0x78, 0x56]);
        assert_eq!(buf.read_ubyte(), 0xAB);
        assert_eq!(buf.read_ushort(), 0x1234);
        assert_eq!(buf.read_ushort_le(), 0x5678);
        assert!(!buf.has_remaining());
        assert_eq!(buf.read_ubyte(), 0);
    }

    #[test]
    fn test_transforms() {
        let mut buf = PacketBuffer::new();
        buf.write_byte_a(10);
        buf.write_byte_c(10);
        buf.write_byte_s(10);
        buf.write_short_a(0x0102);
        buf.write_ushort_le_a(0x0102);

        assert_eq!(buf.as_bytes(), &[138, 246, 118, 0x01, 0x82, 0x82, 0x01]);
        assert_eq!(buf.read_byte_a(), 10);
        assert_eq!(buf.read_byte_c(), 10);
        assert_eq!(buf.read_byte_s(), 10);
        buf.read_ushort();
        assert_eq!(buf.read_ushort_le_a(), 0x0102);
    }

    #[test]
    fn test_string() {
        let mut buf = PacketBuffer::new();
        buf.write_string("tele 3200 3200");
        assert_eq!(buf.as_bytes().last(), Some(&STRING_TERMINATOR));
        assert_eq!(buf.read_string(), "tele 3200 3200");
    }

    #[test]
    fn test_reversed_bytes() {
        let mut buf = PacketBuffer::new();
        buf.write_bytes_reversed(&[1, 2, 3]);
        assert_eq!(buf.as_bytes(), &[3, 2, 1]);

        let mut encoded = PacketBuffer::from_bytes(&[131, 130, 129]);
        assert_eq!(encoded.read_bytes_reversed_a(3), vec![1, 2, 3]);
    }

    #[test]
    fn test_bit_access() {
        let mut buf = PacketBuffer::new();

        buf.start_bit_access().unwrap();
        buf.write_bits(1, 1).unwrap();
        buf.write_bits(5, 15).unwrap();
        buf.write_bits(11, 1234).unwrap();
        buf.end_bit_access().unwrap();

        // 17 bits round up to exactly three bytes
        assert_eq!(buf.len(), 3);

        buf.start_bit_read().unwrap();
        assert_eq!(buf.read_bits(1).unwrap(), 1);
        assert_eq!(buf.read_bits(5).unwrap(), 15);
        assert_eq!(buf.read_bits(11).unwrap(), 1234);
        buf.end_bit_access().unwrap();
        assert_eq!(buf.read_position(), 3);
    }

    #[test]
    fn test_single_zero_bit() {
        let mut buf = PacketBuffer::new();
        buf.start_bit_access().unwrap();
        buf.write_bit(false).unwrap();
        assert_eq!(buf.bit_position(), 1);
        buf.end_bit_access().unwrap();
        assert_eq!(buf.as_bytes(), &[0]);
    }

    #[test]
    fn test_bytes_after_bit_section() {
        let mut buf = PacketBuffer::new();
        buf.start_bit_access().unwrap();
        buf.write_bits(3, 0b101).unwrap();
        buf.end_bit_access().unwrap();
        buf.write_ubyte(0xFF);
        assert_eq!(buf.as_bytes(), &[0b1010_0000, 0xFF]);
    }

    #[test]
    fn test_bit_mode_guards() {
        let mut buf = PacketBuffer::new();
        assert!(buf.write_bits(1, 1).is_err());
        assert!(buf.end_bit_access().is_err());

        buf.start_bit_access().unwrap();
        assert!(buf.start_bit_access().is_err());
        assert!(buf.write_bits(2, 4).is_err());
        assert!(buf.write_bits(0, 0).is_err());
    }

    #[test]
    fn test_byte_write_inside_bit_section_fails() {
        let mut buf = PacketBuffer::new();
        buf.start_bit_access().unwrap();
        buf.write_bits(3, 0b101).unwrap();
        buf.write_ubyte(0xFF);
        buf.write_string("no");
        buf.write_bits(5, 0).unwrap();
        assert!(matches!(
            buf.end_bit_access(),
            Err(RustscapeError::Protocol(ProtocolError::BitModeActive))
        ));
        assert_eq!(buf.as_bytes(), &[0b1010_0000]);
        assert!(!buf.in_bit_mode());

        // The next section starts clean
        buf.start_bit_access().unwrap();
        buf.write_bit(true).unwrap();
        assert!(buf.end_bit_access().is_ok());
    }

    #[test]
    fn test_signed_bits() {
        let mut buf = PacketBuffer::new();
        buf.start_bit_access().unwrap();
        buf.write_signed_bits("delta", 5, -1).unwrap();
        buf.write_signed_bits("delta", 5, 15).unwrap();
        assert!(buf.write_signed_bits("delta", 5, 16).is_err());
        assert!(buf.write_signed_bits("delta", 5, -17).is_err());
        buf.end_bit_access().unwrap();

        buf.start_bit_read().unwrap();
        assert_eq!(buf.read_bits(5).unwrap(), 0b11111);
        assert_eq!(buf.read_bits(5).unwrap(), 0b01111);
    }

    #[test]
    fn test_ensure_remaining() {
        let buf = PacketBuffer::from_bytes(&[1, 2]);
        assert!(buf.ensure_remaining(2).is_ok());
        assert!(buf.ensure_remaining(3).is_err());
    }

    #[test]
    fn test_clear_keeps_nothing() {
        let mut buf = PacketBuffer::with_capacity(16);
        buf.start_bit_access().unwrap();
        buf.write_bit(true).unwrap();
        buf.clear();
        assert!(buf.is_empty());
        assert!(!buf.in_bit_mode());
    }
}
