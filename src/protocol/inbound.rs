//! Inbound message decoding
//!
//! Turns client packets into [`InboundAction`]s for the world to apply.
//! Readers only decode; whether an action is allowed (muted chat, for
//! instance) is decided by the world. A packet that fails to decode is
//! dropped on its own and never affects the connection.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{ProtocolError, Result};
use crate::game::sync::update_flags::Chat;
use crate::protocol::packets::IncomingGamePacket;

/// Public chat
pub const CHAT_OPCODE: u8 = 4;

/// `::command` entered in the chatbox
pub const COMMAND_OPCODE: u8 = 103;

/// Walk by minimap click (carries 14 trailing anti-cheat bytes)
pub const MINIMAP_WALK_OPCODE: u8 = 248;

/// Walk by game screen click
pub const WALK_OPCODE: u8 = 164;

/// Walk issued by another action (e.g. walking to an object)
pub const ACTION_WALK_OPCODE: u8 = 98;

/// Trailing bytes on minimap walks
const MINIMAP_TRAILER: usize = 14;

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundAction {
    /// Walk from the first tile through each offset
    Walk {
        first: (u16, u16),
        offsets: Vec<(i8, i8)>,
        running: bool,
    },
    Chat(Chat),
    Command { name: String, args: Vec<String> },
}

/// Decodes one family of opcodes
pub trait MessageReader: Send + Sync {
    /// Opcodes handled by this reader
    fn opcodes(&self) -> &'static [u8];

    fn read(&self, packet: &IncomingGamePacket) -> Result<InboundAction>;
}

/// Public chat reader
#[derive(Debug, Default)]
pub struct ChatMessageReader;

impl MessageReader for ChatMessageReader {
    fn opcodes(&self) -> &'static [u8] {
        &[CHAT_OPCODE]
    }

    fn read(&self, packet: &IncomingGamePacket) -> Result<InboundAction> {
        let mut buffer = packet.buffer();
        buffer.ensure_remaining(2)?;
        let effects = buffer.read_byte_s();
        let color = buffer.read_byte_s();

        let size = packet.size() - 2;
        if size == 0 {
            return Err(ProtocolError::MalformedPacket("empty chat message".to_string()).into());
        }
        let message = buffer.read_bytes_reversed_a(size);

        Ok(InboundAction::Chat(Chat::new(message, color, effects)))
    }
}

/// Command reader
#[derive(Debug, Default)]
pub struct CommandMessageReader;

impl MessageReader for CommandMessageReader {
    fn opcodes(&self) -> &'static [u8] {
        &[COMMAND_OPCODE]
    }

    fn read(&self, packet: &IncomingGamePacket) -> Result<InboundAction> {
        let text = packet.buffer().read_string().to_lowercase();
        let (name, rest) = match text.split_once(' ') {
            Some((name, rest)) => (name, rest),
            None => (text.as_str(), ""),
        };
        if name.is_empty() {
            return Err(ProtocolError::MalformedPacket("empty command".to_string()).into());
        }

        Ok(InboundAction::Command {
            name: name.to_string(),
            args: rest
                .split(' ')
                .filter(|arg| !arg.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }
}

/// Walk reader for all three walk opcodes
#[derive(Debug, Default)]
pub struct WalkMessageReader;

impl MessageReader for WalkMessageReader {
    fn opcodes(&self) -> &'static [u8] {
        &[MINIMAP_WALK_OPCODE, WALK_OPCODE, ACTION_WALK_OPCODE]
    }

    fn read(&self, packet: &IncomingGamePacket) -> Result<InboundAction> {
        let mut size = packet.size();
        if packet.opcode == MINIMAP_WALK_OPCODE {
            size = size.saturating_sub(MINIMAP_TRAILER);
        }
        if size < 5 {
            return Err(ProtocolError::InvalidPacketSize {
                expected: 5,
                actual: size,
            }
            .into());
        }

        let steps = (size - 5) / 2;
        let mut buffer = packet.buffer();
        let x = buffer.read_ushort_le_a();
        let offsets = (0..steps)
            .map(|_| (buffer.read_byte(), buffer.read_byte()))
            .collect();
        let y = buffer.read_ushort_le();
        let running = buffer.read_byte_c() == 1;

        Ok(InboundAction::Walk {
            first: (x, y),
            offsets,
            running,
        })
    }
}

/// Opcode to reader table
pub struct MessageRepository {
    readers: Vec<Box<dyn MessageReader>>,
    by_opcode: HashMap<u8, usize>,
}

impl MessageRepository {
    /// An empty repository
    pub fn empty() -> Self {
        Self {
            readers: Vec::new(),
            by_opcode: HashMap::new(),
        }
    }

    /// Add a reader; later registrations win on shared opcodes
    pub fn register(&mut self, reader: Box<dyn MessageReader>) {
        let slot = self.readers.len();
        for &opcode in reader.opcodes() {
            self.by_opcode.insert(opcode, slot);
        }
        self.readers.push(reader);
    }

    pub fn handles(&self, opcode: u8) -> bool {
        self.by_opcode.contains_key(&opcode)
    }

    /// Decode a packet with the reader registered for its opcode
    pub fn decode(&self, packet: &IncomingGamePacket) -> Result<InboundAction> {
        let reader = self
            .by_opcode
            .get(&packet.opcode)
            .and_then(|&slot| self.readers.get(slot))
            .ok_or(ProtocolError::UnknownOpcode(packet.opcode))?;
        trace!(opcode = packet.opcode, size = packet.size(), "Decoding message");
        reader.read(packet)
    }
}

impl Default for MessageRepository {
    fn default() -> Self {
        let mut repository = Self::empty();
        repository.register(Box::new(ChatMessageReader));
        repository.register(Box::new(CommandMessageReader));
        repository.register(Box::new(WalkMessageReader));
        repository
    }
}

impl std::fmt::Debug for MessageRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut opcodes: Vec<_> = self.by_opcode.keys().copied().collect();
        opcodes.sort_unstable();
        f.debug_struct("MessageRepository")
            .field("opcodes", &opcodes)
            .finish()
    }
}
