//! Update block encoders
//!
//! Each block kind writes one attribute of a player into the block section
//! of the update message. A player's entry is a presence mask followed by
//! the payload of every set block, in [`UpdateBlock::ORDER`]. The client
//! reads the payloads back in that same order, so it must never change.

use tracing::trace;

use crate::error::{ProtocolError, Result};
use crate::game::player::Player;
use crate::net::buffer::PacketBuffer;

use super::update_flags::UpdateFlags;

/// Which pass a player's blocks are being encoded for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    /// The observer's own blocks
    UpdateSelf,
    /// A peer the observer already tracks
    UpdateLocal,
    /// A peer being added to the observer's view this tick
    AddLocal,
}

impl UpdateState {
    /// Blocks written regardless of what is pending
    pub fn forced(self) -> UpdateFlags {
        match self {
            UpdateState::AddLocal => UpdateFlags::APPEARANCE,
            UpdateState::UpdateSelf | UpdateState::UpdateLocal => UpdateFlags::empty(),
        }
    }
}

/// A single attribute encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateBlock {
    Graphic,
    Animation,
    ForceChat,
    Chat,
    ForceMovement,
    Interaction,
    Appearance,
    FacePosition,
    PrimaryHit,
    SecondaryHit,
}

impl UpdateBlock {
    /// Encoding order, shared with the client
    pub const ORDER: [UpdateBlock; 10] = [
        UpdateBlock::Graphic,
        UpdateBlock::Animation,
        UpdateBlock::ForceChat,
        UpdateBlock::Chat,
        UpdateBlock::ForceMovement,
        UpdateBlock::Interaction,
        UpdateBlock::Appearance,
        UpdateBlock::FacePosition,
        UpdateBlock::PrimaryHit,
        UpdateBlock::SecondaryHit,
    ];

    /// Pending flag this block is driven by
    pub fn flag(self) -> UpdateFlags {
        match self {
            UpdateBlock::Graphic => UpdateFlags::GRAPHIC,
            UpdateBlock::Animation => UpdateFlags::ANIMATION,
            UpdateBlock::ForceChat => UpdateFlags::FORCE_CHAT,
            UpdateBlock::Chat => UpdateFlags::CHAT,
            UpdateBlock::ForceMovement => UpdateFlags::FORCE_MOVEMENT,
            UpdateBlock::Interaction => UpdateFlags::INTERACTION,
            UpdateBlock::Appearance => UpdateFlags::APPEARANCE,
            UpdateBlock::FacePosition => UpdateFlags::FACE_POSITION,
            UpdateBlock::PrimaryHit => UpdateFlags::PRIMARY_HIT,
            UpdateBlock::SecondaryHit => UpdateFlags::SECONDARY_HIT,
        }
    }

    /// Bit this block sets in the presence mask
    pub fn mask(self) -> u16 {
        match self {
            UpdateBlock::Graphic => 0x100,
            UpdateBlock::Animation => 0x8,
            UpdateBlock::ForceChat => 0x4,
            UpdateBlock::Chat => 0x80,
            UpdateBlock::ForceMovement => 0x400,
            UpdateBlock::Interaction => 0x1,
            UpdateBlock::Appearance => 0x10,
            UpdateBlock::FacePosition => 0x2,
            UpdateBlock::PrimaryHit => 0x20,
            UpdateBlock::SecondaryHit => 0x200,
        }
    }

    /// Write this block's payload for `player`
    pub fn encode(self, player: &Player, buffer: &mut PacketBuffer) -> Result<()> {
        let updates = &player.updates;
        match self {
            UpdateBlock::Graphic => {
                let graphic = updates.graphic.ok_or(ProtocolError::MissingBlockData("graphic"))?;
                buffer.write_ushort_le(graphic.id);
                buffer.write_int(((graphic.height as i32) << 16) | graphic.delay as i32);
            }
            UpdateBlock::Animation => {
                let animation = updates
                    .animation
                    .ok_or(ProtocolError::MissingBlockData("animation"))?;
                buffer.write_ushort_le(animation.id);
                buffer.write_byte_c(animation.delay);
            }
            UpdateBlock::ForceChat => {
                let text = updates
                    .force_chat
                    .as_deref()
                    .ok_or(ProtocolError::MissingBlockData("force chat"))?;
                buffer.write_string(text);
            }
            UpdateBlock::Chat => {
                let chat = updates
                    .chat
                    .as_ref()
                    .ok_or(ProtocolError::MissingBlockData("chat"))?;
                let len = u8::try_from(chat.message.len()).map_err(|_| {
                    ProtocolError::FieldOutOfRange {
                        field: "chat length",
                        value: chat.message.len() as i64,
                        bits: 8,
                    }
                })?;
                buffer.write_ushort_le(((chat.color as u16) << 8) | chat.effects as u16);
                buffer.write_ubyte(player.rights.as_u8());
                buffer.write_byte_c(len);
                buffer.write_bytes_reversed(&chat.message);
            }
            UpdateBlock::ForceMovement => {
                let movement = updates
                    .force_movement
                    .ok_or(ProtocolError::MissingBlockData("force movement"))?;
                buffer.write_byte_s(movement.start_x);
                buffer.write_byte_s(movement.start_y);
                buffer.write_byte_s(movement.end_x);
                buffer.write_byte_s(movement.end_y);
                buffer.write_ushort_le_a(movement.start_speed);
                buffer.write_short_a(movement.end_speed);
                buffer.write_byte_s(movement.direction);
            }
            UpdateBlock::Interaction => {
                let target = updates
                    .interaction
                    .ok_or(ProtocolError::MissingBlockData("interaction"))?;
                buffer.write_ushort_le(target);
            }
            UpdateBlock::Appearance => encode_appearance(player, buffer)?,
            UpdateBlock::FacePosition => {
                let position = updates
                    .face_position
                    .ok_or(ProtocolError::MissingBlockData("face position"))?;
                buffer.write_ushort_le_a(position.x.wrapping_mul(2).wrapping_add(1));
                buffer.write_ushort_le(position.y.wrapping_mul(2).wrapping_add(1));
            }
            UpdateBlock::PrimaryHit => {
                let hit = updates
                    .primary_hit
                    .ok_or(ProtocolError::MissingBlockData("primary hit"))?;
                buffer.write_ubyte(hit.damage);
                buffer.write_byte_a(hit.kind);
                buffer.write_byte_c(hit.current_hp);
                buffer.write_ubyte(hit.max_hp);
            }
            UpdateBlock::SecondaryHit => {
                let hit = updates
                    .secondary_hit
                    .ok_or(ProtocolError::MissingBlockData("secondary hit"))?;
                buffer.write_ubyte(hit.damage);
                buffer.write_byte_s(hit.kind);
                buffer.write_ubyte(hit.current_hp);
                buffer.write_byte_c(hit.max_hp);
            }
        }
        Ok(())
    }
}

/// Blocks that will be written for `player` in the given pass
pub fn block_flags(player: &Player, state: UpdateState) -> UpdateFlags {
    player.updates.flags | state.forced()
}

/// Presence mask for a flag set
pub fn presence_mask(flags: UpdateFlags) -> u16 {
    UpdateBlock::ORDER
        .iter()
        .filter(|block| flags.contains(block.flag()))
        .fold(0, |mask, block| mask | block.mask())
}

/// Encode the mask and every set block for `player`. Writes nothing when no
/// block applies.
pub fn encode_blocks(player: &Player, state: UpdateState, buffer: &mut PacketBuffer) -> Result<()> {
    let flags = block_flags(player, state);
    if flags.is_empty() {
        return Ok(());
    }

    let mut mask = presence_mask(flags);
    if mask >= 0x100 {
        mask |= 0x40;
        buffer.write_ubyte((mask & 0xFF) as u8);
        buffer.write_ubyte((mask >> 8) as u8);
    } else {
        buffer.write_ubyte(mask as u8);
    }

    for block in UpdateBlock::ORDER {
        if flags.contains(block.flag()) {
            block.encode(player, buffer)?;
        }
    }

    trace!(
        player_index = player.index(),
        state = ?state,
        mask = mask,
        "Encoded update blocks"
    );
    Ok(())
}

/// Stand, turn, walk, turn 180, turn 90 cw, turn 90 ccw, run
const MOVEMENT_ANIMATIONS: [u16; 7] = [808, 823, 819, 820, 821, 822, 824];

fn encode_appearance(player: &Player, buffer: &mut PacketBuffer) -> Result<()> {
    let appearance = &player.appearance;
    let mut properties = PacketBuffer::with_capacity(64);

    properties.write_ubyte(appearance.gender);
    // Skull and prayer icons
    properties.write_byte(-1);
    properties.write_byte(-1);

    // Equipment slots, 0x100 + id for body parts, 0 for empty
    properties.write_ushort(0x100 + appearance.head);
    properties.write_ubyte(0);
    properties.write_ubyte(0);
    properties.write_ubyte(0);
    properties.write_ushort(0x100 + appearance.torso);
    properties.write_ubyte(0);
    properties.write_ushort(0x100 + appearance.arms);
    properties.write_ushort(0x100 + appearance.legs);
    properties.write_ushort(0x100 + appearance.head);
    properties.write_ushort(0x100 + appearance.hands);
    properties.write_ushort(0x100 + appearance.feet);
    if appearance.gender == 0 {
        properties.write_ushort(0x100 + appearance.beard);
    } else {
        properties.write_ubyte(0);
    }

    for color in appearance.colors {
        properties.write_ubyte(color);
    }
    for animation in MOVEMENT_ANIMATIONS {
        properties.write_ushort(animation);
    }

    properties.write_long(string_to_long(&player.username));
    properties.write_ubyte(player.combat_level);
    properties.write_ushort(0);

    let len = properties.len();
    let len = u8::try_from(len).map_err(|_| ProtocolError::FieldOutOfRange {
        field: "appearance length",
        value: len as i64,
        bits: 8,
    })?;
    buffer.write_byte_c(len);
    buffer.write_bytes(properties.as_bytes());
    Ok(())
}

/// Encode a username as the base-37 long the client displays names from
pub fn string_to_long(s: &str) -> i64 {
    let mut result: i64 = 0;

    for c in s.chars().take(12) {
        result *= 37;
        if c.is_ascii_uppercase() {
            result += (c as i64) - 64;
        } else if c.is_ascii_lowercase() {
            result += (c as i64) - 96;
        } else if c.is_ascii_digit() {
            result += (c as i64) - 21;
        }
    }

    while result % 37 == 0 && result != 0 {
        result /= 37;
    }

    result
}
