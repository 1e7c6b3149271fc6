//! Pending attribute changes
//!
//! Gameplay code records what changed about a player during the tick
//! through [`PendingUpdates`]. The flag set drives both the "has pending
//! attribute flags" movement bit and the block section of the update
//! message; payloads ride alongside their flags and are cleared together
//! after the tick.

use bitflags::bitflags;

use crate::game::position::Position;

bitflags! {
    /// Attribute kinds that changed this tick
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UpdateFlags: u16 {
        /// Spot graphic
        const GRAPHIC = 1 << 0;
        /// Animation
        const ANIMATION = 1 << 1;
        /// Overhead text set by the server
        const FORCE_CHAT = 1 << 2;
        /// Public chat typed by the player
        const CHAT = 1 << 3;
        /// Scripted movement (agility shortcuts and the like)
        const FORCE_MOVEMENT = 1 << 4;
        /// Entity being faced
        const INTERACTION = 1 << 5;
        /// Model, colours, name and combat level
        const APPEARANCE = 1 << 6;
        /// Tile being faced
        const FACE_POSITION = 1 << 7;
        /// First hit splat
        const PRIMARY_HIT = 1 << 8;
        /// Second hit splat
        const SECONDARY_HIT = 1 << 9;
    }
}

/// Spot graphic payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Graphic {
    pub id: u16,
    /// Height above the ground (100 = standing height)
    pub height: u16,
    /// Client cycles before it starts
    pub delay: u16,
}

impl Graphic {
    pub fn new(id: u16, height: u16, delay: u16) -> Self {
        Self { id, height, delay }
    }
}

/// Animation payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    /// Animation id, 65535 stops the current one
    pub id: u16,
    pub delay: u8,
}

impl Animation {
    pub fn new(id: u16, delay: u8) -> Self {
        Self { id, delay }
    }

    /// Stop whatever animation is playing
    pub fn stop() -> Self {
        Self {
            id: u16::MAX,
            delay: 0,
        }
    }
}

/// Public chat payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    /// Packed message text exactly as the client sent it
    pub message: Vec<u8>,
    pub color: u8,
    pub effects: u8,
}

impl Chat {
    pub fn new(message: Vec<u8>, color: u8, effects: u8) -> Self {
        Self {
            message,
            color,
            effects,
        }
    }
}

/// Scripted movement payload, coordinates local to the loaded map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForceMovement {
    pub start_x: u8,
    pub start_y: u8,
    pub end_x: u8,
    pub end_y: u8,
    /// Client cycles to reach the start tile
    pub start_speed: u16,
    /// Client cycles to reach the end tile
    pub end_speed: u16,
    pub direction: u8,
}

/// Hit splat payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub damage: u8,
    /// 0 = block, 1 = damage, 2 = poison, 3 = disease
    pub kind: u8,
    pub current_hp: u8,
    pub max_hp: u8,
}

impl Hit {
    pub fn new(damage: u8, kind: u8, current_hp: u8, max_hp: u8) -> Self {
        Self {
            damage,
            kind,
            current_hp,
            max_hp,
        }
    }
}

/// Everything that changed about a player this tick
#[derive(Debug, Clone, Default)]
pub struct PendingUpdates {
    /// Update flags
    pub flags: UpdateFlags,
    pub graphic: Option<Graphic>,
    pub animation: Option<Animation>,
    pub force_chat: Option<String>,
    pub chat: Option<Chat>,
    pub force_movement: Option<ForceMovement>,
    /// Client-side id of the faced entity, 65535 to reset
    pub interaction: Option<u16>,
    pub face_position: Option<Position>,
    pub primary_hit: Option<Hit>,
    pub secondary_hit: Option<Hit>,
}

impl PendingUpdates {
    /// Create empty update data
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there are any updates
    pub fn has_updates(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Appearance payload is read straight from the player
    pub fn flag_appearance(&mut self) {
        self.flags |= UpdateFlags::APPEARANCE;
    }

    pub fn set_graphic(&mut self, graphic: Graphic) {
        self.graphic = Some(graphic);
        self.flags |= UpdateFlags::GRAPHIC;
    }

    pub fn set_animation(&mut self, animation: Animation) {
        self.animation = Some(animation);
        self.flags |= UpdateFlags::ANIMATION;
    }

    pub fn set_force_chat(&mut self, text: impl Into<String>) {
        self.force_chat = Some(text.into());
        self.flags |= UpdateFlags::FORCE_CHAT;
    }

    pub fn set_chat(&mut self, chat: Chat) {
        self.chat = Some(chat);
        self.flags |= UpdateFlags::CHAT;
    }

    pub fn set_force_movement(&mut self, movement: ForceMovement) {
        self.force_movement = Some(movement);
        self.flags |= UpdateFlags::FORCE_MOVEMENT;
    }

    /// Face another player (client ids for players are offset by 32768)
    pub fn face_player(&mut self, index: u16) {
        self.interaction = Some(index.wrapping_add(32768));
        self.flags |= UpdateFlags::INTERACTION;
    }

    /// Face an NPC
    pub fn face_npc(&mut self, index: u16) {
        self.interaction = Some(index);
        self.flags |= UpdateFlags::INTERACTION;
    }

    /// Stop facing any entity
    pub fn reset_interaction(&mut self) {
        self.interaction = Some(u16::MAX);
        self.flags |= UpdateFlags::INTERACTION;
    }

    pub fn set_face_position(&mut self, position: Position) {
        self.face_position = Some(position);
        self.flags |= UpdateFlags::FACE_POSITION;
    }

    /// Record a hit; the first goes in the primary splat, the second in the
    /// secondary one, later hits in the same tick replace the secondary
    pub fn add_hit(&mut self, hit: Hit) {
        if self.flags.contains(UpdateFlags::PRIMARY_HIT) {
            self.secondary_hit = Some(hit);
            self.flags |= UpdateFlags::SECONDARY_HIT;
        } else {
            self.primary_hit = Some(hit);
            self.flags |= UpdateFlags::PRIMARY_HIT;
        }
    }

    /// Clear all update data for next tick
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_updates_new() {
        let data = PendingUpdates::new();
        assert!(!data.has_updates());
        assert_eq!(data.flags, UpdateFlags::empty());
    }

    #[test]
    fn test_setters_raise_flags() {
        let mut data = PendingUpdates::new();
        data.set_animation(Animation::new(808, 0));
        data.set_force_chat("Hello");
        data.face_player(5);

        assert_eq!(
            data.flags,
            UpdateFlags::ANIMATION | UpdateFlags::FORCE_CHAT | UpdateFlags::INTERACTION
        );
        assert_eq!(data.interaction, Some(32773));
        assert_eq!(data.force_chat.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_hits_fill_primary_then_secondary() {
        let mut data = PendingUpdates::new();
        data.add_hit(Hit::new(3, 1, 7, 10));
        assert!(data.flags.contains(UpdateFlags::PRIMARY_HIT));
        assert!(!data.flags.contains(UpdateFlags::SECONDARY_HIT));

        data.add_hit(Hit::new(4, 1, 3, 10));
        assert!(data.flags.contains(UpdateFlags::SECONDARY_HIT));
        assert_eq!(data.primary_hit.map(|h| h.damage), Some(3));
        assert_eq!(data.secondary_hit.map(|h| h.damage), Some(4));
    }

    #[test]
    fn test_reset() {
        let mut data = PendingUpdates::new();
        data.flag_appearance();
        data.set_graphic(Graphic::new(86, 100, 0));
        data.add_hit(Hit::new(10, 1, 90, 99));
        assert!(data.has_updates());

        data.reset();
        assert!(!data.has_updates());
        assert!(data.graphic.is_none());
        assert!(data.primary_hit.is_none());
    }

    #[test]
    fn test_animation_stop() {
        let anim = Animation::stop();
        assert_eq!(anim.id, 65535);
        assert_eq!(anim.delay, 0);
    }
}
