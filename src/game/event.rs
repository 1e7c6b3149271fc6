//! World events
//!
//! Notifications the world hands to its subscribers (the plugin manager in
//! practice). Publishing is fire-and-continue: the world never waits on or
//! inspects what a subscriber did with an event.

use crate::game::entity::{EntityId, EntityState};
use crate::game::position::Position;

/// Something that happened in the world
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    /// The world finished starting up
    ServerLaunch,
    /// A player was registered and placed
    Login {
        index: u16,
        username: String,
        muted: bool,
    },
    /// A player was logged out
    Logout { index: u16 },
    /// An entity is about to move; `old` is `None` on first placement
    PositionChanged {
        entity: EntityId,
        old: Option<Position>,
        new: Position,
    },
    /// An entity entered a lifecycle state
    StateChanged { entity: EntityId, state: EntityState },
    /// Public chat, message bytes as packed by the client
    Chat { index: u16, message: Vec<u8> },
    /// A `::command` typed by a player
    Command {
        index: u16,
        name: String,
        args: Vec<String>,
    },
}

impl WorldEvent {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            WorldEvent::ServerLaunch => "server_launch",
            WorldEvent::Login { .. } => "login",
            WorldEvent::Logout { .. } => "logout",
            WorldEvent::PositionChanged { .. } => "position_changed",
            WorldEvent::StateChanged { .. } => "state_changed",
            WorldEvent::Chat { .. } => "chat",
            WorldEvent::Command { .. } => "command",
        }
    }
}

/// Receives world events
pub trait EventPublisher {
    fn publish(&mut self, event: &WorldEvent);
}
