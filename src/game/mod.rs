//! Game module
//!
//! This module contains the core game logic for the Rustscape world:
//! - World management (game tick, player registration)
//! - Entity lifecycle and region placement
//! - Player state, walking and the per-tick update protocol
//! - Events, plugins and scheduled tasks

pub mod entity;
pub mod event;
pub mod player;
pub mod plugin;
pub mod position;
pub mod region;
pub mod sync;
pub mod task;
pub mod walking;
pub mod world;

pub use entity::{Entity, EntityId, EntityListener, EntityState, EntityType};
pub use player::{Player, PlayerDetails, PlayerList, PlayerRights};
pub use position::{Direction, Position, RegionCoordinates};
pub use world::{World, WorldSettings, WorldState};
