//! Entity lifecycle
//!
//! Every placeable thing in the world shares an [`Entity`] record holding
//! its identity, lifecycle state, position and the key of the region it
//! currently occupies. The record owns two protocols:
//!
//! - the lifecycle state machine (IDLE -> ACTIVE -> INACTIVE), and
//! - the placement protocol that keeps region membership in step with the
//!   entity's position.
//!
//! Both notify an [`EntityListener`] synchronously before returning.

use std::fmt;

use tracing::trace;

use crate::error::{GameError, Result};
use crate::game::position::{Position, RegionCoordinates};
use crate::game::region::RegionManager;

/// Kind of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Player,
    Npc,
    Object,
    GroundItem,
}

impl EntityType {
    fn label(self) -> &'static str {
        match self {
            EntityType::Player => "player",
            EntityType::Npc => "npc",
            EntityType::Object => "object",
            EntityType::GroundItem => "ground_item",
        }
    }
}

/// Unique handle of an entity: its kind plus its slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub kind: EntityType,
    pub index: u16,
}

impl EntityId {
    pub const fn new(kind: EntityType, index: u16) -> Self {
        Self { kind, index }
    }

    /// Handle of the player in slot `index`
    pub const fn player(index: u16) -> Self {
        Self::new(EntityType::Player, index)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind.label(), self.index)
    }
}

/// Lifecycle state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Created, not yet visible
    Idle,
    /// Placed and taking part in region queries and updates
    Active,
    /// Removed from the world
    Inactive,
}

/// Receives lifecycle and position notifications.
///
/// Callbacks run synchronously inside the transition that triggers them.
/// They cannot fail; a listener that needs to report a problem must do so
/// through its own channel.
pub trait EntityListener {
    fn on_idle(&mut self, _entity: &Entity) {}

    fn on_active(&mut self, _entity: &Entity) {}

    fn on_inactive(&mut self, _entity: &Entity) {}

    /// Fired before the new position is stored, so `entity.position()`
    /// still returns `old`.
    fn on_position_change(&mut self, _entity: &Entity, _old: Option<Position>, _new: Position) {}
}

/// Listener that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl EntityListener for NoopListener {}

/// Base record shared by all entities
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    state: EntityState,
    position: Option<Position>,
    region: Option<RegionCoordinates>,
}

impl Entity {
    /// Create an entity in the IDLE state, firing `on_idle`
    pub fn new(id: EntityId, listener: &mut dyn EntityListener) -> Self {
        let entity = Self {
            id,
            state: EntityState::Idle,
            position: None,
            region: None,
        };
        listener.on_idle(&entity);
        entity
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == EntityState::Active
    }

    /// Current position, `None` until first placed
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Key of the region this entity is a member of
    pub fn region(&self) -> Option<RegionCoordinates> {
        self.region
    }

    /// Whether both entities are placed and can see each other
    pub fn is_viewable(&self, other: &Entity) -> bool {
        match (self.position, other.position) {
            (Some(a), Some(b)) => a.is_viewable(&b),
            _ => false,
        }
    }

    /// Move to a new lifecycle state.
    ///
    /// Returns `Ok(false)` when already in `next` (no hooks fire). IDLE can
    /// never be re-entered. Activation requires a prior placement. Going
    /// INACTIVE removes the entity from its region before returning.
    pub fn set_state(
        &mut self,
        next: EntityState,
        regions: &mut RegionManager,
        listener: &mut dyn EntityListener,
    ) -> Result<bool> {
        if next == EntityState::Idle {
            return Err(GameError::InvalidStateTransition {
                entity: self.id,
                from: self.state,
                to: next,
            }
            .into());
        }
        if self.state == next {
            return Ok(false);
        }

        match next {
            EntityState::Active => {
                let position = self.position.ok_or(GameError::NotPlaced(self.id))?;
                if self.region.is_none() {
                    let coordinates = position.region();
                    regions.region_for(coordinates).add(self.id);
                    self.region = Some(coordinates);
                }
                self.state = next;
                listener.on_active(self);
            }
            EntityState::Inactive => {
                self.state = next;
                listener.on_inactive(self);
                if let Some(coordinates) = self.region.take() {
                    regions.region_for(coordinates).remove(&self.id);
                }
            }
            EntityState::Idle => {}
        }

        trace!(entity = %self.id, state = ?self.state, "Entity state changed");
        Ok(true)
    }

    /// Place the entity at `next`, moving it between regions when the tile
    /// lies in a different one.
    ///
    /// The listener sees the previous position as `old` and observes it
    /// through `self.position()` during the callback.
    pub fn set_position(
        &mut self,
        next: Position,
        regions: &mut RegionManager,
        listener: &mut dyn EntityListener,
    ) -> Result<()> {
        if self.state == EntityState::Inactive {
            return Err(GameError::InvalidAction(format!(
                "cannot place inactive entity {}",
                self.id
            ))
            .into());
        }

        let coordinates = next.region();
        let old = self.position;

        match self.region {
            Some(current) if current == coordinates => {}
            current => {
                if let Some(current) = current {
                    regions.region_for(current).remove(&self.id);
                }
                regions.region_for(coordinates).add(self.id);
                self.region = Some(coordinates);
            }
        }

        listener.on_position_change(self, old, next);
        self.position = Some(next);
        Ok(())
    }
}
