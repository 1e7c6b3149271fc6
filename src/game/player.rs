//! Player module
//!
//! A player is an entity that also observes the world:
//! - identity and privileges
//! - appearance and pending attribute updates
//! - movement intent for the current tick
//! - the locally tracked peer list
//! - outbound messages waiting for the end of the tick

use std::fmt;

use tracing::debug;

use crate::error::{GameError, Result};
use crate::game::entity::{Entity, EntityId, EntityListener, EntityType};
use crate::game::position::{Direction, Position};
use crate::game::region::EntityLookup;
use crate::game::sync::local_players::LocalPlayers;
use crate::game::sync::update_flags::{Chat, PendingUpdates};
use crate::game::walking::WalkingQueue;
use crate::net::transport::Outbound;
use crate::protocol::packets::{build_system_message, OutgoingGamePacket};

/// Maximum player index value (11-bit field, 2047 is the list terminator)
pub const MAX_PLAYER_INDEX: u16 = 2047;

/// Player rights/privilege levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum PlayerRights {
    /// Normal player
    #[default]
    Player = 0,
    /// Player moderator
    Moderator = 1,
    /// Administrator
    Administrator = 2,
}

impl PlayerRights {
    /// Value sent to the client (chat crowns)
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Player appearance (for model rendering)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appearance {
    /// Gender (0 = male, 1 = female)
    pub gender: u8,
    /// Head model ID
    pub head: u16,
    /// Torso model ID
    pub torso: u16,
    /// Arms model ID
    pub arms: u16,
    /// Hands model ID
    pub hands: u16,
    /// Legs model ID
    pub legs: u16,
    /// Feet model ID
    pub feet: u16,
    /// Beard model ID (male only)
    pub beard: u16,
    /// Hair, torso, legs, feet and skin colours
    pub colors: [u8; 5],
}

impl Appearance {
    /// Create default male appearance
    pub fn default_male() -> Self {
        Self {
            gender: 0,
            head: 0,
            torso: 18,
            arms: 26,
            hands: 33,
            legs: 36,
            feet: 42,
            beard: 10,
            colors: [0; 5],
        }
    }
}

impl Default for Appearance {
    fn default() -> Self {
        Self::default_male()
    }
}

/// The movement record chosen for a player this tick, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementType {
    /// Relocated without walking
    Teleport,
    /// Two steps
    Run(Direction, Direction),
    /// One step
    Walk(Direction),
    /// Stayed put
    None,
}

/// What the login layer knows about a player before they are placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerDetails {
    pub username: String,
    pub rights: PlayerRights,
    pub muted: bool,
    pub appearance: Appearance,
    pub position: Position,
}

impl PlayerDetails {
    /// A regular, unmuted player with the default look
    pub fn new(username: impl Into<String>, position: Position) -> Self {
        Self {
            username: username.into(),
            rights: PlayerRights::Player,
            muted: false,
            appearance: Appearance::default(),
            position,
        }
    }

    pub fn with_rights(mut self, rights: PlayerRights) -> Self {
        self.rights = rights;
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }
}

/// A connected player
pub struct Player {
    entity: Entity,
    /// Login name
    pub username: String,
    pub rights: PlayerRights,
    pub muted: bool,
    pub appearance: Appearance,
    pub combat_level: u8,
    /// Attribute changes to broadcast this tick
    pub updates: PendingUpdates,
    pub walking: WalkingQueue,
    /// Peers this player's client currently renders
    pub local_players: LocalPlayers,
    walking_direction: Option<Direction>,
    running_direction: Option<Direction>,
    teleporting: bool,
    region_changed: bool,
    last_region: Option<Position>,
    outbound: Option<Outbound>,
    queued: Vec<OutgoingGamePacket>,
}

impl Player {
    /// Create a player in slot `index`. The appearance block is flagged so
    /// the first update carries it.
    pub fn new(index: u16, username: impl Into<String>, listener: &mut dyn EntityListener) -> Self {
        let mut updates = PendingUpdates::new();
        updates.flag_appearance();
        Self {
            entity: Entity::new(EntityId::new(EntityType::Player, index), listener),
            username: username.into(),
            rights: PlayerRights::default(),
            muted: false,
            appearance: Appearance::default(),
            combat_level: 3,
            updates,
            walking: WalkingQueue::new(),
            local_players: LocalPlayers::new(),
            walking_direction: None,
            running_direction: None,
            teleporting: false,
            region_changed: false,
            last_region: None,
            outbound: None,
            queued: Vec::new(),
        }
    }

    /// Slot index, also the id sent in add records
    pub fn index(&self) -> u16 {
        self.entity.id().index
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    pub fn position(&self) -> Option<Position> {
        self.entity.position()
    }

    /// Movement record for this tick; teleport beats running beats walking
    pub fn movement(&self) -> MovementType {
        if self.teleporting {
            return MovementType::Teleport;
        }
        match (self.walking_direction, self.running_direction) {
            (Some(walk), Some(run)) => MovementType::Run(walk, run),
            (Some(walk), None) => MovementType::Walk(walk),
            _ => MovementType::None,
        }
    }

    pub fn walking_direction(&self) -> Option<Direction> {
        self.walking_direction
    }

    pub fn running_direction(&self) -> Option<Direction> {
        self.running_direction
    }

    pub fn set_directions(&mut self, walk: Option<Direction>, run: Option<Direction>) {
        self.walking_direction = walk;
        self.running_direction = run;
    }

    pub fn is_teleporting(&self) -> bool {
        self.teleporting
    }

    pub fn set_teleporting(&mut self, teleporting: bool) {
        self.teleporting = teleporting;
    }

    /// Whether the client reloaded its map this tick
    pub fn is_region_changed(&self) -> bool {
        self.region_changed
    }

    pub fn set_region_changed(&mut self, changed: bool) {
        self.region_changed = changed;
    }

    /// Position the client's currently loaded map is centred on
    pub fn last_region(&self) -> Option<Position> {
        self.last_region
    }

    pub fn set_last_region(&mut self, position: Position) {
        self.last_region = Some(position);
    }

    /// Whether the player has walked close enough to the edge of the loaded
    /// map (or never had one) that the client must reload
    pub fn needs_region_update(&self) -> bool {
        let (Some(base), Some(position)) = (self.last_region, self.position()) else {
            return true;
        };
        let x = position.local_x(&base);
        let y = position.local_y(&base);
        position.z != base.z || !(16..88).contains(&x) || !(16..88).contains(&y)
    }

    /// Flag public chat for broadcast
    pub fn chat(&mut self, chat: Chat) {
        self.updates.set_chat(chat);
    }

    /// Attach the connection's outbound queue
    pub fn attach_outbound(&mut self, outbound: Outbound) {
        self.outbound = Some(outbound);
    }

    pub fn outbound(&self) -> Option<&Outbound> {
        self.outbound.as_ref()
    }

    /// Queue a packet for delivery at the end of the tick
    pub fn queue(&mut self, packet: OutgoingGamePacket) {
        self.queued.push(packet);
    }

    /// Queue a chatbox message
    pub fn send_message(&mut self, message: &str) {
        debug!(player_index = self.index(), message = %message, "Queued game message");
        self.queue(build_system_message(message));
    }

    /// Packets waiting to be flushed, in queue order
    pub fn take_queued(&mut self) -> Vec<OutgoingGamePacket> {
        std::mem::take(&mut self.queued)
    }

    pub fn queued(&self) -> &[OutgoingGamePacket] {
        &self.queued
    }

    /// Clear everything that only lives for one tick
    pub fn reset_tick(&mut self) {
        self.updates.reset();
        self.walking_direction = None;
        self.running_direction = None;
        self.teleporting = false;
        self.region_changed = false;
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("index", &self.index())
            .field("username", &self.username)
            .field("state", &self.entity.state())
            .field("position", &self.position())
            .field("rights", &self.rights)
            .field("local_players", &self.local_players.len())
            .finish()
    }
}

/// Slot table of online players, indexed 1..=2047
#[derive(Debug)]
pub struct PlayerList {
    slots: Vec<Option<Player>>,
    capacity: usize,
    count: usize,
}

impl PlayerList {
    /// Create a list admitting at most `capacity` players
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_PLAYER_INDEX as usize - 1);
        let mut slots = Vec::with_capacity(capacity + 1);
        slots.resize_with(capacity + 1, || None);
        Self {
            slots,
            capacity,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lowest free slot; slot 0 is never used
    pub fn next_free_index(&self) -> Result<u16> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.is_none())
            .map(|(i, _)| i as u16)
            .ok_or_else(|| GameError::WorldFull.into())
    }

    /// Store a player in its own slot
    pub fn insert(&mut self, player: Player) -> Result<()> {
        let index = player.index() as usize;
        match self.slots.get_mut(index) {
            Some(slot @ None) if index > 0 => {
                *slot = Some(player);
                self.count += 1;
                Ok(())
            }
            _ => Err(GameError::InvalidAction(format!("player slot {} unavailable", index)).into()),
        }
    }

    /// Free a slot
    pub fn remove(&mut self, index: u16) -> Option<Player> {
        let player = self.slots.get_mut(index as usize)?.take();
        if player.is_some() {
            self.count -= 1;
        }
        player
    }

    pub fn get(&self, index: u16) -> Option<&Player> {
        self.slots.get(index as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, index: u16) -> Option<&mut Player> {
        self.slots.get_mut(index as usize)?.as_mut()
    }

    /// Like [`PlayerList::get_mut`] but failing with `PlayerNotFound`
    pub fn require_mut(&mut self, index: u16) -> Result<&mut Player> {
        self.get_mut(index)
            .ok_or_else(|| GameError::PlayerNotFound(index).into())
    }

    /// Occupied slot indices in ascending order
    pub fn indices(&self) -> Vec<u16> {
        self.iter().map(|p| p.index()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.slots.iter_mut().filter_map(|slot| slot.as_mut())
    }

    pub fn find_by_username(&self, username: &str) -> Option<&Player> {
        self.iter()
            .find(|p| p.username.eq_ignore_ascii_case(username))
    }
}

impl EntityLookup for PlayerList {
    fn entity(&self, id: EntityId) -> Option<&Entity> {
        match id.kind {
            EntityType::Player => self.get(id.index).map(Player::entity),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::NoopListener;

    #[test]
    fn test_rights() {
        assert_eq!(PlayerRights::Administrator.as_u8(), 2);
        assert!(PlayerRights::Administrator > PlayerRights::Moderator);
        assert!(PlayerRights::Moderator > PlayerRights::Player);
    }

    #[test]
    fn test_new_player_flags_appearance() {
        let player = Player::new(1, "zezima", &mut NoopListener);
        assert_eq!(player.index(), 1);
        assert!(player.updates.has_updates());
        assert_eq!(player.movement(), MovementType::None);
        assert!(player.needs_region_update());
    }

    #[test]
    fn test_movement_priority() {
        let mut player = Player::new(1, "zezima", &mut NoopListener);
        player.set_directions(Some(Direction::North), None);
        assert_eq!(player.movement(), MovementType::Walk(Direction::North));

        player.set_directions(Some(Direction::North), Some(Direction::East));
        assert_eq!(
            player.movement(),
            MovementType::Run(Direction::North, Direction::East)
        );

        player.set_teleporting(true);
        assert_eq!(player.movement(), MovementType::Teleport);

        player.reset_tick();
        assert_eq!(player.movement(), MovementType::None);
        assert!(!player.updates.has_updates());
    }

    #[test]
    fn test_queue_and_take() {
        let mut player = Player::new(1, "zezima", &mut NoopListener);
        player.send_message("Welcome");
        assert_eq!(player.queued().len(), 1);
        assert_eq!(player.take_queued().len(), 1);
        assert!(player.queued().is_empty());
    }

    #[test]
    fn test_player_list_slots() {
        let mut list = PlayerList::new(2);
        assert_eq!(list.next_free_index().unwrap(), 1);
        list.insert(Player::new(1, "a", &mut NoopListener)).unwrap();
        assert_eq!(list.next_free_index().unwrap(), 2);
        list.insert(Player::new(2, "b", &mut NoopListener)).unwrap();
        assert!(list.next_free_index().is_err());
        assert!(list.insert(Player::new(2, "c", &mut NoopListener)).is_err());

        assert_eq!(list.len(), 2);
        assert!(list.remove(1).is_some());
        assert_eq!(list.next_free_index().unwrap(), 1);
        assert_eq!(list.indices(), vec![2]);
        assert!(list.find_by_username("B").is_some());
    }
}
