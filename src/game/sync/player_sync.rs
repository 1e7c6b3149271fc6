//! Player update message builder
//!
//! Builds the per-observer player update (opcode 81) each tick:
//! - the observer's own movement record, then its blocks
//! - a movement or remove record for every tracked peer
//! - add records for newly visible peers (at most 15 per tick)
//! - the block section, preceded by the 2047 terminator when non-empty
//!
//! Both working buffers come from a [`BufferPool`] and go back to it however
//! the build ends. The observer's tracked set is only replaced when the
//! message was built successfully.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{GameError, ProtocolError, Result, RustscapeError};
use crate::game::player::{MovementType, Player, PlayerList, MAX_PLAYER_INDEX};
use crate::game::position::Position;
use crate::game::region::RegionManager;
use crate::net::buffer::{PacketBuffer, MAX_PACKET_SIZE};
use crate::net::pool::BufferPool;
use crate::protocol::packets::{OutgoingGamePacket, PLAYER_UPDATE_OPCODE};

use super::blocks::{encode_blocks, UpdateState};
use super::local_players::LocalPlayers;

/// Maximum peers added to one observer's view in a single tick
pub const MAX_ADDS_PER_TICK: usize = 15;

/// Builds update messages using pooled scratch buffers
#[derive(Debug, Clone, Default)]
pub struct PlayerUpdater {
    pool: BufferPool,
}

impl PlayerUpdater {
    pub fn new(pool: BufferPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Build the update message for `observer_index` and commit its new
    /// tracked set. On error the tracked set is left untouched.
    pub fn update(
        &self,
        observer_index: u16,
        players: &mut PlayerList,
        regions: &RegionManager,
    ) -> Result<OutgoingGamePacket> {
        let (packet, local) = self.build(observer_index, players, regions)?;
        players.require_mut(observer_index)?.local_players = local;
        Ok(packet)
    }

    /// Build the update message for `observer_index` without touching any
    /// player. Returns the message and the tracked set it describes.
    pub fn build(
        &self,
        observer_index: u16,
        players: &PlayerList,
        regions: &RegionManager,
    ) -> Result<(OutgoingGamePacket, LocalPlayers)> {
        let observer = players
            .get(observer_index)
            .ok_or(GameError::PlayerNotFound(observer_index))?;
        let position = observer
            .position()
            .ok_or_else(|| GameError::NotPlaced(observer.entity().id()))?;

        let mut local = observer.local_players.clone();
        let mut msg = self.pool.acquire();
        let mut blocks = self.pool.acquire();

        msg.start_bit_access()?;
        write_movement(observer, &mut msg)?;
        encode_blocks(observer, UpdateState::UpdateSelf, &mut blocks)?;

        msg.write_bits(8, local.len() as u32)?;
        local.retain_with::<RustscapeError>(|index| {
            match players.get(index).filter(|other| keeps_peer(observer, other)) {
                Some(other) => {
                    write_movement(other, &mut msg)?;
                    encode_blocks(other, UpdateState::UpdateLocal, &mut blocks)?;
                    Ok(true)
                }
                None => {
                    trace!(player_index = observer_index, other = index, "Removing local player");
                    msg.write_bit(true)?;
                    msg.write_bits(2, 3)?;
                    Ok(false)
                }
            }
        })?;

        let mut added = 0;
        for index in regions.players_near(&position, players) {
            if added == MAX_ADDS_PER_TICK || local.is_full() {
                break;
            }
            if index == observer_index || local.contains(index) {
                continue;
            }
            let Some(other) = players.get(index) else {
                continue;
            };
            let Some((dx, dy)) = add_delta(&position, other) else {
                continue;
            };
            if !other.entity().is_active() || !local.add(index) {
                continue;
            }

            added += 1;
            write_add(&mut msg, index, dx, dy)?;
            encode_blocks(other, UpdateState::AddLocal, &mut blocks)?;
        }

        if blocks.is_empty() {
            msg.end_bit_access()?;
        } else {
            msg.write_bits(11, MAX_PLAYER_INDEX as u32)?;
            msg.end_bit_access()?;
            msg.write_bytes(blocks.as_bytes());
        }

        if msg.len() > MAX_PACKET_SIZE {
            return Err(ProtocolError::PacketTooLarge {
                size: msg.len(),
                max: MAX_PACKET_SIZE,
            }
            .into());
        }

        debug!(
            player_index = observer_index,
            local_players = local.len(),
            added = added,
            size = msg.len(),
            "Built player update"
        );

        let packet = OutgoingGamePacket::variable_short(
            PLAYER_UPDATE_OPCODE,
            Bytes::copy_from_slice(msg.as_bytes()),
        );
        Ok((packet, local))
    }
}

/// A tracked peer stays tracked while it is active, in view and neither
/// reloaded its map nor teleported this tick
fn keeps_peer(observer: &Player, other: &Player) -> bool {
    other.entity().is_active()
        && observer.entity().is_viewable(other.entity())
        && !other.is_region_changed()
        && !other.is_teleporting()
}

/// Offset of a candidate from the observer, if viewable and representable
/// in the 5-bit add fields
fn add_delta(observer: &Position, other: &Player) -> Option<(i32, i32)> {
    let position = other.position()?;
    if !position.is_viewable(observer) {
        return None;
    }
    let dx = position.x as i32 - observer.x as i32;
    let dy = position.y as i32 - observer.y as i32;
    let range = -16..=15;
    (range.contains(&dx) && range.contains(&dy)).then_some((dx, dy))
}

fn write_add(msg: &mut PacketBuffer, index: u16, dx: i32, dy: i32) -> Result<()> {
    msg.write_bits(11, index as u32)?;
    // Appearance is always resent, and the walking queue discarded
    msg.write_bit(true)?;
    msg.write_bit(true)?;
    msg.write_signed_bits("delta_y", 5, dy)?;
    msg.write_signed_bits("delta_x", 5, dx)
}

/// Write the movement record for one player
pub fn write_movement(player: &Player, msg: &mut PacketBuffer) -> Result<()> {
    let needs_update = player.updates.has_updates();

    match player.movement() {
        MovementType::Teleport => {
            let position = player
                .position()
                .ok_or_else(|| GameError::NotPlaced(player.entity().id()))?;
            let base = player.last_region().unwrap_or(position);

            msg.write_bit(true)?;
            msg.write_bits(2, 3)?;
            msg.write_bits(2, position.z as u32)?;
            msg.write_bit(!player.is_region_changed())?;
            msg.write_bit(needs_update)?;
            msg.write_bits(7, local_coordinate("local_y", position.local_y(&base))?)?;
            msg.write_bits(7, local_coordinate("local_x", position.local_x(&base))?)?;
        }
        MovementType::Run(walk, run) => {
            msg.write_bit(true)?;
            msg.write_bits(2, 2)?;
            msg.write_bits(3, walk.id() as u32)?;
            msg.write_bits(3, run.id() as u32)?;
            msg.write_bit(needs_update)?;
        }
        MovementType::Walk(walk) => {
            msg.write_bit(true)?;
            msg.write_bits(2, 1)?;
            msg.write_bits(3, walk.id() as u32)?;
            msg.write_bit(needs_update)?;
        }
        MovementType::None if needs_update => {
            msg.write_bit(true)?;
            msg.write_bits(2, 0)?;
        }
        MovementType::None => msg.write_bit(false)?,
    }
    Ok(())
}

fn local_coordinate(field: &'static str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        ProtocolError::FieldOutOfRange {
            field,
            value: value as i64,
            bits: 7,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{EntityState, NoopListener};
    use crate::game::position::Direction;
    use crate::game::sync::update_flags::{Animation, UpdateFlags};
    use crate::game::sync::MAX_LOCAL_PLAYERS;
    use pretty_assertions::assert_eq;

    fn spawn(players: &mut PlayerList, regions: &mut RegionManager, index: u16, at: Position) {
        let mut player = Player::new(index, format!("player{}", index), &mut NoopListener);
        player
            .entity_mut()
            .set_position(at, regions, &mut NoopListener)
            .unwrap();
        player
            .entity_mut()
            .set_state(EntityState::Active, regions, &mut NoopListener)
            .unwrap();
        player.set_last_region(at);
        player.updates.reset();
        players.insert(player).unwrap();
    }

    fn bits(player: &Player) -> Vec<u32> {
        let mut buffer = PacketBuffer::new();
        buffer.start_bit_access().unwrap();
        write_movement(player, &mut buffer).unwrap();
        let written = buffer.bit_position();
        buffer.end_bit_access().unwrap();

        let mut reader = PacketBuffer::from_bytes(buffer.as_bytes());
        reader.start_bit_read().unwrap();
        (0..written).map(|_| reader.read_bits(1).unwrap()).collect()
    }

    fn reader(packet: &OutgoingGamePacket) -> PacketBuffer {
        let mut reader = PacketBuffer::from_bytes(&packet.data);
        reader.start_bit_read().unwrap();
        reader
    }

    #[test]
    fn test_still_without_flags_is_one_zero_bit() {
        let mut player = Player::new(1, "a", &mut NoopListener);
        player.updates.reset();
        assert_eq!(bits(&player), vec![0]);
    }

    #[test]
    fn test_still_with_flags() {
        let mut player = Player::new(1, "a", &mut NoopListener);
        player.updates.reset();
        player.updates.set_animation(Animation::new(808, 0));
        assert_eq!(bits(&player), vec![1, 0, 0]);
    }

    #[test]
    fn test_walk_record() {
        let mut player = Player::new(1, "a", &mut NoopListener);
        player.updates.reset();
        player.set_directions(Some(Direction::NorthEast), None);
        assert_eq!(bits(&player), vec![1, 0, 1, 0, 1, 0, 0]);
    }

    #[test]
    fn test_run_record() {
        let mut player = Player::new(1, "a", &mut NoopListener);
        player.updates.reset();
        player.updates.set_animation(Animation::new(808, 0));
        player.set_directions(Some(Direction::North), Some(Direction::SouthEast));
        assert_eq!(bits(&player), vec![1, 1, 0, 0, 0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_teleport_record() {
        let mut players = PlayerList::new(10);
        let mut regions = RegionManager::new();
        spawn(&mut players, &mut regions, 1, Position::new(3222, 3218, 0));
        let player = players.get_mut(1).unwrap();
        player.set_teleporting(true);
        player.set_region_changed(true);

        let mut buffer = PacketBuffer::new();
        buffer.start_bit_access().unwrap();
        write_movement(player, &mut buffer).unwrap();
        buffer.end_bit_access().unwrap();

        let mut reader = PacketBuffer::from_bytes(buffer.as_bytes());
        reader.start_bit_read().unwrap();
        assert_eq!(reader.read_bits(1).unwrap(), 1);
        assert_eq!(reader.read_bits(2).unwrap(), 3);
        assert_eq!(reader.read_bits(2).unwrap(), 0);
        assert_eq!(reader.read_bits(1).unwrap(), 0);
        assert_eq!(reader.read_bits(1).unwrap(), 0);
        // 3218 - 8 * (402 - 6), 3222 - 8 * (402 - 6)
        assert_eq!(reader.read_bits(7).unwrap(), 50);
        assert_eq!(reader.read_bits(7).unwrap(), 54);
    }

    #[test]
    fn test_adds_new_peer_with_appearance() {
        let mut players = PlayerList::new(10);
        let mut regions = RegionManager::new();
        spawn(&mut players, &mut regions, 1, Position::new(100, 100, 0));
        spawn(&mut players, &mut regions, 2, Position::new(101, 100, 0));

        let updater = PlayerUpdater::default();
        let packet = updater.update(1, &mut players, &regions).unwrap();
        assert_eq!(packet.opcode, PLAYER_UPDATE_OPCODE);
        assert_eq!(players.get(1).unwrap().local_players.len(), 1);

        let mut r = reader(&packet);
        assert_eq!(r.read_bits(1).unwrap(), 0);
        assert_eq!(r.read_bits(8).unwrap(), 0);
        assert_eq!(r.read_bits(11).unwrap(), 2);
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bits(5).unwrap(), 0);
        assert_eq!(r.read_bits(5).unwrap(), 1);
        assert_eq!(r.read_bits(11).unwrap(), 2047);
        r.end_bit_access().unwrap();
        assert_eq!(r.read_ubyte(), 0x10);
    }

    #[test]
    fn test_crowd_fills_view_up_to_cap() {
        let mut players = PlayerList::new(400);
        let mut regions = RegionManager::new();
        spawn(&mut players, &mut regions, 1, Position::new(100, 100, 0));
        for index in 2..=301 {
            spawn(&mut players, &mut regions, index, Position::new(101, 100, 0));
        }

        let updater = PlayerUpdater::default();
        for _ in 0..25 {
            updater.update(1, &mut players, &regions).unwrap();
            assert!(players.get(1).unwrap().local_players.len() <= MAX_LOCAL_PLAYERS);
        }
        assert_eq!(players.get(1).unwrap().local_players.len(), MAX_LOCAL_PLAYERS);

        let packet = updater.update(1, &mut players, &regions).unwrap();
        let mut r = reader(&packet);
        assert_eq!(r.read_bits(1).unwrap(), 0);
        assert_eq!(r.read_bits(8).unwrap(), 255);
        for _ in 0..MAX_LOCAL_PLAYERS {
            assert_eq!(r.read_bits(1).unwrap(), 0);
        }
        // Nothing after the tracked records: no add, no terminator
        assert_eq!(packet.data.len(), (1 + 8 + MAX_LOCAL_PLAYERS) / 8);
        assert_eq!(players.get(1).unwrap().local_players.len(), MAX_LOCAL_PLAYERS);
    }

    #[test]
    fn test_no_blocks_means_no_terminator() {
        let mut players = PlayerList::new(10);
        let mut regions = RegionManager::new();
        spawn(&mut players, &mut regions, 1, Position::new(100, 100, 0));

        let packet = PlayerUpdater::default()
            .update(1, &mut players, &regions)
            .unwrap();
        // one still bit, eight count bits
        assert_eq!(&packet.data[..], &[0, 0]);
    }

    #[test]
    fn test_out_of_view_peer_removed() {
        let mut players = PlayerList::new(10);
        let mut regions = RegionManager::new();
        spawn(&mut players, &mut regions, 1, Position::new(100, 100, 0));
        spawn(&mut players, &mut regions, 2, Position::new(101, 100, 0));
        let updater = PlayerUpdater::default();
        updater.update(1, &mut players, &regions).unwrap();

        players
            .get_mut(2)
            .unwrap()
            .entity_mut()
            .set_position(Position::new(140, 100, 0), &mut regions, &mut NoopListener)
            .unwrap();

        let packet = updater.update(1, &mut players, &regions).unwrap();
        let mut r = reader(&packet);
        assert_eq!(r.read_bits(1).unwrap(), 0);
        assert_eq!(r.read_bits(8).unwrap(), 1);
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bits(2).unwrap(), 3);
        assert!(players.get(1).unwrap().local_players.is_empty());
    }

    #[test]
    fn test_tracked_peer_movement_and_blocks() {
        let mut players = PlayerList::new(10);
        let mut regions = RegionManager::new();
        spawn(&mut players, &mut regions, 1, Position::new(100, 100, 0));
        spawn(&mut players, &mut regions, 2, Position::new(101, 100, 0));
        let updater = PlayerUpdater::default();
        updater.update(1, &mut players, &regions).unwrap();

        let peer = players.get_mut(2).unwrap();
        peer.set_directions(Some(Direction::West), None);
        peer.updates.set_animation(Animation::new(866, 0));

        let packet = updater.update(1, &mut players, &regions).unwrap();
        let mut r = reader(&packet);
        assert_eq!(r.read_bits(1).unwrap(), 0);
        assert_eq!(r.read_bits(8).unwrap(), 1);
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bits(2).unwrap(), 1);
        assert_eq!(r.read_bits(3).unwrap(), Direction::West.id() as u32);
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bits(11).unwrap(), 2047);
        r.end_bit_access().unwrap();
        assert_eq!(r.read_ubyte(), 0x08);
    }

    #[test]
    fn test_teleported_peer_is_removed_not_teleported() {
        let mut players = PlayerList::new(10);
        let mut regions = RegionManager::new();
        spawn(&mut players, &mut regions, 1, Position::new(100, 100, 0));
        spawn(&mut players, &mut regions, 2, Position::new(101, 100, 0));
        let updater = PlayerUpdater::default();
        updater.update(1, &mut players, &regions).unwrap();

        let peer = players.get_mut(2).unwrap();
        peer.entity_mut()
            .set_position(Position::new(101, 100, 1), &mut regions, &mut NoopListener)
            .unwrap();
        peer.set_teleporting(true);

        let packet = updater.update(1, &mut players, &regions).unwrap();
        let mut r = reader(&packet);
        r.read_bits(9).unwrap();
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bits(2).unwrap(), 3);
        assert!(players.get(1).unwrap().local_players.is_empty());
    }

    #[test]
    fn test_adds_capped_per_tick() {
        let mut players = PlayerList::new(40);
        let mut regions = RegionManager::new();
        spawn(&mut players, &mut regions, 1, Position::new(100, 100, 0));
        for index in 2..=21 {
            spawn(&mut players, &mut regions, index, Position::new(90 + index, 101, 0));
        }

        let updater = PlayerUpdater::default();
        updater.update(1, &mut players, &regions).unwrap();
        assert_eq!(players.get(1).unwrap().local_players.len(), MAX_ADDS_PER_TICK);

        updater.update(1, &mut players, &regions).unwrap();
        assert_eq!(players.get(1).unwrap().local_players.len(), 20);
    }

    #[test]
    fn test_failed_build_releases_buffers_and_keeps_state() {
        let mut players = PlayerList::new(10);
        let mut regions = RegionManager::new();
        spawn(&mut players, &mut regions, 1, Position::new(100, 100, 0));
        spawn(&mut players, &mut regions, 2, Position::new(101, 100, 0));
        players.get_mut(2).unwrap().updates.flags |= UpdateFlags::INTERACTION;

        let updater = PlayerUpdater::new(BufferPool::new(4));
        assert!(updater.update(1, &mut players, &regions).is_err());
        assert_eq!(updater.pool().available(), 2);
        assert!(players.get(1).unwrap().local_players.is_empty());

        // Other observers are unaffected
        players.get_mut(2).unwrap().updates.reset();
        assert!(updater.update(2, &mut players, &regions).is_ok());
        assert_eq!(updater.pool().available(), 2);
    }
}
