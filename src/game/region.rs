//! Spatial buckets
//!
//! The world is partitioned into square regions of [`REGION_SIZE`] tiles.
//! A [`Region`] only stores entity handles; positions and states live on
//! the entities themselves and are resolved through an [`EntityLookup`].
//!
//! [`REGION_SIZE`]: crate::game::position::REGION_SIZE

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::game::entity::{Entity, EntityId, EntityType};
use crate::game::position::{Position, RegionCoordinates};

/// Resolves entity handles to their records
pub trait EntityLookup {
    fn entity(&self, id: EntityId) -> Option<&Entity>;
}

/// Entities currently located in one region
#[derive(Debug, Clone)]
pub struct Region {
    coordinates: RegionCoordinates,
    entities: HashSet<EntityId>,
}

impl Region {
    pub fn new(coordinates: RegionCoordinates) -> Self {
        Self {
            coordinates,
            entities: HashSet::new(),
        }
    }

    pub fn coordinates(&self) -> RegionCoordinates {
        self.coordinates
    }

    /// Add an entity; returns false if it was already present
    pub fn add(&mut self, id: EntityId) -> bool {
        self.entities.insert(id)
    }

    /// Remove an entity; returns false if it was not present
    pub fn remove(&mut self, id: &EntityId) -> bool {
        self.entities.remove(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.iter()
    }
}

/// Registry of every region, created lazily on first reference
#[derive(Debug, Default)]
pub struct RegionManager {
    regions: HashMap<RegionCoordinates, Region>,
}

impl RegionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The region at `coordinates`, created if absent
    pub fn region_for(&mut self, coordinates: RegionCoordinates) -> &mut Region {
        self.regions.entry(coordinates).or_insert_with(|| {
            trace!(region = %coordinates, "Region created");
            Region::new(coordinates)
        })
    }

    /// The region at `coordinates` if it has ever been referenced
    pub fn get(&self, coordinates: &RegionCoordinates) -> Option<&Region> {
        self.regions.get(coordinates)
    }

    /// All resident regions
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    /// Number of resident regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Handles in the region of `position` and its eight neighbours
    pub fn surrounding(&self, position: &Position) -> Vec<EntityId> {
        position
            .region()
            .surrounding()
            .filter_map(|coordinates| self.regions.get(&coordinates))
            .flat_map(|region| region.entities().copied())
            .collect()
    }

    /// ACTIVE entities viewable from `position`, sorted by handle
    pub fn entities_near(&self, position: &Position, lookup: &dyn EntityLookup) -> Vec<EntityId> {
        let mut near: Vec<EntityId> = self
            .surrounding(position)
            .into_iter()
            .filter(|id| {
                lookup.entity(*id).map_or(false, |entity| {
                    entity.is_active()
                        && entity
                            .position()
                            .map_or(false, |p| p.is_viewable(position))
                })
            })
            .collect();
        near.sort_unstable();
        near
    }

    /// Viewable ACTIVE players near `position`
    pub fn players_near(&self, position: &Position, lookup: &dyn EntityLookup) -> Vec<u16> {
        self.entities_near(position, lookup)
            .into_iter()
            .filter(|id| id.kind == EntityType::Player)
            .map(|id| id.index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{EntityState, NoopListener};

    struct Entities(Vec<Entity>);

    impl EntityLookup for Entities {
        fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.0.iter().find(|e| e.id() == id)
        }
    }

    fn spawn(regions: &mut RegionManager, index: u16, at: Position, active: bool) -> Entity {
        let mut entity = Entity::new(EntityId::player(index), &mut NoopListener);
        entity.set_position(at, regions, &mut NoopListener).unwrap();
        if active {
            entity
                .set_state(EntityState::Active, regions, &mut NoopListener)
                .unwrap();
        }
        entity
    }

    #[test]
    fn test_region_for_is_idempotent() {
        let mut regions = RegionManager::new();
        let coordinates = RegionCoordinates::new(100, 100);
        regions.region_for(coordinates).add(EntityId::player(1));
        assert!(regions.region_for(coordinates).contains(&EntityId::player(1)));
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn test_empty_query() {
        let regions = RegionManager::new();
        let lookup = Entities(Vec::new());
        assert!(regions
            .entities_near(&Position::new(3200, 3200, 0), &lookup)
            .is_empty());
    }

    #[test]
    fn test_entities_near_filters() {
        let mut regions = RegionManager::new();
        let centre = Position::new(3200, 3200, 0);
        let lookup = Entities(vec![
            // across a region boundary but in view
            spawn(&mut regions, 1, Position::new(3190, 3200, 0), true),
            // idle
            spawn(&mut regions, 2, Position::new(3201, 3200, 0), false),
            // other plane
            spawn(&mut regions, 3, Position::new(3200, 3200, 1), true),
            // neighbouring region, out of view
            spawn(&mut regions, 4, Position::new(3230, 3200, 0), true),
            spawn(&mut regions, 5, Position::new(3215, 3185, 0), true),
        ]);

        assert_eq!(
            regions.entities_near(&centre, &lookup),
            vec![EntityId::player(1), EntityId::player(5)]
        );
        assert_eq!(regions.players_near(&centre, &lookup), vec![1, 5]);
    }
}
