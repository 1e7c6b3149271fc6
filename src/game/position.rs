//! World coordinates
//!
//! - [`Position`]: an absolute tile (x, y, plane)
//! - [`RegionCoordinates`]: the spatial bucket a tile falls into
//! - [`Direction`]: the eight single-tile steps used by movement records

use std::fmt;

/// Chebyshev radius within which two tiles can see each other.
///
/// Add records carry 5-bit signed deltas (-16..=15), so any viewable peer
/// is always encodable.
pub const VIEWING_DISTANCE: i32 = 15;

/// Width and height of a region in tiles
pub const REGION_SIZE: u16 = 32;

/// An absolute tile in the game world
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    /// X coordinate
    pub x: u16,
    /// Y coordinate
    pub y: u16,
    /// Plane (height level 0-3)
    pub z: u8,
}

impl Position {
    /// Create a new position
    pub const fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Chebyshev distance on (x, y), or `None` across planes
    pub fn distance(&self, other: &Position) -> Option<i32> {
        if self.z != other.z {
            return None;
        }
        let dx = (self.x as i32 - other.x as i32).abs();
        let dy = (self.y as i32 - other.y as i32).abs();
        Some(dx.max(dy))
    }

    /// Whether `other` is on the same plane and within [`VIEWING_DISTANCE`]
    pub fn is_viewable(&self, other: &Position) -> bool {
        self.distance(other)
            .map_or(false, |d| d <= VIEWING_DISTANCE)
    }

    /// Chunk (8x8 tile) x coordinate
    pub fn chunk_x(&self) -> u16 {
        self.x >> 3
    }

    /// Chunk (8x8 tile) y coordinate
    pub fn chunk_y(&self) -> u16 {
        self.y >> 3
    }

    /// X of the top-left chunk of the 104x104 map loaded around this tile
    pub fn top_left_chunk_x(&self) -> i32 {
        self.chunk_x() as i32 - 6
    }

    /// Y of the top-left chunk of the 104x104 map loaded around this tile
    pub fn top_left_chunk_y(&self) -> i32 {
        self.chunk_y() as i32 - 6
    }

    /// X relative to the map that was loaded around `base`
    pub fn local_x(&self, base: &Position) -> i32 {
        self.x as i32 - 8 * base.top_left_chunk_x()
    }

    /// Y relative to the map that was loaded around `base`
    pub fn local_y(&self, base: &Position) -> i32 {
        self.y as i32 - 8 * base.top_left_chunk_y()
    }

    /// The region this tile belongs to
    pub fn region(&self) -> RegionCoordinates {
        RegionCoordinates::create(self)
    }

    /// Step one tile in `direction`, saturating at the world edge
    pub fn step(&self, direction: Direction) -> Position {
        let (dx, dy) = direction.delta();
        self.translate(dx, dy)
    }

    /// Offset by (dx, dy), saturating at the world edge
    pub fn translate(&self, dx: i32, dy: i32) -> Position {
        let clamp = |v: i32| v.clamp(0, u16::MAX as i32) as u16;
        Position::new(
            clamp(self.x as i32 + dx),
            clamp(self.y as i32 + dy),
            self.z,
        )
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Identity of a region: tile coordinates divided by [`REGION_SIZE`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoordinates {
    pub x: u16,
    pub y: u16,
}

impl RegionCoordinates {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Region containing `position`
    pub fn create(position: &Position) -> Self {
        Self::new(position.x / REGION_SIZE, position.y / REGION_SIZE)
    }

    /// This region and its eight neighbours
    pub fn surrounding(&self) -> impl Iterator<Item = RegionCoordinates> + '_ {
        (-1i32..=1).flat_map(move |dx| {
            (-1i32..=1).filter_map(move |dy| {
                let x = self.x as i32 + dx;
                let y = self.y as i32 + dy;
                if x < 0 || y < 0 || x > u16::MAX as i32 || y > u16::MAX as i32 {
                    None
                } else {
                    Some(RegionCoordinates::new(x as u16, y as u16))
                }
            })
        })
    }
}

impl fmt::Display for RegionCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

/// A single-tile step. Ids match the client's 3-bit direction field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    NorthWest = 0,
    North = 1,
    NorthEast = 2,
    West = 3,
    East = 4,
    SouthWest = 5,
    South = 6,
    SouthEast = 7,
}

impl Direction {
    /// Wire id (0-7)
    pub fn id(self) -> u8 {
        self as u8
    }

    /// (dx, dy) of one step
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::NorthWest => (-1, 1),
            Direction::North => (0, 1),
            Direction::NorthEast => (1, 1),
            Direction::West => (-1, 0),
            Direction::East => (1, 0),
            Direction::SouthWest => (-1, -1),
            Direction::South => (0, -1),
            Direction::SouthEast => (1, -1),
        }
    }

    /// Direction for a step of (dx, dy), each clamped to -1..=1
    pub fn from_delta(dx: i32, dy: i32) -> Option<Direction> {
        match (dx.signum(), dy.signum()) {
            (-1, 1) => Some(Direction::NorthWest),
            (0, 1) => Some(Direction::North),
            (1, 1) => Some(Direction::NorthEast),
            (-1, 0) => Some(Direction::West),
            (1, 0) => Some(Direction::East),
            (-1, -1) => Some(Direction::SouthWest),
            (0, -1) => Some(Direction::South),
            (1, -1) => Some(Direction::SouthEast),
            _ => None,
        }
    }

    /// Direction of the first step from `from` towards `to`
    pub fn between(from: &Position, to: &Position) -> Option<Direction> {
        Self::from_delta(
            to.x as i32 - from.x as i32,
            to.y as i32 - from.y as i32,
        )
    }
}
