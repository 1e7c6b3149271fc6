//! Walking queue
//!
//! Holds the tiles a player has been told to walk through. Each tick the
//! world pops one step (two when running) and reports the directions taken,
//! which become the walk/run fields of the movement record.

use std::collections::VecDeque;

use crate::game::position::{Direction, Position};

/// Maximum number of queued steps
pub const MAX_STEPS: usize = 50;

/// Steps taken during one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkStep {
    pub walk: Direction,
    pub run: Option<Direction>,
    /// Tile reached after the step(s)
    pub destination: Position,
}

/// Pending path of single-tile steps
#[derive(Debug, Clone, Default)]
pub struct WalkingQueue {
    steps: VecDeque<Direction>,
    /// Tile the last queued step ends on
    tail: Option<Position>,
    /// Run for the current path (set by the walk message)
    running_path: bool,
}

impl WalkingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Drop every queued step
    pub fn clear(&mut self) {
        self.steps.clear();
        self.tail = None;
        self.running_path = false;
    }

    /// Replace the queue with a path starting at `from` and visiting each
    /// waypoint in order. Gaps between waypoints are filled with straight
    /// or diagonal steps.
    pub fn set_path(&mut self, from: Position, waypoints: &[Position], running_path: bool) {
        self.clear();
        self.tail = Some(from);
        self.running_path = running_path;
        for waypoint in waypoints {
            self.add_waypoint(*waypoint);
        }
    }

    fn add_waypoint(&mut self, target: Position) {
        let Some(mut current) = self.tail else {
            return;
        };
        while self.steps.len() < MAX_STEPS {
            let Some(direction) = Direction::between(&current, &target) else {
                break;
            };
            current = current.step(direction);
            self.steps.push_back(direction);
        }
        self.tail = Some(current);
    }

    /// Pop this tick's step(s) starting from `current`
    pub fn process(&mut self, current: Position) -> Option<WalkStep> {
        let walk = self.steps.pop_front()?;
        let mut destination = current.step(walk);

        let run = if self.running_path {
            self.steps.pop_front()
        } else {
            None
        };
        if let Some(run) = run {
            destination = destination.step(run);
        }

        if self.steps.is_empty() {
            self.tail = None;
            self.running_path = false;
        }

        Some(WalkStep {
            walk,
            run,
            destination,
        })
    }
}
