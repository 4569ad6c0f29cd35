//! Authoritative world state owned by the broker loop

use rand::Rng;
use tracing::debug;

use crate::message::{Point, Position, WindowSize};

/// Random draws before falling back to a full scan for a free cell
const RELOCATE_ATTEMPTS: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct WorldState {
    drone: Position,
    obstacles: Vec<Point>,
    targets: Vec<Point>,
    window: WindowSize,
    force: [f32; 8],
    remote: Option<Position>,
}

impl WorldState {
    pub fn new(window: WindowSize) -> Self {
        Self {
            drone: Position::default(),
            obstacles: Vec::new(),
            targets: Vec::new(),
            window,
            force: [0.0; 8],
            remote: None,
        }
    }

    pub fn drone(&self) -> Position {
        self.drone
    }

    pub fn obstacles(&self) -> &[Point] {
        &self.obstacles
    }

    pub fn targets(&self) -> &[Point] {
        &self.targets
    }

    pub fn window(&self) -> WindowSize {
        self.window
    }

    pub fn force(&self) -> [f32; 8] {
        self.force
    }

    /// Last position reported for the peer's drone
    pub fn remote(&self) -> Option<Position> {
        self.remote
    }

    pub fn set_drone(&mut self, position: Position) {
        self.drone = position;
    }

    pub fn set_window(&mut self, window: WindowSize) {
        self.window = window;
    }

    pub fn set_force(&mut self, force: [f32; 8]) {
        self.force = force;
    }

    pub fn set_remote(&mut self, position: Position) {
        self.remote = Some(position);
    }

    pub fn replace_obstacles(&mut self, obstacles: Vec<Point>) {
        self.obstacles = obstacles;
    }

    pub fn replace_targets(&mut self, targets: Vec<Point>) {
        self.targets = targets;
    }

    /// Remove every target on `cell`; returns how many were removed
    pub fn remove_targets_at(&mut self, cell: Point) -> usize {
        let before = self.targets.len();
        self.targets.retain(|t| *t != cell);
        before - self.targets.len()
    }

    /// Inside the border and not taken by a target or by an obstacle other than `moving`
    fn is_free_for(&self, cell: Point, moving: usize) -> bool {
        self.window.contains_inner(cell)
            && !self.targets.contains(&cell)
            && !self
                .obstacles
                .iter()
                .enumerate()
                .any(|(i, o)| i != moving && *o == cell)
    }

    /// Whether a new obstacle could be placed on `cell`
    pub fn is_free(&self, cell: Point) -> bool {
        self.is_free_for(cell, usize::MAX)
    }

    /// Move one random obstacle to a random free cell
    ///
    /// Returns the index moved and its new cell, or `None` when there is no
    /// obstacle or no free cell.
    pub fn relocate_obstacle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<(usize, Point)> {
        if self.obstacles.is_empty() || self.window.width < 3 || self.window.height < 3 {
            return None;
        }
        let index = rng.random_range(0..self.obstacles.len());

        let mut chosen = None;
        for _ in 0..RELOCATE_ATTEMPTS {
            let cell = Point::new(
                rng.random_range(1..self.window.width - 1),
                rng.random_range(1..self.window.height - 1),
            );
            if self.is_free_for(cell, index) {
                chosen = Some(cell);
                break;
            }
        }
        if chosen.is_none() {
            debug!(index, "WorldState::relocate_obstacle: random draws exhausted, scanning");
            chosen = (1..self.window.height - 1)
                .flat_map(|y| (1..self.window.width - 1).map(move |x| Point::new(x, y)))
                .find(|cell| self.is_free_for(*cell, index));
        }

        let cell = chosen?;
        self.obstacles[index] = cell;
        Some((index, cell))
    }
}
