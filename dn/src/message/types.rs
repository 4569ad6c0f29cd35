//! Value types exchanged between workers and the broker

use serde::{Deserialize, Serialize};

/// A grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Continuous drone position in grid units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The cell the drone occupies (truncation toward zero)
    pub fn cell(&self) -> Point {
        Point::new(self.x as i32, self.y as i32)
    }
}

/// Window dimensions in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: i32,
    pub height: i32,
}

impl WindowSize {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Whether a cell lies strictly inside the border
    pub fn contains_inner(&self, p: Point) -> bool {
        p.x > 0 && p.x < self.width - 1 && p.y > 0 && p.y < self.height - 1
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(100, 100)
    }
}

/// Typed messages routed by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Size(WindowSize),
    Position(Position),
    /// drone, obstacle, wall and target force components (x, y each)
    Force([f32; 8]),
    Obstacles(Vec<Point>),
    Targets(Vec<Point>),
    Input(char),
    Pid(u32),
}
