//! Bounds and grid-cell addressing.
//!
//! The map is an integer grid. Positions arriving from the server are
//! continuous and are floored onto a cell before any legality check.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-width of the default map (the server's quadrant size).
pub const DEFAULT_QUADRANT_SIZE: i32 = 15;

/// Continuous map position as sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Grid cell containing this position.
    ///
    /// Coordinates beyond the `i32` range saturate to the outermost cell and
    /// NaN maps to 0, so such positions are not distinguishable by cell.
    pub fn cell(&self) -> Cell {
        Cell::new(self.x.floor() as i32, self.y.floor() as i32)
    }
}

impl From<Cell> for Position {
    fn from(cell: Cell) -> Self {
        Self::new(cell.x as f64, cell.y as f64)
    }
}

/// Integer grid coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Cell displaced by `(dx, dy)`, or `None` past the edge of the `i32` grid.
    pub fn offset(&self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self::new(self.x.checked_add(dx)?, self.y.checked_add(dy)?))
    }

    /// Manhattan distance, which the server uses for travel time.
    pub fn manhattan(&self, other: &Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Playable area, inclusive on all four edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
}

impl Bounds {
    pub const fn new(x_min: i32, x_max: i32, y_min: i32, y_max: i32) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Square map centred on the origin, `-quadrant..=quadrant` on both axes.
    pub const fn square(quadrant: i32) -> Self {
        Self::new(-quadrant, quadrant, -quadrant, quadrant)
    }

    pub fn contains(&self, cell: Cell) -> bool {
        (self.x_min..=self.x_max).contains(&cell.x) && (self.y_min..=self.y_max).contains(&cell.y)
    }

    /// True when min does not exceed max on either axis.
    pub fn is_valid(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max
    }

    pub fn width(&self) -> u32 {
        if self.is_valid() {
            self.x_max.abs_diff(self.x_min) + 1
        } else {
            0
        }
    }

    pub fn height(&self) -> u32 {
        if self.is_valid() {
            self.y_max.abs_diff(self.y_min) + 1
        } else {
            0
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::square(DEFAULT_QUADRANT_SIZE)
    }
}
