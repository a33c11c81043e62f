//! Board and ship value types

use serde::{Deserialize, Serialize};

/// Ship orientation on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A vessel placed on a board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ship {
    pub id: String,
    pub size: u8,
    pub orientation: Orientation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placed: Option<bool>,
}

/// One grid cell.
///
/// `blocked` is a placement-time marker for cells next to a ship; combat
/// never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardCell {
    pub x: usize,
    pub y: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship: Option<Ship>,
    pub has_ship: bool,
    #[serde(default)]
    pub is_hit: bool,
    #[serde(default)]
    pub blocked: bool,
}

impl BoardCell {
    #[cfg(test)]
    pub fn empty(x: usize, y: usize) -> Self {
        Self {
            x,
            y,
            ship: None,
            has_ship: false,
            is_hit: false,
            blocked: false,
        }
    }

    /// Occupied and not yet hit
    pub fn is_afloat(&self) -> bool {
        self.has_ship && !self.is_hit
    }
}

/// Row-major grid, addressed as `rows[y][x]`.
///
/// Placement legality is the client's business; the server takes the layout
/// as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    rows: Vec<Vec<BoardCell>>,
}

impl Board {
    /// An all-water square board
    #[cfg(test)]
    pub fn empty(size: usize) -> Self {
        let rows = (0..size)
            .map(|y| (0..size).map(|x| BoardCell::empty(x, y)).collect())
            .collect();
        Self { rows }
    }

    /// Builder used mostly by tests: mark a cell as occupied by `ship`
    #[cfg(test)]
    pub fn with_ship_at(mut self, x: usize, y: usize, ship: &Ship) -> Self {
        if let Some(cell) = self.cell_mut(x, y) {
            cell.has_ship = true;
            cell.ship = Some(ship.clone());
        }
        self
    }

    #[cfg(test)]
    pub fn cell(&self, x: usize, y: usize) -> Option<&BoardCell> {
        self.rows.get(y).and_then(|row| row.get(x))
    }

    pub fn cell_mut(&mut self, x: usize, y: usize) -> Option<&mut BoardCell> {
        self.rows.get_mut(y).and_then(|row| row.get_mut(x))
    }

    /// Fire at `(x, y)`: marks the cell hit and reports whether a ship was
    /// there. `None` when the coordinate is off the grid.
    pub fn strike(&mut self, x: usize, y: usize) -> Option<bool> {
        let cell = self.cell_mut(x, y)?;
        cell.is_hit = true;
        Some(cell.has_ship)
    }

    /// At least one ship cell has not been hit
    pub fn has_survivors(&self) -> bool {
        self.rows.iter().flatten().any(BoardCell::is_afloat)
    }
}
