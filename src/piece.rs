use serde::{Deserialize, Serialize};

use crate::constants::BOARD_WIDTH;
use crate::types::PieceKind;

/// Immutable occupancy matrix for one rotation of a piece.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<u8>>", try_from = "Vec<Vec<u8>>")]
pub struct Shape {
    cells: Vec<Vec<bool>>,
}

impl Shape {
    pub fn of(kind: PieceKind) -> Self {
        let pattern: &[&[u8]] = match kind {
            PieceKind::I => &[&[1, 1, 1, 1]],
            PieceKind::O => &[&[1, 1], &[1, 1]],
            PieceKind::T => &[&[0, 1, 0], &[1, 1, 1]],
            PieceKind::S => &[&[0, 1, 1], &[1, 1, 0]],
            PieceKind::Z => &[&[1, 1, 0], &[0, 1, 1]],
            PieceKind::J => &[&[1, 0, 0], &[1, 1, 1]],
            PieceKind::L => &[&[0, 0, 1], &[1, 1, 1]],
        };
        Self {
            cells: pattern
                .iter()
                .map(|row| row.iter().map(|cell| *cell != 0).collect())
                .collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn columns(&self) -> usize {
        self.cells.first().map(Vec::len).unwrap_or(0)
    }

    /// `(row, col)` of every occupied cell.
    pub fn filled_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .filter(|(_, filled)| **filled)
                .map(move |(col, _)| (row, col))
        })
    }

    /// Transpose, then reverse each row: `out[col][rows - 1 - row] = in[row][col]`.
    pub fn rotated_clockwise(&self) -> Self {
        let rows = self.rows();
        let columns = self.columns();
        let mut cells = vec![vec![false; rows]; columns];
        for (row, source) in self.cells.iter().enumerate() {
            for (col, filled) in source.iter().enumerate() {
                cells[col][rows - 1 - row] = *filled;
            }
        }
        Self { cells }
    }
}

impl From<Shape> for Vec<Vec<u8>> {
    fn from(shape: Shape) -> Self {
        shape
            .cells
            .into_iter()
            .map(|row| row.into_iter().map(u8::from).collect())
            .collect()
    }
}

impl TryFrom<Vec<Vec<u8>>> for Shape {
    type Error = String;

    fn try_from(raw: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        let columns = raw.first().map(Vec::len).unwrap_or(0);
        if raw.is_empty() || columns == 0 {
            return Err("shape must have at least one cell".to_string());
        }
        if raw.iter().any(|row| row.len() != columns) {
            return Err("shape rows must all have the same length".to_string());
        }
        Ok(Self {
            cells: raw
                .into_iter()
                .map(|row| row.into_iter().map(|cell| cell != 0).collect())
                .collect(),
        })
    }
}

/// A piece in board space: its current rotation anchored at `(x, y)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    #[serde(rename = "type")]
    pub kind: PieceKind,
    pub shape: Shape,
    pub x: i32,
    pub y: i32,
}

impl Piece {
    pub fn spawn(kind: PieceKind) -> Self {
        let (x, y) = spawn_position(kind);
        Self {
            kind,
            shape: Shape::of(kind),
            x,
            y,
        }
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self.clone()
        }
    }

    pub fn rotated(&self) -> Self {
        Self {
            shape: self.shape.rotated_clockwise(),
            ..self.clone()
        }
    }

    /// Board coordinates covered by the occupied cells.
    pub fn footprint(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.shape
            .filled_cells()
            .map(move |(row, col)| (self.x + col as i32, self.y + row as i32))
    }
}

pub fn spawn_position(kind: PieceKind) -> (i32, i32) {
    let columns = Shape::of(kind).columns();
    (((BOARD_WIDTH - columns) / 2) as i32, 0)
}
