use serde::{Deserialize, Serialize};

use crate::constants::{BOARD_HEIGHT, BOARD_WIDTH};

pub type Row = [bool; BOARD_WIDTH];

/// Fixed 10x20 occupancy grid. Row 0 is the spawn row at the top.
///
/// On the wire the grid is an array of rows of `0`/`1` integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<u8>>", try_from = "Vec<Vec<u8>>")]
pub struct Board {
    rows: [Row; BOARD_HEIGHT],
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl Board {
    pub fn empty() -> Self {
        Self {
            rows: [[false; BOARD_WIDTH]; BOARD_HEIGHT],
        }
    }

    pub fn from_rows(rows: [Row; BOARD_HEIGHT]) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row; BOARD_HEIGHT] {
        &self.rows
    }

    pub fn is_occupied(&self, x: i32, y: i32) -> bool {
        if !Self::in_bounds(x, y) {
            return false;
        }
        self.rows[y as usize][x as usize]
    }

    pub fn set(&mut self, x: i32, y: i32, occupied: bool) -> bool {
        if !Self::in_bounds(x, y) {
            return false;
        }
        self.rows[y as usize][x as usize] = occupied;
        true
    }

    pub fn fill_row(&mut self, y: usize) {
        if let Some(row) = self.rows.get_mut(y) {
            *row = [true; BOARD_WIDTH];
        }
    }

    pub fn is_row_full(&self, y: usize) -> bool {
        self.rows
            .get(y)
            .map(|row| row.iter().all(|cell| *cell))
            .unwrap_or(false)
    }

    pub fn occupied_count(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|cell| **cell).count())
            .sum()
    }

    pub fn in_bounds(x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < BOARD_WIDTH && (y as usize) < BOARD_HEIGHT
    }
}

impl From<Board> for Vec<Vec<u8>> {
    fn from(board: Board) -> Self {
        board
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| u8::from(*cell)).collect())
            .collect()
    }
}

impl TryFrom<Vec<Vec<u8>>> for Board {
    type Error = String;

    fn try_from(raw: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        if raw.len() != BOARD_HEIGHT {
            return Err(format!(
                "board must have {BOARD_HEIGHT} rows, got {}",
                raw.len()
            ));
        }
        let mut board = Board::empty();
        for (y, row) in raw.iter().enumerate() {
            if row.len() != BOARD_WIDTH {
                return Err(format!(
                    "board row {y} must have {BOARD_WIDTH} cells, got {}",
                    row.len()
                ));
            }
            for (x, cell) in row.iter().enumerate() {
                board.rows[y][x] = *cell != 0;
            }
        }
        Ok(board)
    }
}
