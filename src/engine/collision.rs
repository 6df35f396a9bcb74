//! Pure placement rules. Nothing here mutates its inputs.

use crate::board::{Board, Row};
use crate::constants::{BOARD_HEIGHT, BOARD_WIDTH};
use crate::piece::Piece;

/// Cells above the board (`y < 0`) are only checked horizontally.
pub fn is_legal(board: &Board, piece: &Piece) -> bool {
    piece.footprint().all(|(x, y)| {
        if x < 0 || x as usize >= BOARD_WIDTH || y >= BOARD_HEIGHT as i32 {
            return false;
        }
        y < 0 || !board.is_occupied(x, y)
    })
}

/// Copies `board` with the piece's in-bounds cells set.
pub fn merge(board: &Board, piece: &Piece) -> Board {
    let mut merged = *board;
    for (x, y) in piece.footprint() {
        merged.set(x, y, true);
    }
    merged
}

/// Drops every full row and pads the top with empty rows.
pub fn clear(board: &Board) -> (Board, usize) {
    let kept: Vec<Row> = board
        .rows()
        .iter()
        .filter(|row| !row.iter().all(|cell| *cell))
        .copied()
        .collect();
    let cleared = BOARD_HEIGHT - kept.len();

    let mut rows = [[false; BOARD_WIDTH]; BOARD_HEIGHT];
    rows[cleared..].copy_from_slice(&kept);
    (Board::from_rows(rows), cleared)
}
