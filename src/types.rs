use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::piece::Piece;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::I => "I",
            Self::O => "O",
            Self::T => "T",
            Self::S => "S",
            Self::Z => "Z",
            Self::J => "J",
            Self::L => "L",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Move {
    Left,
    Right,
    Down,
    Rotate,
    HardDrop,
}

impl Move {
    pub const ALL: [Move; 5] = [
        Move::Left,
        Move::Right,
        Move::Down,
        Move::Rotate,
        Move::HardDrop,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LEFT" => Some(Self::Left),
            "RIGHT" => Some(Self::Right),
            "DOWN" => Some(Self::Down),
            "ROTATE" => Some(Self::Rotate),
            "HARD_DROP" => Some(Self::HardDrop),
            _ => None,
        }
    }
}

/// Everything a client needs to render one session, and everything the
/// snapshot store keeps for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub board: Board,
    #[serde(rename = "currentPiece")]
    pub current_piece: Piece,
    #[serde(rename = "nextPiece")]
    pub next_piece: Piece,
    pub score: u64,
    pub level: u32,
    pub lines: u32,
    #[serde(rename = "gameOver")]
    pub game_over: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameSummary {
    pub score: u64,
    pub lines: u32,
    pub level: u32,
    #[serde(rename = "piecesPlaced")]
    pub pieces_placed: u64,
    #[serde(rename = "gameOver")]
    pub game_over: bool,
}
