use crate::board::Board;
use crate::constants::{level_for_lines, line_clear_points};
use crate::piece::Piece;
use crate::rng::PieceGenerator;
use crate::types::{GameState, GameSummary, Move};

pub mod collision;

use self::collision::{clear, is_legal, merge};

/// Result of one gravity pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Fell,
    Locked { cleared: usize },
    ToppedOut,
    /// The game was already over; nothing changed.
    Halted,
}

impl TickOutcome {
    pub fn is_applied(self) -> bool {
        !matches!(self, Self::Halted)
    }
}

/// Single-writer state machine for one session's game.
#[derive(Clone, Debug)]
pub struct GameEngine {
    state: GameState,
    generator: PieceGenerator,
    pieces_placed: u64,
}

impl GameEngine {
    pub fn new(seed: u64) -> Self {
        Self::with_generator(PieceGenerator::new(seed))
    }

    pub fn with_generator(mut generator: PieceGenerator) -> Self {
        let current_piece = Piece::spawn(generator.next_kind());
        let next_piece = Piece::spawn(generator.next_kind());
        Self {
            state: GameState {
                board: Board::empty(),
                current_piece,
                next_piece,
                score: 0,
                level: 1,
                lines: 0,
                game_over: false,
            },
            generator,
            pieces_placed: 0,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn is_over(&self) -> bool {
        self.state.game_over
    }

    pub fn pieces_placed(&self) -> u64 {
        self.pieces_placed
    }

    /// Returns `false` when the move is illegal or the game is over; the
    /// state is untouched in both cases.
    pub fn apply_move(&mut self, mv: Move) -> bool {
        if self.state.game_over {
            return false;
        }
        match mv {
            Move::Left => self.try_replace(self.state.current_piece.translated(-1, 0)),
            Move::Right => self.try_replace(self.state.current_piece.translated(1, 0)),
            Move::Down => self.try_replace(self.state.current_piece.translated(0, 1)),
            Move::Rotate => self.try_replace(self.state.current_piece.rotated()),
            Move::HardDrop => {
                self.hard_drop();
                true
            }
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.state.game_over {
            return TickOutcome::Halted;
        }
        if self.try_replace(self.state.current_piece.translated(0, 1)) {
            return TickOutcome::Fell;
        }
        self.lock()
    }

    pub fn build_summary(&self) -> GameSummary {
        GameSummary {
            score: self.state.score,
            lines: self.state.lines,
            level: self.state.level,
            pieces_placed: self.pieces_placed,
            game_over: self.state.game_over,
        }
    }

    fn try_replace(&mut self, candidate: Piece) -> bool {
        if !is_legal(&self.state.board, &candidate) {
            return false;
        }
        self.state.current_piece = candidate;
        true
    }

    fn hard_drop(&mut self) -> TickOutcome {
        while self.try_replace(self.state.current_piece.translated(0, 1)) {}
        self.lock()
    }

    fn lock(&mut self) -> TickOutcome {
        let merged = merge(&self.state.board, &self.state.current_piece);
        self.pieces_placed += 1;

        // A spawn blocked by the merged stack ends the game before any
        // clear is scored; the board keeps the merged cells.
        if !is_legal(&merged, &self.state.next_piece) {
            self.state.board = merged;
            self.promote_next();
            self.state.game_over = true;
            return TickOutcome::ToppedOut;
        }

        let (board, cleared) = clear(&merged);
        self.state.board = board;
        if cleared > 0 {
            self.state.score += line_clear_points(cleared, self.state.level);
            self.state.lines += cleared as u32;
            self.state.level = level_for_lines(self.state.lines);
        }

        self.promote_next();
        if !is_legal(&self.state.board, &self.state.current_piece) {
            self.state.game_over = true;
            return TickOutcome::ToppedOut;
        }
        TickOutcome::Locked { cleared }
    }

    fn promote_next(&mut self) {
        let upcoming = Piece::spawn(self.generator.next_kind());
        self.state.current_piece = std::mem::replace(&mut self.state.next_piece, upcoming);
    }
}

/// Whether `mv` would be accepted against `state`, without applying it.
pub fn would_accept(state: &GameState, mv: Move) -> bool {
    if state.game_over {
        return false;
    }
    let candidate = match mv {
        Move::Left => state.current_piece.translated(-1, 0),
        Move::Right => state.current_piece.translated(1, 0),
        Move::Down => state.current_piece.translated(0, 1),
        Move::Rotate => state.current_piece.rotated(),
        Move::HardDrop => return true,
    };
    is_legal(&state.board, &candidate)
}
