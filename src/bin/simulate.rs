use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tetris_session_server::engine::{would_accept, GameEngine};
use tetris_session_server::types::{GameSummary, Move};

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays seeded games headlessly with a random move policy")]
struct Cli {
    #[arg(long, default_value_t = 1)]
    games: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Stop a game after this many accepted moves even if it is still running.
    #[arg(long, default_value_t = 10_000)]
    max_moves: u64,
}

#[derive(Clone, Debug, Serialize)]
struct GameResultLine {
    seed: u64,
    moves: u64,
    rejected: u64,
    #[serde(flatten)]
    summary: GameSummary,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut total_lines = 0u64;
    let mut total_score = 0u64;
    for game in 0..cli.games {
        let seed = cli.seed.wrapping_add(u64::from(game));
        let result = play_game(seed, cli.max_moves);
        total_lines += u64::from(result.summary.lines);
        total_score += result.summary.score;
        match serde_json::to_string(&result) {
            Ok(line) => println!("{line}"),
            Err(err) => log::error!("[simulate] failed to serialize result for seed {seed}: {err}"),
        }
    }

    info!(
        "[simulate] {} games, {} lines, {} points",
        cli.games, total_lines, total_score
    );
}

/// Drives one game the way a connected client would: a move, then one
/// gravity pass when the move was accepted.
fn play_game(seed: u64, max_moves: u64) -> GameResultLine {
    let mut engine = GameEngine::new(seed);
    let mut policy = StdRng::seed_from_u64(seed ^ 0x5eed);
    let mut moves = 0u64;
    let mut rejected = 0u64;

    while !engine.is_over() && moves < max_moves {
        let mv = choose_move(&mut policy);
        if !would_accept(engine.state(), mv) {
            rejected += 1;
            // A resting piece only moves sideways or locks; force progress.
            if rejected % 8 == 0 {
                engine.apply_move(Move::HardDrop);
                engine.tick();
                moves += 1;
            }
            continue;
        }
        engine.apply_move(mv);
        engine.tick();
        moves += 1;
    }

    GameResultLine {
        seed,
        moves,
        rejected,
        summary: engine.build_summary(),
    }
}

fn choose_move(rng: &mut StdRng) -> Move {
    // Hard drops are rare so the stack has a chance to form lines.
    match rng.random_range(0..20u32) {
        0 => Move::HardDrop,
        1..=5 => Move::Left,
        6..=10 => Move::Right,
        11..=14 => Move::Rotate,
        _ => Move::Down,
    }
}
