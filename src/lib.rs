pub mod board;
pub mod config;
pub mod constants;
pub mod engine;
pub mod piece;
pub mod rate_limiter;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod session_manager;
pub mod snapshot_store;
pub mod types;
