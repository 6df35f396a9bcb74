use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::constants::{snapshot_key, SNAPSHOT_QUEUE_CAPACITY, SNAPSHOT_TTL_SECS};
use crate::engine::GameEngine;
use crate::rate_limiter::{RateLimiter, RateLimiterOptions};
use crate::rng::PieceGenerator;
use crate::server_utils::{mint_client_id, now_ms};
use crate::snapshot_store::{SnapshotStore, SnapshotWriter};
use crate::types::{GameState, Move};

#[derive(Clone, Copy, Debug)]
pub struct SessionManagerOptions {
    pub rate_limit: RateLimiterOptions,
    pub snapshot_ttl_secs: u64,
    pub snapshot_queue_capacity: usize,
    pub max_clients: usize,
    /// Fixed piece seed for reproducible games; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for SessionManagerOptions {
    fn default() -> Self {
        Self {
            rate_limit: RateLimiterOptions::default(),
            snapshot_ttl_secs: SNAPSHOT_TTL_SECS,
            snapshot_queue_capacity: SNAPSHOT_QUEUE_CAPACITY,
            max_clients: 10_000,
            seed: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Rate limit exceeded")]
    Throttled,
    #[error("No active game found")]
    NoActiveGame,
    /// The id was never issued by `on_connect`, or has already ended.
    #[error("Unknown client")]
    UnknownClient,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied(GameState),
    /// Legal input that the rules refused; nothing changed.
    Rejected,
}

struct Registry {
    clients: HashSet<String>,
    games: HashMap<String, GameEngine>,
    limiter: RateLimiter,
    games_started: u64,
}

impl Registry {
    /// Only issued ids get a rate window, so the limiter never outgrows
    /// `max_clients`.
    fn admit(&mut self, client_id: &str, now_ms: u64) -> Result<(), SessionError> {
        if !self.clients.contains(client_id) {
            return Err(SessionError::UnknownClient);
        }
        if !self.limiter.try_acquire(client_id, now_ms) {
            debug!("[session] client {client_id} throttled");
            return Err(SessionError::Throttled);
        }
        Ok(())
    }
}

/// Owns every live game and every rate-limit window, keyed by client id.
///
/// Rule evaluation happens under the registry lock; store I/O never does.
pub struct SessionManager {
    options: SessionManagerOptions,
    registry: Mutex<Registry>,
    store: Arc<dyn SnapshotStore>,
    writer: SnapshotWriter,
}

impl SessionManager {
    /// Must be called inside a tokio runtime; spawns the snapshot writer.
    pub fn new(store: Arc<dyn SnapshotStore>, options: SessionManagerOptions) -> Self {
        let writer = SnapshotWriter::spawn(
            store.clone(),
            options.snapshot_ttl_secs,
            options.snapshot_queue_capacity,
        );
        Self {
            options,
            registry: Mutex::new(Registry {
                clients: HashSet::new(),
                games: HashMap::new(),
                limiter: RateLimiter::new(options.rate_limit),
                games_started: 0,
            }),
            store,
            writer,
        }
    }

    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        self.store.clone()
    }

    /// Issues an opaque identity for a new connection, or `None` when the
    /// server is at capacity.
    pub async fn on_connect(&self) -> Option<String> {
        let mut registry = self.registry.lock().await;
        if registry.clients.len() >= self.options.max_clients {
            warn!(
                "[session] refusing connection: {} clients connected",
                registry.clients.len()
            );
            return None;
        }
        let client_id = mint_client_id();
        registry.clients.insert(client_id.clone());
        info!("[session] client {client_id} connected");
        Some(client_id)
    }

    /// Tears down the game and rate-limit window together and removes the
    /// stored snapshot. Safe to call for unknown clients.
    pub async fn on_disconnect(&self, client_id: &str) {
        self.end(client_id).await;
    }

    /// Creates a fresh game, replacing any previous one for this client.
    pub async fn start(&self, client_id: &str) -> Result<GameState, SessionError> {
        let state = {
            let mut registry = self.registry.lock().await;
            if !registry.clients.contains(client_id) {
                return Err(SessionError::UnknownClient);
            }
            let generator = match self.options.seed {
                Some(seed) => PieceGenerator::new(seed.wrapping_add(registry.games_started)),
                None => PieceGenerator::from_entropy(),
            };
            registry.games_started += 1;

            let engine = GameEngine::with_generator(generator);
            let state = engine.state().clone();
            if registry
                .games
                .insert(client_id.to_string(), engine)
                .is_some()
            {
                info!("[session] client {client_id} restarted its game");
            } else {
                info!("[session] client {client_id} started a game");
            }
            state
        };
        self.persist(client_id, &state);
        Ok(state)
    }

    pub async fn command(&self, client_id: &str, mv: Move) -> Result<CommandOutcome, SessionError> {
        self.command_at(client_id, mv, now_ms()).await
    }

    /// Rate check, then the move, then one gravity pass when the move was
    /// accepted.
    pub async fn command_at(
        &self,
        client_id: &str,
        mv: Move,
        now_ms: u64,
    ) -> Result<CommandOutcome, SessionError> {
        let state = {
            let mut registry = self.registry.lock().await;
            registry.admit(client_id, now_ms)?;
            let Some(engine) = registry.games.get_mut(client_id) else {
                return Err(SessionError::NoActiveGame);
            };
            if !engine.apply_move(mv) {
                debug!("[session] client {client_id} move {mv:?} rejected");
                return Ok(CommandOutcome::Rejected);
            }
            let outcome = engine.tick();
            debug!("[session] client {client_id} move {mv:?} applied, tick {outcome:?}");
            if engine.is_over() {
                info!(
                    "[session] client {client_id} game over with score {}",
                    engine.state().score
                );
            }
            engine.state().clone()
        };
        self.persist(client_id, &state);
        Ok(CommandOutcome::Applied(state))
    }

    /// Spends one rate token for a MOVE frame that never reached the engine.
    pub async fn charge(&self, client_id: &str) -> Result<(), SessionError> {
        self.charge_at(client_id, now_ms()).await
    }

    pub async fn charge_at(&self, client_id: &str, now_ms: u64) -> Result<(), SessionError> {
        self.registry.lock().await.admit(client_id, now_ms)
    }

    /// One passive gravity step. `None` when there is no running game.
    pub async fn gravity(&self, client_id: &str) -> Option<GameState> {
        let state = {
            let mut registry = self.registry.lock().await;
            let engine = registry.games.get_mut(client_id)?;
            if !engine.tick().is_applied() {
                return None;
            }
            engine.state().clone()
        };
        self.persist(client_id, &state);
        Some(state)
    }

    pub async fn state(&self, client_id: &str) -> Option<GameState> {
        let registry = self.registry.lock().await;
        registry
            .games
            .get(client_id)
            .map(|engine| engine.state().clone())
    }

    pub async fn end(&self, client_id: &str) {
        let had_game = {
            let mut registry = self.registry.lock().await;
            registry.clients.remove(client_id);
            registry.limiter.forget(client_id);
            registry.games.remove(client_id).is_some()
        };
        self.writer.delete(snapshot_key(client_id));
        info!("[session] client {client_id} ended (had game: {had_game})");
    }

    /// Best-effort read of the stored snapshot.
    pub async fn load(&self, client_id: &str) -> Option<GameState> {
        let key = snapshot_key(client_id);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(error) => {
                warn!("[store] failed to load {key}: {error}");
                return None;
            }
        };
        match serde_json::from_str::<GameState>(&raw) {
            Ok(state) => Some(state),
            Err(error) => {
                warn!("[store] discarding unreadable snapshot {key}: {error}");
                None
            }
        }
    }

    /// Waits until every snapshot operation issued so far has reached the store.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub async fn active_games(&self) -> usize {
        self.registry.lock().await.games.len()
    }

    pub async fn connected_clients(&self) -> usize {
        self.registry.lock().await.clients.len()
    }

    pub async fn rate_limited_clients(&self) -> usize {
        self.registry.lock().await.limiter.tracked_clients()
    }

    fn persist(&self, client_id: &str, state: &GameState) {
        match serde_json::to_string(state) {
            Ok(payload) => self.writer.save(snapshot_key(client_id), payload),
            Err(error) => error!("[store] failed to serialize snapshot for {client_id}: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::snapshot_store::{MemoryStore, StoreError};

    struct FailingStore;

    #[async_trait]
    impl SnapshotStore for FailingStore {
        async fn set(&self, _key: &str, _value: &str, _ttl: u64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn del(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    fn options() -> SessionManagerOptions {
        SessionManagerOptions {
            seed: Some(11),
            ..SessionManagerOptions::default()
        }
    }

    fn manager_with(store: Arc<dyn SnapshotStore>) -> SessionManager {
        SessionManager::new(store, options())
    }

    #[tokio::test]
    async fn command_before_start_reports_missing_game() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let client = manager.on_connect().await.expect("connects");
        assert_eq!(
            manager.command_at(&client, Move::Left, 0).await,
            Err(SessionError::NoActiveGame)
        );
    }

    #[tokio::test]
    async fn start_persists_snapshot_under_session_key() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        let client = manager.on_connect().await.expect("connects");

        let state = manager.start(&client).await.expect("started");
        manager.flush().await;

        let raw = store
            .get(&snapshot_key(&client))
            .await
            .expect("get")
            .expect("snapshot stored");
        let stored: GameState = serde_json::from_str(&raw).expect("parses");
        assert_eq!(stored, state);
        assert_eq!(manager.load(&client).await, Some(state));
    }

    #[tokio::test]
    async fn accepted_move_runs_one_gravity_pass() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let client = manager.on_connect().await.expect("connects");
        let before = manager.start(&client).await.expect("started");

        let outcome = manager
            .command_at(&client, Move::Left, 0)
            .await
            .expect("not throttled");
        let CommandOutcome::Applied(after) = outcome else {
            panic!("left from spawn should be accepted");
        };
        assert_eq!(after.current_piece.x, before.current_piece.x - 1);
        assert_eq!(after.current_piece.y, before.current_piece.y + 1);
    }

    #[tokio::test]
    async fn rejected_move_leaves_state_alone() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let client = manager.on_connect().await.expect("connects");
        manager.start(&client).await.expect("started");

        let mut now = 0;
        while let Ok(CommandOutcome::Applied(_)) = manager.command_at(&client, Move::Left, now).await
        {
            now += 2_000;
        }
        let before = manager.state(&client).await.expect("game exists");
        assert_eq!(
            manager.command_at(&client, Move::Left, now + 2_000).await,
            Ok(CommandOutcome::Rejected)
        );
        assert_eq!(manager.state(&client).await, Some(before));
    }

    #[tokio::test]
    async fn throttled_command_does_not_touch_state() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let client = manager.on_connect().await.expect("connects");
        manager.start(&client).await.expect("started");

        for _ in 0..10 {
            assert!(manager.command_at(&client, Move::Down, 5).await.is_ok());
        }
        let before = manager.state(&client).await;
        assert_eq!(
            manager.command_at(&client, Move::Down, 6).await,
            Err(SessionError::Throttled)
        );
        assert_eq!(manager.state(&client).await, before);
        assert!(manager.command_at(&client, Move::Down, 1_006).await.is_ok());
    }

    #[tokio::test]
    async fn throttle_is_checked_before_session_lookup() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let client = manager.on_connect().await.expect("connects");
        for _ in 0..10 {
            assert_eq!(
                manager.command_at(&client, Move::Left, 0).await,
                Err(SessionError::NoActiveGame)
            );
        }
        assert_eq!(
            manager.command_at(&client, Move::Left, 0).await,
            Err(SessionError::Throttled)
        );
    }

    #[tokio::test]
    async fn ids_never_issued_are_rejected_without_state() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        assert_eq!(manager.start("ghost").await, Err(SessionError::UnknownClient));
        assert_eq!(
            manager.command_at("ghost", Move::Left, 0).await,
            Err(SessionError::UnknownClient)
        );
        assert_eq!(
            manager.charge_at("ghost", 0).await,
            Err(SessionError::UnknownClient)
        );
        assert_eq!(manager.connected_clients().await, 0);
        assert_eq!(manager.active_games().await, 0);
        assert_eq!(manager.rate_limited_clients().await, 0);

        let client = manager.on_connect().await.expect("connects");
        manager.on_disconnect(&client).await;
        assert_eq!(manager.start(&client).await, Err(SessionError::UnknownClient));
    }

    #[tokio::test]
    async fn charge_spends_the_same_budget_as_commands() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let client = manager.on_connect().await.expect("connects");
        manager.start(&client).await.expect("started");

        for _ in 0..5 {
            assert_eq!(manager.charge_at(&client, 0).await, Ok(()));
        }
        for _ in 0..5 {
            assert!(manager.command_at(&client, Move::Rotate, 0).await.is_ok());
        }
        assert_eq!(manager.charge_at(&client, 0).await, Err(SessionError::Throttled));
        assert_eq!(
            manager.command_at(&client, Move::Rotate, 0).await,
            Err(SessionError::Throttled)
        );
    }

    #[tokio::test]
    async fn end_removes_game_window_and_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager_with(store.clone());
        let client = manager.on_connect().await.expect("connects");
        manager.start(&client).await.expect("started");
        manager
            .command_at(&client, Move::Right, 0)
            .await
            .expect("not throttled");
        assert_eq!(manager.rate_limited_clients().await, 1);

        manager.on_disconnect(&client).await;
        manager.flush().await;

        assert_eq!(manager.active_games().await, 0);
        assert_eq!(manager.connected_clients().await, 0);
        assert_eq!(manager.rate_limited_clients().await, 0);
        assert_eq!(store.get(&snapshot_key(&client)).await.expect("get"), None);
        manager.end(&client).await;
    }

    #[tokio::test]
    async fn restart_replaces_previous_game() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let client = manager.on_connect().await.expect("connects");
        manager.start(&client).await.expect("started");
        manager
            .command_at(&client, Move::HardDrop, 0)
            .await
            .expect("not throttled");

        let fresh = manager.start(&client).await.expect("started");
        assert_eq!(fresh.board.occupied_count(), 0);
        assert_eq!(manager.active_games().await, 1);
    }

    #[tokio::test]
    async fn store_failures_do_not_affect_gameplay() {
        let manager = manager_with(Arc::new(FailingStore));
        let client = manager.on_connect().await.expect("connects");
        manager.start(&client).await.expect("started");
        let outcome = manager
            .command_at(&client, Move::Rotate, 0)
            .await
            .expect("not throttled");
        assert!(matches!(outcome, CommandOutcome::Applied(_)));
        manager.flush().await;
        assert_eq!(manager.load(&client).await, None);
        manager.end(&client).await;
    }

    #[tokio::test]
    async fn gravity_advances_only_running_games() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let client = manager.on_connect().await.expect("connects");
        assert_eq!(manager.gravity(&client).await, None);

        let before = manager.start(&client).await.expect("started");
        let after = manager.gravity(&client).await.expect("running game");
        assert_eq!(after.current_piece.y, before.current_piece.y + 1);
    }

    #[tokio::test]
    async fn connections_are_refused_at_capacity() {
        let manager = SessionManager::new(
            Arc::new(MemoryStore::new()),
            SessionManagerOptions {
                max_clients: 1,
                ..options()
            },
        );
        let first = manager.on_connect().await.expect("first connects");
        assert!(manager.on_connect().await.is_none());
        manager.on_disconnect(&first).await;
        assert!(manager.on_connect().await.is_some());
    }

    #[tokio::test]
    async fn clients_do_not_share_games() {
        let manager = manager_with(Arc::new(MemoryStore::new()));
        let a = manager.on_connect().await.expect("a connects");
        let b = manager.on_connect().await.expect("b connects");
        assert_ne!(a, b);
        manager.start(&a).await.expect("started");
        let b_before = manager.start(&b).await.expect("started");

        manager
            .command_at(&a, Move::HardDrop, 0)
            .await
            .expect("not throttled");
        assert_eq!(manager.state(&b).await, Some(b_before));
    }
}
