use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::json;
use tetris_session_server::config::ServerConfig;
use tetris_session_server::constants::{
    gravity_interval_ms, CLOSE_INTERNAL_ERROR, CLOSE_POLICY_VIOLATION,
};
use tetris_session_server::server_protocol::{dispatch, ServerMessage, INVALID_MESSAGE_TYPE};
use tetris_session_server::session_manager::SessionManager;
use tetris_session_server::snapshot_store::{FileStore, MemoryStore, SnapshotStore};
use tetris_session_server::types::GameState;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(about = "Server-authoritative falling-block game over WebSocket")]
struct Cli {
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    /// Keep snapshots as JSON files in this directory instead of in memory.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
    /// Push passive gravity ticks to every connection.
    #[arg(long)]
    gravity: bool,
    #[arg(long)]
    max_clients: Option<usize>,
}

impl Cli {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.snapshot_dir.is_some() {
            config.snapshot_dir = self.snapshot_dir;
        }
        if self.gravity {
            config.gravity = true;
        }
        if let Some(max_clients) = self.max_clients {
            config.max_clients = max_clients;
        }
        config
    }
}

#[derive(Clone)]
struct AppState {
    sessions: Arc<SessionManager>,
    gravity: bool,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().apply(ServerConfig::from_env());
    let store: Arc<dyn SnapshotStore> = match &config.snapshot_dir {
        Some(dir) => {
            info!("[server] snapshots stored under {}", dir.display());
            Arc::new(FileStore::new(dir.clone()))
        }
        None => {
            info!("[server] snapshots kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let app_state = AppState {
        sessions: Arc::new(SessionManager::new(store, config.session_options())),
        gravity: config.gravity,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        "[server] listening on {bind_addr} (gravity: {}, rate limit: {}/{}ms)",
        config.gravity, config.rate_limit.capacity, config.rate_limit.window_ms
    );
    axum::serve(listener, app).await
}

async fn health(State(app): State<AppState>) -> impl IntoResponse {
    match app.sessions.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "OK", "redis": "OK", "webSocket": "OK" })),
        ),
        Err(err) => {
            error!("[server] health check failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "Error", "message": "Health check failed" })),
            )
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(app, socket))
}

async fn handle_socket(app: AppState, mut socket: WebSocket) {
    // Runs on its own task so a panic during setup becomes a 1011 close
    // instead of a silently dropped socket.
    let sessions = app.sessions.clone();
    let client_id = match tokio::spawn(async move { sessions.on_connect().await }).await {
        Ok(Some(client_id)) => client_id,
        Ok(None) => {
            close_socket(&mut socket, CLOSE_POLICY_VIOLATION, "Server at capacity").await;
            return;
        }
        Err(err) => {
            error!("[server] connection setup failed: {err}");
            close_socket(&mut socket, CLOSE_INTERNAL_ERROR, "Internal server error").await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let mut gravity = GravityTimer::default();
    loop {
        let received = tokio::select! {
            received = ws_receiver.next() => received,
            _ = gravity.tick() => {
                match app.sessions.gravity(&client_id).await {
                    Some(state) => {
                        gravity.follow(&state);
                        send(&tx, &client_id, ServerMessage::GameState { game_state: state }).await;
                    }
                    None => gravity.stop(),
                }
                continue;
            }
        };
        let Some(Ok(message)) = received else {
            break;
        };

        let raw = match message {
            Message::Text(raw) => raw.to_string(),
            Message::Binary(raw) => match String::from_utf8(raw.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    send(&tx, &client_id, ServerMessage::error(INVALID_MESSAGE_TYPE)).await;
                    continue;
                }
            },
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = handle_client_message(&app.sessions, &client_id, raw).await;
        if app.gravity {
            if let ServerMessage::GameState { game_state } = &reply {
                gravity.follow(game_state);
            }
        }
        send(&tx, &client_id, reply).await;
    }

    app.sessions.on_disconnect(&client_id).await;
    drop(tx);
    let _ = writer.await;
}

/// Frames from one client are handled to completion before the next is read.
async fn handle_client_message(
    sessions: &Arc<SessionManager>,
    client_id: &str,
    raw: String,
) -> ServerMessage {
    let sessions = sessions.clone();
    let owned_id = client_id.to_string();
    match tokio::spawn(async move { dispatch(&sessions, &owned_id, &raw).await }).await {
        Ok(reply) => reply,
        Err(err) => {
            error!("[server] handling a frame from {client_id} failed: {err}");
            ServerMessage::internal_error()
        }
    }
}

async fn send(tx: &mpsc::Sender<String>, client_id: &str, message: ServerMessage) {
    if tx.send(message.to_text()).await.is_err() {
        debug!("[server] writer for {client_id} is gone");
    }
}

async fn close_socket(socket: &mut WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    if let Err(err) = socket.send(Message::Close(Some(frame))).await {
        warn!("[server] failed to send close {code}: {err}");
    }
}

/// Per-connection passive gravity, paced by the level of the running game.
#[derive(Default)]
struct GravityTimer {
    interval: Option<Interval>,
    level: u32,
}

impl GravityTimer {
    async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    fn follow(&mut self, state: &GameState) {
        if state.game_over {
            self.stop();
            return;
        }
        if self.interval.is_some() && self.level == state.level {
            return;
        }
        let period = Duration::from_millis(gravity_interval_ms(state.level));
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.level = state.level;
    }

    fn stop(&mut self) {
        self.interval = None;
    }
}
