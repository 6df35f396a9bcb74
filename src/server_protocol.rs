use log::debug;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::session_manager::{CommandOutcome, SessionError, SessionManager};
use crate::types::{GameState, Move};

pub const INVALID_MESSAGE_TYPE: &str = "Invalid message type";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParsedClientMessage {
    StartGame,
    Move { mv: Move },
}

/// Every variant is answered with the same `Invalid message type` frame; the
/// distinction only reaches the logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame is not a JSON object")]
    Malformed,
    #[error("unknown message type")]
    UnknownType,
    #[error("missing or unknown move")]
    InvalidMove,
}

pub fn parse_client_message(raw: &str) -> Result<ParsedClientMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ProtocolError::Malformed)?;
    let object = value.as_object().ok_or(ProtocolError::Malformed)?;
    let message_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::UnknownType)?;

    match message_type {
        "START_GAME" => Ok(ParsedClientMessage::StartGame),
        "MOVE" => {
            let mv = object
                .get("move")
                .and_then(Value::as_str)
                .and_then(Move::parse)
                .ok_or(ProtocolError::InvalidMove)?;
            Ok(ParsedClientMessage::Move { mv })
        }
        _ => Err(ProtocolError::UnknownType),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    GameState {
        #[serde(rename = "gameState")]
        game_state: GameState,
    },
    InvalidMove,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn internal_error() -> Self {
        Self::error(INTERNAL_ERROR_MESSAGE)
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            serde_json::json!({ "type": "ERROR", "message": INTERNAL_ERROR_MESSAGE }).to_string()
        })
    }
}

impl From<Result<CommandOutcome, SessionError>> for ServerMessage {
    fn from(result: Result<CommandOutcome, SessionError>) -> Self {
        match result {
            Ok(CommandOutcome::Applied(game_state)) => Self::GameState { game_state },
            Ok(CommandOutcome::Rejected) => Self::InvalidMove,
            Err(error) => Self::error(error.to_string()),
        }
    }
}

/// Runs one inbound frame against the client's session and builds the reply.
pub async fn dispatch(sessions: &SessionManager, client_id: &str, raw: &str) -> ServerMessage {
    let message = match parse_client_message(raw) {
        Ok(message) => message,
        Err(error) => {
            debug!("[protocol] client {client_id} sent bad frame: {error}");
            // A MOVE frame costs a rate token even when the move is unknown.
            if error == ProtocolError::InvalidMove {
                if let Err(session_error) = sessions.charge(client_id).await {
                    return ServerMessage::error(session_error.to_string());
                }
            }
            return ServerMessage::error(INVALID_MESSAGE_TYPE);
        }
    };

    match message {
        ParsedClientMessage::StartGame => match sessions.start(client_id).await {
            Ok(game_state) => ServerMessage::GameState { game_state },
            Err(error) => ServerMessage::error(error.to_string()),
        },
        ParsedClientMessage::Move { mv } => sessions.command(client_id, mv).await.into(),
    }
}
