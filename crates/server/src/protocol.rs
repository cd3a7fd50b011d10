//! Messages exchanged over the play WebSocket.

use chess_core::session::{GameResult, GameStatus, MoveInfo};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client → Server messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinQueue,
    LeaveQueue,
    Move {
        game_id: Uuid,
        #[serde(rename = "move")]
        uci: String,
    },
    Resign {
        game_id: Uuid,
    },
    OfferDraw {
        game_id: Uuid,
    },
    AcceptDraw {
        game_id: Uuid,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpponentInfo {
    pub display_name: String,
    pub rating: i32,
    pub guest: bool,
}

/// Server → Client messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Waiting {
        queue_size: usize,
    },
    MatchFound {
        game_id: Uuid,
        fen: String,
        color: &'static str,
        turn: &'static str,
        opponent: OpponentInfo,
    },
    GameUpdate {
        game_id: Uuid,
        fen: String,
        last_move: String,
        status: GameStatus,
        move_info: MoveInfo,
    },
    DrawOffered {
        game_id: Uuid,
        by: &'static str,
    },
    GameOver {
        game_id: Uuid,
        status: GameStatus,
        result: GameResult,
        winner: Option<String>,
        fen: String,
    },
    OpponentLeft {
        game_id: Uuid,
        message: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
