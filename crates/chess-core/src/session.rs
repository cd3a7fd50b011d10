//! Live game session: board state, turn ownership and termination.
//!
//! A session is created with two participants and a starting FEN. Every
//! mutation goes through a method that either returns a typed error and
//! leaves the session untouched, or advances it. The first terminal
//! transition freezes the session and produces a [`GameRecord`]; every call
//! after that fails with [`MoveError::GameOver`] (or returns `None` for
//! [`GameSession::abandon`]).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shakmaty::{uci::UciMove, Chess, Color, Position};
use uuid::Uuid;

use crate::fen::{color_name, parse_position, repetition_key, to_fen};

/// Halfmove clock value at which the 75-move rule ends the game.
const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;
const FIVEFOLD: u32 = 5;

/// Transport-level identity of one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identity snapshot of a player, taken when they joined the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub connection: ConnectionId,
    /// `None` for guests.
    pub account_id: Option<i64>,
    pub display_name: String,
    pub rating: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GameStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "check")]
    Check,
    #[serde(rename = "checkmate")]
    Checkmate,
    #[serde(rename = "stalemate")]
    Stalemate,
    #[serde(rename = "draw_insufficient_material")]
    InsufficientMaterial,
    #[serde(rename = "draw_75_moves")]
    SeventyFiveMoves,
    #[serde(rename = "draw_repetition")]
    Repetition,
    #[serde(rename = "resigned")]
    Resigned,
    #[serde(rename = "draw_agreement")]
    DrawAgreed,
    #[serde(rename = "abandoned")]
    Abandoned,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Active => "active",
            GameStatus::Check => "check",
            GameStatus::Checkmate => "checkmate",
            GameStatus::Stalemate => "stalemate",
            GameStatus::InsufficientMaterial => "draw_insufficient_material",
            GameStatus::SeventyFiveMoves => "draw_75_moves",
            GameStatus::Repetition => "draw_repetition",
            GameStatus::Resigned => "resigned",
            GameStatus::DrawAgreed => "draw_agreement",
            GameStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::Active | GameStatus::Check)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GameResult {
    #[serde(rename = "1-0")]
    WhiteWins,
    #[serde(rename = "0-1")]
    BlackWins,
    #[serde(rename = "1/2-1/2")]
    Draw,
}

impl GameResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
        }
    }

    pub fn win_for(color: Color) -> Self {
        match color {
            Color::White => GameResult::WhiteWins,
            Color::Black => GameResult::BlackWins,
        }
    }

    pub fn winner(&self) -> Option<Color> {
        match self {
            GameResult::WhiteWins => Some(Color::White),
            GameResult::BlackWins => Some(Color::Black),
            GameResult::Draw => None,
        }
    }

    /// Score from white's point of view.
    pub fn white_score(&self) -> f64 {
        match self {
            GameResult::WhiteWins => 1.0,
            GameResult::BlackWins => 0.0,
            GameResult::Draw => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("You are not a player in this game")]
    NotAParticipant,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Game is already over")]
    GameOver,

    #[error("No draw offer to accept")]
    NoDrawOffer,
}

/// The frozen outcome of a game, written once to storage.
#[derive(Debug, Clone, Serialize)]
pub struct GameRecord {
    pub session_id: Uuid,
    pub white: Participant,
    pub black: Participant,
    pub starting_fen: String,
    pub final_fen: String,
    pub moves: Vec<String>,
    pub result: GameResult,
    pub termination: GameStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
}

/// Produced exactly once per session, by whichever call ended it.
#[derive(Debug, Clone)]
pub struct Termination {
    pub status: GameStatus,
    pub result: GameResult,
    pub winner: Option<Participant>,
    pub record: GameRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveInfo {
    pub move_count: usize,
    /// Display name of the winner when the move ended the game decisively.
    pub winner: Option<String>,
    pub result: Option<GameResult>,
}

#[derive(Debug, Clone)]
pub struct MoveApplied {
    pub fen: String,
    pub status: GameStatus,
    pub info: MoveInfo,
    pub termination: Option<Termination>,
}

#[derive(Debug, Clone)]
pub struct GameSession {
    id: Uuid,
    position: Chess,
    starting_fen: String,
    moves: Vec<String>,
    white: Participant,
    black: Participant,
    status: GameStatus,
    result: Option<GameResult>,
    draw_offer: Option<Color>,
    repetitions: HashMap<String, u32>,
    started_at: DateTime<Utc>,
}

impl GameSession {
    /// Start a game from `starting_fen`. `first_is_white` is the caller's
    /// coin flip deciding which of the two participants plays white.
    pub fn new(
        id: Uuid,
        starting_fen: &str,
        first: Participant,
        second: Participant,
        first_is_white: bool,
    ) -> Result<Self, String> {
        let position = parse_position(starting_fen)?;
        let fen = to_fen(&position);
        let (white, black) = if first_is_white {
            (first, second)
        } else {
            (second, first)
        };

        let mut repetitions = HashMap::new();
        repetitions.insert(repetition_key(&fen), 1);

        Ok(Self {
            id,
            position,
            starting_fen: fen,
            moves: Vec::new(),
            white,
            black,
            status: GameStatus::Active,
            result: None,
            draw_offer: None,
            repetitions,
            started_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn fen(&self) -> String {
        to_fen(&self.position)
    }

    pub fn starting_fen(&self) -> &str {
        &self.starting_fen
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn is_over(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    pub fn white(&self) -> &Participant {
        &self.white
    }

    pub fn black(&self) -> &Participant {
        &self.black
    }

    pub fn participants(&self) -> [&Participant; 2] {
        [&self.white, &self.black]
    }

    pub fn color_of(&self, connection: ConnectionId) -> Option<Color> {
        if self.white.connection == connection {
            Some(Color::White)
        } else if self.black.connection == connection {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn participant(&self, color: Color) -> &Participant {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn opponent_of(&self, connection: ConnectionId) -> Option<&Participant> {
        self.color_of(connection)
            .map(|color| self.participant(color.other()))
    }

    fn live_color(&self, connection: ConnectionId) -> Result<Color, MoveError> {
        let color = self
            .color_of(connection)
            .ok_or(MoveError::NotAParticipant)?;
        if self.is_over() {
            return Err(MoveError::GameOver);
        }
        Ok(color)
    }

    /// Apply a UCI move on behalf of `connection`.
    pub fn apply_move(
        &mut self,
        connection: ConnectionId,
        uci: &str,
    ) -> Result<MoveApplied, MoveError> {
        let color = self.live_color(connection)?;
        if self.position.turn() != color {
            return Err(MoveError::NotYourTurn);
        }

        let uci_move: UciMove = uci
            .trim()
            .parse()
            .map_err(|_| MoveError::IllegalMove(uci.to_string()))?;
        let mv = uci_move
            .to_move(&self.position)
            .map_err(|_| MoveError::IllegalMove(uci.to_string()))?;

        self.position.play_unchecked(mv);
        self.moves.push(uci_move.to_string());
        self.draw_offer = None;

        let fen = self.fen();
        let seen = self.repetitions.entry(repetition_key(&fen)).or_insert(0);
        *seen += 1;
        let seen = *seen;

        let pos = &self.position;
        let (status, result) = if pos.is_checkmate() {
            (GameStatus::Checkmate, Some(GameResult::win_for(color)))
        } else if pos.is_stalemate() {
            (GameStatus::Stalemate, Some(GameResult::Draw))
        } else if pos.is_insufficient_material() {
            (GameStatus::InsufficientMaterial, Some(GameResult::Draw))
        } else if pos.halfmoves() >= SEVENTY_FIVE_MOVE_PLIES {
            (GameStatus::SeventyFiveMoves, Some(GameResult::Draw))
        } else if seen >= FIVEFOLD {
            (GameStatus::Repetition, Some(GameResult::Draw))
        } else if pos.is_check() {
            (GameStatus::Check, None)
        } else {
            (GameStatus::Active, None)
        };

        let termination = match result {
            Some(result) => Some(self.finish(status, result)),
            None => {
                self.status = status;
                None
            }
        };

        Ok(MoveApplied {
            fen,
            status,
            info: MoveInfo {
                move_count: self.moves.len(),
                winner: termination
                    .as_ref()
                    .and_then(|t| t.winner.as_ref())
                    .map(|p| p.display_name.clone()),
                result,
            },
            termination,
        })
    }

    pub fn resign(&mut self, connection: ConnectionId) -> Result<Termination, MoveError> {
        let color = self.live_color(connection)?;
        Ok(self.finish(GameStatus::Resigned, GameResult::win_for(color.other())))
    }

    /// Record a draw offer and return the connection that should be told.
    pub fn offer_draw(&mut self, connection: ConnectionId) -> Result<ConnectionId, MoveError> {
        let color = self.live_color(connection)?;
        self.draw_offer = Some(color);
        Ok(self.participant(color.other()).connection)
    }

    pub fn accept_draw(&mut self, connection: ConnectionId) -> Result<Termination, MoveError> {
        let color = self.live_color(connection)?;
        if self.draw_offer != Some(color.other()) {
            return Err(MoveError::NoDrawOffer);
        }
        Ok(self.finish(GameStatus::DrawAgreed, GameResult::Draw))
    }

    /// End the game because `connection` went away. Returns `None` if the
    /// game was already over or the connection is not playing in it.
    pub fn abandon(&mut self, connection: ConnectionId) -> Option<Termination> {
        let color = self.live_color(connection).ok()?;
        Some(self.finish(GameStatus::Abandoned, GameResult::win_for(color.other())))
    }

    fn finish(&mut self, status: GameStatus, result: GameResult) -> Termination {
        self.status = status;
        self.result = Some(result);
        self.draw_offer = None;

        let ended_at = Utc::now();
        let record = GameRecord {
            session_id: self.id,
            white: self.white.clone(),
            black: self.black.clone(),
            starting_fen: self.starting_fen.clone(),
            final_fen: self.fen(),
            moves: self.moves.clone(),
            result,
            termination: status,
            started_at: self.started_at,
            ended_at,
            duration_secs: (ended_at - self.started_at).num_seconds(),
        };

        Termination {
            status,
            result,
            winner: result.winner().map(|c| self.participant(c).clone()),
            record,
        }
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn turn_name(&self) -> &'static str {
        color_name(self.turn())
    }
}
