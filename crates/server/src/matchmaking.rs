//! Matchmaking registry: waiting queue, pairing and the active-game table.
//!
//! All registry state lives behind one async mutex. Position generation runs
//! with the lock released: the two popped entries are tracked in `pairing`,
//! and a disconnect during that window lands in `cancelled` so the pair is
//! dissolved when generation returns. A terminal transition removes the
//! session from the table under the lock; persistence and rating updates run
//! after it is released, once per session.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chess_core::fen::{color_name, STANDARD_START_FEN};
use chess_core::rating::game_deltas;
use chess_core::session::{
    ConnectionId, GameSession, MoveApplied, MoveError, Participant, Termination,
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::hub::Hub;
use crate::positions::PositionSource;
use crate::protocol::{OpponentInfo, ServerMessage};
use crate::store::PlayerStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayError {
    #[error("Unknown game")]
    UnknownGame,

    #[error(transparent)]
    Move(#[from] MoveError),
}

#[derive(Default)]
struct Registry {
    waiting: VecDeque<Participant>,
    pairing: HashSet<ConnectionId>,
    cancelled: HashSet<ConnectionId>,
    games: HashMap<Uuid, GameSession>,
    by_connection: HashMap<ConnectionId, Uuid>,
}

impl Registry {
    fn is_known(&self, connection: ConnectionId) -> bool {
        self.pairing.contains(&connection)
            || self.by_connection.contains_key(&connection)
            || self.waiting.iter().any(|p| p.connection == connection)
    }

    fn remove_waiting(&mut self, connection: ConnectionId) -> bool {
        match self.waiting.iter().position(|p| p.connection == connection) {
            Some(idx) => {
                self.waiting.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Take a session out of the active table along with its connection index.
    fn detach(&mut self, game_id: Uuid) -> Option<GameSession> {
        let session = self.games.remove(&game_id)?;
        for p in session.participants() {
            if self.by_connection.get(&p.connection) == Some(&game_id) {
                self.by_connection.remove(&p.connection);
            }
        }
        Some(session)
    }

    fn session_for(
        &mut self,
        connection: ConnectionId,
        game_id: Uuid,
    ) -> Result<&mut GameSession, PlayError> {
        let session = self.games.get_mut(&game_id).ok_or(PlayError::UnknownGame)?;
        if session.color_of(connection).is_none() {
            return Err(MoveError::NotAParticipant.into());
        }
        Ok(session)
    }
}

pub struct Matchmaker {
    registry: Mutex<Registry>,
    hub: Arc<Hub>,
    positions: Arc<dyn PositionSource>,
    store: Arc<dyn PlayerStore>,
    pairing_timeout: Duration,
}

impl Matchmaker {
    pub fn new(
        hub: Arc<Hub>,
        positions: Arc<dyn PositionSource>,
        store: Arc<dyn PlayerStore>,
        pairing_timeout: Duration,
    ) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            hub,
            positions,
            store,
            pairing_timeout,
        }
    }

    /// Add a participant to the waiting queue. Returns false when the
    /// connection is already waiting, being paired or playing.
    pub async fn enqueue(&self, participant: Participant) -> bool {
        let connection = participant.connection;
        let queue_size = {
            let mut registry = self.registry.lock().await;
            if registry.is_known(connection) {
                return false;
            }
            registry.waiting.push_back(participant);
            registry.waiting.len()
        };

        info!(%connection, queue_size, "Player joined queue");
        self.hub.send(connection, ServerMessage::Waiting { queue_size });
        true
    }

    /// Enqueue, then try to pair.
    pub async fn join_queue(&self, participant: Participant) -> Option<Uuid> {
        self.enqueue(participant).await;
        self.try_pair().await
    }

    /// Leave the waiting queue without touching an active game.
    pub async fn leave_queue(&self, connection: ConnectionId) -> bool {
        let mut registry = self.registry.lock().await;
        if registry.pairing.contains(&connection) {
            registry.cancelled.insert(connection);
            return true;
        }
        registry.remove_waiting(connection)
    }

    /// The connection went away: leave the queue, cancel a pending pairing,
    /// and abandon an active game.
    pub async fn dequeue(&self, connection: ConnectionId) {
        let abandoned = {
            let mut registry = self.registry.lock().await;
            registry.remove_waiting(connection);
            if registry.pairing.contains(&connection) {
                registry.cancelled.insert(connection);
            }

            let Some(game_id) = registry.by_connection.get(&connection).copied() else {
                return;
            };
            let termination = registry
                .games
                .get_mut(&game_id)
                .and_then(|session| session.abandon(connection));
            match termination {
                Some(termination) => {
                    let session = registry.detach(game_id);
                    session.map(|s| (game_id, s, termination))
                }
                None => None,
            }
        };

        let Some((game_id, session, termination)) = abandoned else {
            return;
        };

        info!(%game_id, %connection, "Player abandoned game");
        if let Some(opponent) = session.opponent_of(connection) {
            self.hub.send(
                opponent.connection,
                ServerMessage::OpponentLeft {
                    game_id,
                    message: "Your opponent left the game. You win by abandonment.".into(),
                },
            );
        }
        self.conclude(&session, termination).await;
    }

    /// Pair the two longest-waiting participants, if there are two.
    pub async fn try_pair(&self) -> Option<Uuid> {
        loop {
            let (first, second) = {
                let mut registry = self.registry.lock().await;
                if registry.waiting.len() < 2 {
                    return None;
                }
                let (Some(first), Some(second)) =
                    (registry.waiting.pop_front(), registry.waiting.pop_front())
                else {
                    return None;
                };
                registry.pairing.insert(first.connection);
                registry.pairing.insert(second.connection);
                (first, second)
            };

            let fen = self.starting_fen().await;
            let first_is_white = rand::random::<bool>();

            let mut registry = self.registry.lock().await;
            registry.pairing.remove(&first.connection);
            registry.pairing.remove(&second.connection);
            let first_gone = registry.cancelled.remove(&first.connection);
            let second_gone = registry.cancelled.remove(&second.connection);

            if first_gone || second_gone {
                info!(
                    first = %first.connection,
                    second = %second.connection,
                    "Pairing dissolved by disconnect"
                );
                if !second_gone {
                    registry.waiting.push_front(second);
                }
                if !first_gone {
                    registry.waiting.push_front(first);
                }
                continue;
            }

            let game_id = Uuid::new_v4();
            let session = match GameSession::new(
                game_id,
                &fen,
                first.clone(),
                second.clone(),
                first_is_white,
            ) {
                Ok(session) => session,
                Err(e) => {
                    warn!(%fen, error = %e, "Unusable starting position, using standard start");
                    match GameSession::new(game_id, STANDARD_START_FEN, first, second, first_is_white) {
                        Ok(session) => session,
                        Err(e) => {
                            warn!(error = %e, "Failed to create game session");
                            return None;
                        }
                    }
                }
            };

            for p in session.participants() {
                registry.by_connection.insert(p.connection, game_id);
                self.hub.join_group(game_id, p.connection);
            }
            for (color, p) in [
                (shakmaty::Color::White, session.white()),
                (shakmaty::Color::Black, session.black()),
            ] {
                let opponent = session.participant(color.other());
                self.hub.send(
                    p.connection,
                    ServerMessage::MatchFound {
                        game_id,
                        fen: session.fen(),
                        color: color_name(color),
                        turn: session.turn_name(),
                        opponent: OpponentInfo {
                            display_name: opponent.display_name.clone(),
                            rating: opponent.rating,
                            guest: opponent.account_id.is_none(),
                        },
                    },
                );
            }

            info!(
                %game_id,
                white = %session.white().display_name,
                black = %session.black().display_name,
                fen = %session.fen(),
                "Game created"
            );
            registry.games.insert(game_id, session);
            return Some(game_id);
        }
    }

    async fn starting_fen(&self) -> String {
        match tokio::time::timeout(self.pairing_timeout, self.positions.starting_position()).await {
            Ok(Ok(fen)) => fen,
            Ok(Err(e)) => {
                warn!(error = %e, "Position generation failed, using standard start");
                STANDARD_START_FEN.to_string()
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.pairing_timeout.as_secs(),
                    "Position generation timed out, using standard start"
                );
                STANDARD_START_FEN.to_string()
            }
        }
    }

    /// Delete a session and detach its connections. Idempotent.
    pub async fn remove(&self, game_id: Uuid) -> bool {
        let session = self.registry.lock().await.detach(game_id);
        match session {
            Some(session) => {
                for p in session.participants() {
                    self.hub.leave_group(game_id, p.connection);
                }
                true
            }
            None => false,
        }
    }

    pub async fn play_move(
        &self,
        connection: ConnectionId,
        game_id: Uuid,
        uci: &str,
    ) -> Result<MoveApplied, PlayError> {
        let (applied, finished) = {
            let mut registry = self.registry.lock().await;
            let session = registry.session_for(connection, game_id)?;
            let applied = session.apply_move(connection, uci)?;
            let finished = match applied.termination {
                Some(_) => registry.detach(game_id),
                None => None,
            };
            (applied, finished)
        };

        self.hub.broadcast(
            game_id,
            &ServerMessage::GameUpdate {
                game_id,
                fen: applied.fen.clone(),
                last_move: uci.trim().to_string(),
                status: applied.status,
                move_info: applied.info.clone(),
            },
        );

        if let (Some(session), Some(termination)) = (finished, applied.termination.clone()) {
            self.conclude(&session, termination).await;
        }
        Ok(applied)
    }

    pub async fn resign(&self, connection: ConnectionId, game_id: Uuid) -> Result<(), PlayError> {
        let (session, termination) = {
            let mut registry = self.registry.lock().await;
            let termination = registry.session_for(connection, game_id)?.resign(connection)?;
            let session = registry.detach(game_id).ok_or(PlayError::UnknownGame)?;
            (session, termination)
        };
        self.conclude(&session, termination).await;
        Ok(())
    }

    pub async fn offer_draw(&self, connection: ConnectionId, game_id: Uuid) -> Result<(), PlayError> {
        let (opponent, by) = {
            let mut registry = self.registry.lock().await;
            let session = registry.session_for(connection, game_id)?;
            let opponent = session.offer_draw(connection)?;
            let by = session.color_of(connection).map(color_name).unwrap_or("unknown");
            (opponent, by)
        };
        self.hub
            .send(opponent, ServerMessage::DrawOffered { game_id, by });
        Ok(())
    }

    pub async fn accept_draw(&self, connection: ConnectionId, game_id: Uuid) -> Result<(), PlayError> {
        let (session, termination) = {
            let mut registry = self.registry.lock().await;
            let termination = registry
                .session_for(connection, game_id)?
                .accept_draw(connection)?;
            let session = registry.detach(game_id).ok_or(PlayError::UnknownGame)?;
            (session, termination)
        };
        self.conclude(&session, termination).await;
        Ok(())
    }

    pub async fn waiting_count(&self) -> usize {
        self.registry.lock().await.waiting.len()
    }

    pub async fn active_count(&self) -> usize {
        self.registry.lock().await.games.len()
    }

    /// Announce the result, release the group and persist. Called with the
    /// registry lock released, exactly once per finished session.
    async fn conclude(&self, session: &GameSession, termination: Termination) {
        let game_id = session.id();
        self.hub.broadcast(
            game_id,
            &ServerMessage::GameOver {
                game_id,
                status: termination.status,
                result: termination.result,
                winner: termination.winner.as_ref().map(|w| w.display_name.clone()),
                fen: termination.record.final_fen.clone(),
            },
        );
        for p in session.participants() {
            self.hub.leave_group(game_id, p.connection);
        }

        let record = &termination.record;
        info!(
            %game_id,
            result = record.result.as_str(),
            termination = record.termination.as_str(),
            moves = record.moves.len(),
            "Game finished"
        );

        if let Err(e) = self.store.record_result(record).await {
            warn!(%game_id, error = %e, "Failed to persist game");
        }

        if let (Some(white_id), Some(black_id)) = (record.white.account_id, record.black.account_id) {
            let (white_delta, black_delta) = game_deltas(
                record.white.rating,
                record.black.rating,
                record.result.white_score(),
            );
            for (account_id, delta) in [(white_id, white_delta), (black_id, black_delta)] {
                if let Err(e) = self.store.update_rating(account_id, delta).await {
                    warn!(%game_id, account_id, error = %e, "Failed to update rating");
                }
            }
        }
    }
}
