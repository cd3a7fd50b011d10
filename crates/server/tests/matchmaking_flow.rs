//! In-process matchmaking flows against an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chess_core::session::{ConnectionId, GameRecord, GameResult, GameStatus, MoveError, Participant};
use parking_lot::Mutex;
use position_generator::GeneratorError;
use server::error::AppError;
use server::hub::Hub;
use server::matchmaking::{Matchmaker, PlayError};
use server::positions::{FixedPosition, PositionSource};
use server::protocol::ServerMessage;
use server::store::{PlayerAccount, PlayerStore};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const ROOK_ENDING: &str = "4k3/8/8/8/8/8/8/R3K3 w - - 0 30";

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<GameRecord>>,
    ratings: Mutex<Vec<(i64, i32)>>,
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn get_account(&self, _id: i64) -> Result<Option<PlayerAccount>, AppError> {
        Ok(None)
    }

    async fn record_result(&self, record: &GameRecord) -> Result<(), AppError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn update_rating(&self, account_id: i64, delta: i32) -> Result<(), AppError> {
        self.ratings.lock().push((account_id, delta));
        Ok(())
    }
}

/// Waits before answering, to leave a window for disconnects.
struct SlowPosition(Duration);

#[async_trait]
impl PositionSource for SlowPosition {
    async fn starting_position(&self) -> Result<String, GeneratorError> {
        tokio::time::sleep(self.0).await;
        Ok(ROOK_ENDING.to_string())
    }
}

/// Always gives up, as an exhausted generator would.
struct FailingPosition;

#[async_trait]
impl PositionSource for FailingPosition {
    async fn starting_position(&self) -> Result<String, GeneratorError> {
        Err(GeneratorError::NotFound { attempts: 10 })
    }
}

struct Arena {
    hub: Arc<Hub>,
    store: Arc<MemoryStore>,
    matchmaker: Arc<Matchmaker>,
}

fn arena(positions: Arc<dyn PositionSource>) -> Arena {
    arena_with_timeout(positions, Duration::from_secs(5))
}

fn arena_with_timeout(positions: Arc<dyn PositionSource>, pairing_timeout: Duration) -> Arena {
    let hub = Arc::new(Hub::new());
    let store = Arc::new(MemoryStore::default());
    let matchmaker = Arc::new(Matchmaker::new(
        Arc::clone(&hub),
        positions,
        store.clone(),
        pairing_timeout,
    ));
    Arena {
        hub,
        store,
        matchmaker,
    }
}

fn fixed_arena(fen: &str) -> Arena {
    arena(Arc::new(FixedPosition(fen.to_string())))
}

fn connect(hub: &Hub) -> (ConnectionId, UnboundedReceiver<ServerMessage>) {
    let connection = hub.next_connection_id();
    let (tx, rx) = mpsc::unbounded_channel();
    hub.register(connection, tx);
    (connection, rx)
}

fn guest(connection: ConnectionId) -> Participant {
    Participant {
        connection,
        account_id: None,
        display_name: format!("Guest-{}", connection.0),
        rating: 1200,
    }
}

fn member(connection: ConnectionId, account_id: i64) -> Participant {
    Participant {
        connection,
        account_id: Some(account_id),
        display_name: format!("player{account_id}"),
        rating: 1200,
    }
}

fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

fn match_found(msgs: &[ServerMessage]) -> Option<(Uuid, &'static str, String)> {
    msgs.iter().find_map(|m| match m {
        ServerMessage::MatchFound {
            game_id, color, fen, ..
        } => Some((*game_id, *color, fen.clone())),
        _ => None,
    })
}

/// Pair two connections and return (game, white, black) with their inboxes.
async fn start_game(
    arena: &Arena,
    first: Participant,
    first_rx: &mut UnboundedReceiver<ServerMessage>,
    second: Participant,
    second_rx: &mut UnboundedReceiver<ServerMessage>,
) -> (Uuid, ConnectionId, ConnectionId) {
    let a = first.connection;
    let b = second.connection;
    assert!(arena.matchmaker.enqueue(first).await);
    assert!(arena.matchmaker.enqueue(second).await);
    let game_id = arena.matchmaker.try_pair().await.expect("pair");

    let (game_a, color_a, _) = match_found(&drain(first_rx)).expect("first match_found");
    let (game_b, color_b, _) = match_found(&drain(second_rx)).expect("second match_found");
    assert_eq!(game_a, game_id);
    assert_eq!(game_b, game_id);
    assert_ne!(color_a, color_b);

    if color_a == "white" {
        (game_id, a, b)
    } else {
        (game_id, b, a)
    }
}

#[tokio::test]
async fn test_two_players_paired_and_move_broadcast() {
    let arena = fixed_arena(ROOK_ENDING);
    let (a, mut rx_a) = connect(&arena.hub);
    let (b, mut rx_b) = connect(&arena.hub);

    assert!(arena.matchmaker.enqueue(guest(a)).await);
    assert!(matches!(
        drain(&mut rx_a).as_slice(),
        [ServerMessage::Waiting { queue_size: 1 }]
    ));
    assert!(arena.matchmaker.enqueue(guest(b)).await);

    let game_id = arena.matchmaker.try_pair().await.expect("pair");
    assert_eq!(arena.matchmaker.waiting_count().await, 0);
    assert_eq!(arena.matchmaker.active_count().await, 1);

    let (_, color_a, fen_a) = match_found(&drain(&mut rx_a)).unwrap();
    let (_, color_b, fen_b) = match_found(&drain(&mut rx_b)).unwrap();
    assert_eq!(fen_a, ROOK_ENDING);
    assert_eq!(fen_a, fen_b);
    assert_eq!(fen_a.split_whitespace().nth(2), Some("-"));
    assert_ne!(color_a, color_b);

    let (white, black) = if color_a == "white" { (a, b) } else { (b, a) };

    let err = arena
        .matchmaker
        .play_move(black, game_id, "e8e7")
        .await
        .unwrap_err();
    assert_eq!(err, PlayError::Move(MoveError::NotYourTurn));

    let applied = arena
        .matchmaker
        .play_move(white, game_id, "a1a7")
        .await
        .unwrap();
    assert_eq!(applied.status, GameStatus::Active);

    let updates: Vec<String> = [drain(&mut rx_a), drain(&mut rx_b)]
        .iter()
        .filter_map(|msgs| {
            msgs.iter().find_map(|m| match m {
                ServerMessage::GameUpdate { fen, last_move, .. } => {
                    assert_eq!(last_move, "a1a7");
                    Some(fen.clone())
                }
                _ => None,
            })
        })
        .collect();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0], updates[1]);
    assert_eq!(updates[0], applied.fen);
}

/// Pair two guests and return the FEN both were sent.
async fn paired_fen(arena: &Arena) -> String {
    let (a, mut rx_a) = connect(&arena.hub);
    let (b, mut rx_b) = connect(&arena.hub);
    assert!(arena.matchmaker.enqueue(guest(a)).await);
    assert!(arena.matchmaker.enqueue(guest(b)).await);
    arena.matchmaker.try_pair().await.expect("pair");

    let (_, _, fen_a) = match_found(&drain(&mut rx_a)).expect("first match_found");
    let (_, _, fen_b) = match_found(&drain(&mut rx_b)).expect("second match_found");
    assert_eq!(fen_a, fen_b);
    fen_a
}

#[tokio::test]
async fn test_generator_failure_falls_back_to_standard_start() {
    let arena = arena(Arc::new(FailingPosition));
    assert_eq!(paired_fen(&arena).await, START);
    assert_eq!(arena.matchmaker.active_count().await, 1);
}

#[tokio::test]
async fn test_slow_generator_falls_back_after_timeout() {
    let arena = arena_with_timeout(
        Arc::new(SlowPosition(Duration::from_secs(2))),
        Duration::from_millis(50),
    );
    let started = std::time::Instant::now();
    assert_eq!(paired_fen(&arena).await, START);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_unparsable_position_falls_back_to_standard_start() {
    let arena = fixed_arena("not a fen");
    assert_eq!(paired_fen(&arena).await, START);

    let game_id = arena.matchmaker.try_pair().await;
    assert!(game_id.is_none(), "Queue should be empty after pairing");
}

#[tokio::test]
async fn test_enqueue_is_idempotent() {
    let arena = fixed_arena(START);
    let (a, _rx) = connect(&arena.hub);

    assert!(arena.matchmaker.enqueue(guest(a)).await);
    assert!(!arena.matchmaker.enqueue(guest(a)).await);
    assert_eq!(arena.matchmaker.waiting_count().await, 1);
}

#[tokio::test]
async fn test_pairing_needs_two() {
    let arena = fixed_arena(START);
    assert!(arena.matchmaker.try_pair().await.is_none());

    let (a, _rx) = connect(&arena.hub);
    arena.matchmaker.enqueue(guest(a)).await;
    assert!(arena.matchmaker.try_pair().await.is_none());
    assert_eq!(arena.matchmaker.waiting_count().await, 1);
    assert_eq!(arena.matchmaker.active_count().await, 0);
}

#[tokio::test]
async fn test_join_queue_pairs_in_fifo_order() {
    let arena = fixed_arena(START);
    let (a, _rx_a) = connect(&arena.hub);
    let (b, _rx_b) = connect(&arena.hub);
    let (c, _rx_c) = connect(&arena.hub);

    assert!(arena.matchmaker.join_queue(guest(a)).await.is_none());
    assert!(arena.matchmaker.join_queue(guest(b)).await.is_some());
    assert!(arena.matchmaker.join_queue(guest(c)).await.is_none());

    // The third player is still waiting and cannot queue twice
    assert_eq!(arena.matchmaker.waiting_count().await, 1);
    assert!(!arena.matchmaker.enqueue(guest(c)).await);
    // Players already in a game cannot queue
    assert!(!arena.matchmaker.enqueue(guest(a)).await);
}

#[tokio::test]
async fn test_leave_queue() {
    let arena = fixed_arena(START);
    let (a, _rx) = connect(&arena.hub);

    assert!(!arena.matchmaker.leave_queue(a).await);
    arena.matchmaker.enqueue(guest(a)).await;
    assert!(arena.matchmaker.leave_queue(a).await);
    assert_eq!(arena.matchmaker.waiting_count().await, 0);
}

#[tokio::test]
async fn test_abandonment_persisted_once() {
    let arena = fixed_arena(START);
    let (a, mut rx_a) = connect(&arena.hub);
    let (b, mut rx_b) = connect(&arena.hub);
    let (game_id, white, black) =
        start_game(&arena, guest(a), &mut rx_a, guest(b), &mut rx_b).await;

    arena.matchmaker.dequeue(white).await;
    arena.matchmaker.dequeue(white).await;

    let records = arena.store.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].session_id, game_id);
    assert_eq!(records[0].termination, GameStatus::Abandoned);
    assert_eq!(records[0].result, GameResult::BlackWins);
    assert_eq!(arena.matchmaker.active_count().await, 0);

    let black_rx = if black == a { &mut rx_a } else { &mut rx_b };
    let msgs = drain(black_rx);
    assert!(msgs
        .iter()
        .any(|m| matches!(m, ServerMessage::OpponentLeft { .. })));
    assert!(msgs.iter().any(|m| matches!(
        m,
        ServerMessage::GameOver {
            status: GameStatus::Abandoned,
            ..
        }
    )));

    // Guests have no ratings to update
    assert!(arena.store.ratings.lock().is_empty());

    // The game is gone for the survivor too
    let err = arena
        .matchmaker
        .play_move(black, game_id, "e7e5")
        .await
        .unwrap_err();
    assert_eq!(err, PlayError::UnknownGame);
}

#[tokio::test]
async fn test_checkmate_persisted_once() {
    let arena = fixed_arena(START);
    let (a, mut rx_a) = connect(&arena.hub);
    let (b, mut rx_b) = connect(&arena.hub);
    let (game_id, white, black) =
        start_game(&arena, guest(a), &mut rx_a, guest(b), &mut rx_b).await;

    let mm = &arena.matchmaker;
    mm.play_move(white, game_id, "f2f3").await.unwrap();
    mm.play_move(black, game_id, "e7e5").await.unwrap();
    mm.play_move(white, game_id, "g2g4").await.unwrap();
    let applied = mm.play_move(black, game_id, "d8h4").await.unwrap();
    assert_eq!(applied.status, GameStatus::Checkmate);
    assert_eq!(applied.info.result, Some(GameResult::BlackWins));

    // Disconnecting afterwards must not store the game again
    mm.dequeue(white).await;
    mm.dequeue(black).await;

    let records = arena.store.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].result, GameResult::BlackWins);
    assert_eq!(records[0].moves, vec!["f2f3", "e7e5", "g2g4", "d8h4"]);
    assert_eq!(mm.active_count().await, 0);
}

#[tokio::test]
async fn test_resignation_updates_both_ratings() {
    let arena = fixed_arena(START);
    let (a, mut rx_a) = connect(&arena.hub);
    let (b, mut rx_b) = connect(&arena.hub);
    let (game_id, white, black) =
        start_game(&arena, member(a, 1), &mut rx_a, member(b, 2), &mut rx_b).await;

    arena.matchmaker.resign(white, game_id).await.unwrap();
    assert_eq!(
        arena.matchmaker.resign(black, game_id).await,
        Err(PlayError::UnknownGame)
    );

    let records = arena.store.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].result, GameResult::BlackWins);

    let white_id = if white == a { 1 } else { 2 };
    let black_id = 3 - white_id;
    let mut ratings = arena.store.ratings.lock().clone();
    ratings.sort();
    let mut expected = vec![(white_id, -16), (black_id, 16)];
    expected.sort();
    assert_eq!(ratings, expected);
}

#[tokio::test]
async fn test_draw_by_agreement() {
    let arena = fixed_arena(START);
    let (a, mut rx_a) = connect(&arena.hub);
    let (b, mut rx_b) = connect(&arena.hub);
    let (game_id, white, black) =
        start_game(&arena, guest(a), &mut rx_a, guest(b), &mut rx_b).await;

    assert_eq!(
        arena.matchmaker.accept_draw(black, game_id).await,
        Err(PlayError::Move(MoveError::NoDrawOffer))
    );

    arena.matchmaker.offer_draw(white, game_id).await.unwrap();
    let black_rx = if black == a { &mut rx_a } else { &mut rx_b };
    assert!(drain(black_rx)
        .iter()
        .any(|m| matches!(m, ServerMessage::DrawOffered { by: "white", .. })));

    arena.matchmaker.accept_draw(black, game_id).await.unwrap();
    let records = arena.store.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].result, GameResult::Draw);
    assert_eq!(records[0].termination, GameStatus::DrawAgreed);
}

#[tokio::test]
async fn test_outsider_cannot_move() {
    let arena = fixed_arena(START);
    let (a, mut rx_a) = connect(&arena.hub);
    let (b, mut rx_b) = connect(&arena.hub);
    let (c, _rx_c) = connect(&arena.hub);
    let (game_id, _, _) = start_game(&arena, guest(a), &mut rx_a, guest(b), &mut rx_b).await;

    let err = arena
        .matchmaker
        .play_move(c, game_id, "e2e4")
        .await
        .unwrap_err();
    assert_eq!(err, PlayError::Move(MoveError::NotAParticipant));

    let err = arena
        .matchmaker
        .play_move(a, Uuid::new_v4(), "e2e4")
        .await
        .unwrap_err();
    assert_eq!(err, PlayError::UnknownGame);
}

#[tokio::test]
async fn test_disconnect_during_pairing_requeues_survivor() {
    let arena = arena(Arc::new(SlowPosition(Duration::from_millis(200))));
    let (a, _rx_a) = connect(&arena.hub);
    let (b, _rx_b) = connect(&arena.hub);
    arena.matchmaker.enqueue(guest(a)).await;
    arena.matchmaker.enqueue(guest(b)).await;

    let pairing = tokio::spawn({
        let matchmaker = Arc::clone(&arena.matchmaker);
        async move { matchmaker.try_pair().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    arena.matchmaker.dequeue(a).await;

    assert!(pairing.await.unwrap().is_none());
    assert_eq!(arena.matchmaker.active_count().await, 0);
    assert_eq!(arena.matchmaker.waiting_count().await, 1);
    assert!(arena.store.records.lock().is_empty());
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let arena = fixed_arena(START);
    let (a, mut rx_a) = connect(&arena.hub);
    let (b, mut rx_b) = connect(&arena.hub);
    let (game_id, _, _) = start_game(&arena, guest(a), &mut rx_a, guest(b), &mut rx_b).await;

    assert_eq!(arena.hub.group_size(game_id), 2);
    assert!(arena.matchmaker.remove(game_id).await);
    assert!(!arena.matchmaker.remove(game_id).await);
    assert_eq!(arena.hub.group_size(game_id), 0);
    assert_eq!(arena.matchmaker.active_count().await, 0);
}
