//! Live play socket: queueing, moves, resignation and draws.
//!
//! Each connection gets an outbox registered with the hub; a writer task
//! drains it into the socket while the read loop dispatches client messages.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::Query,
    response::IntoResponse,
    Extension,
};
use chess_core::rating::STARTING_RATING;
use chess_core::session::{ConnectionId, Participant};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::jwt;
use crate::auth::middleware::MaybeAuthUser;
use crate::config::Config;
use crate::error::AppError;
use crate::hub::Hub;
use crate::matchmaking::Matchmaker;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::store::{PlayerAccount, PlayerStore};

#[derive(Deserialize)]
pub struct PlayQuery {
    /// Browsers cannot set headers on a WebSocket handshake.
    pub token: Option<String>,
}

/// GET /ws/play
///
/// No credentials means a guest. A token that does not verify is refused.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(q): Query<PlayQuery>,
    MaybeAuthUser(header_user): MaybeAuthUser,
    Extension(config): Extension<Config>,
    Extension(hub): Extension<Arc<Hub>>,
    Extension(matchmaker): Extension<Arc<Matchmaker>>,
    Extension(store): Extension<Arc<dyn PlayerStore>>,
) -> Result<impl IntoResponse, AppError> {
    let account = match (header_user, q.token) {
        (Some(user), _) => Some(PlayerAccount {
            id: user.id,
            display_name: user.display_name.unwrap_or(user.username),
            rating: user.rating,
        }),
        (None, Some(token)) => {
            let claims =
                jwt::verify_token(&token, &config.jwt_secret).ok_or(AppError::Unauthorized)?;
            Some(
                store
                    .get_account(claims.user_id)
                    .await?
                    .ok_or(AppError::Unauthorized)?,
            )
        }
        (None, None) => None,
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, matchmaker, account)))
}

fn participant_for(connection: ConnectionId, account: Option<PlayerAccount>) -> Participant {
    match account {
        Some(a) => Participant {
            connection,
            account_id: Some(a.id),
            display_name: a.display_name,
            rating: a.rating,
        },
        None => Participant {
            connection,
            account_id: None,
            display_name: format!("Guest-{}", connection.0),
            rating: STARTING_RATING,
        },
    }
}

async fn handle_socket(
    socket: WebSocket,
    hub: Arc<Hub>,
    matchmaker: Arc<Matchmaker>,
    account: Option<PlayerAccount>,
) {
    let (mut sender, mut receiver) = socket.split();

    let connection = hub.next_connection_id();
    let participant = participant_for(connection, account);
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    hub.register(connection, tx);

    tracing::info!(
        %connection,
        name = %participant.display_name,
        guest = participant.account_id.is_none(),
        "Player connected"
    );

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = send_msg(&mut sender, &msg).await {
                tracing::debug!("Socket write failed: {e}");
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                hub.send(connection, ServerMessage::error(format!("Invalid message: {e}")));
                continue;
            }
        };

        if let Err(message) = dispatch(&matchmaker, &participant, client_msg).await {
            hub.send(connection, ServerMessage::error(message));
        }
    }

    matchmaker.dequeue(connection).await;
    hub.unregister(connection);
    writer.abort();
    tracing::info!(%connection, "Player disconnected");
}

/// Errors are reported to the sender only.
async fn dispatch(
    matchmaker: &Arc<Matchmaker>,
    participant: &Participant,
    msg: ClientMessage,
) -> Result<(), String> {
    let connection = participant.connection;
    match msg {
        ClientMessage::JoinQueue => {
            if !matchmaker.enqueue(participant.clone()).await {
                return Err("Already queued or playing".into());
            }
            // Pairing may wait on the engine; keep reading meanwhile.
            let matchmaker = Arc::clone(matchmaker);
            tokio::spawn(async move {
                matchmaker.try_pair().await;
            });
            Ok(())
        }
        ClientMessage::LeaveQueue => {
            if matchmaker.leave_queue(connection).await {
                Ok(())
            } else {
                Err("Not in queue".into())
            }
        }
        ClientMessage::Move { game_id, uci } => matchmaker
            .play_move(connection, game_id, &uci)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
        ClientMessage::Resign { game_id } => matchmaker
            .resign(connection, game_id)
            .await
            .map_err(|e| e.to_string()),
        ClientMessage::OfferDraw { game_id } => matchmaker
            .offer_draw(connection, game_id)
            .await
            .map_err(|e| e.to_string()),
        ClientMessage::AcceptDraw { game_id } => matchmaker
            .accept_draw(connection, game_id)
            .await
            .map_err(|e| e.to_string()),
    }
}

async fn send_msg(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_participant() {
        let p = participant_for(ConnectionId(7), None);
        assert_eq!(p.display_name, "Guest-7");
        assert_eq!(p.rating, STARTING_RATING);
        assert!(p.account_id.is_none());
    }

    #[test]
    fn test_registered_participant() {
        let account = PlayerAccount {
            id: 42,
            display_name: "alice".into(),
            rating: 1350,
        };
        let p = participant_for(ConnectionId(1), Some(account));
        assert_eq!(p.account_id, Some(42));
        assert_eq!(p.display_name, "alice");
        assert_eq!(p.rating, 1350);
    }
}
