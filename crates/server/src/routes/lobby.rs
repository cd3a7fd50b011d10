use std::sync::Arc;

use axum::{Extension, Json};
use serde_json::{json, Value as JsonValue};

use crate::hub::Hub;
use crate::matchmaking::Matchmaker;

/// GET /api/lobby
pub async fn get_lobby(
    Extension(matchmaker): Extension<Arc<Matchmaker>>,
    Extension(hub): Extension<Arc<Hub>>,
) -> Json<JsonValue> {
    Json(json!({
        "waiting": matchmaker.waiting_count().await,
        "active_games": matchmaker.active_count().await,
        "connections": hub.connection_count(),
    }))
}
