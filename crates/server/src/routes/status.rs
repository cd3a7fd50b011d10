use axum::{Extension, Json};
use position_generator::StockfishEvaluator;
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;

use crate::db;

/// GET /api/status
///
/// Spawns the engine once to confirm it answers the UCI handshake.
pub async fn get_status(
    Extension(pool): Extension<PgPool>,
    Extension(evaluator): Extension<StockfishEvaluator>,
) -> Json<JsonValue> {
    let stockfish_available = match evaluator.check_available().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %evaluator.config().path, "Stockfish unavailable: {e}");
            false
        }
    };

    Json(json!({
        "stockfish_available": stockfish_available,
        "stockfish_path": evaluator.config().path,
        "platform": std::env::consts::OS,
        "database_connected": db::pool::is_connected(&pool).await,
    }))
}
