use axum::{Extension, Json};
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;

use crate::db;

/// GET /health
pub async fn health_check() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

/// GET /
pub async fn index(Extension(pool): Extension<PgPool>) -> Json<JsonValue> {
    Json(json!({
        "name": "chess-arena",
        "version": env!("CARGO_PKG_VERSION"),
        "database_connected": db::pool::is_connected(&pool).await,
        "endpoints": {
            "health": "GET /health",
            "status": "GET /api/status",
            "generate": "POST /api/generate",
            "lobby": "GET /api/lobby",
            "register": "POST /api/auth/register",
            "login": "POST /api/auth/login",
            "me": "GET /api/auth/me",
            "games": "GET /api/users/me/games",
            "play": "GET /ws/play",
        },
    }))
}
