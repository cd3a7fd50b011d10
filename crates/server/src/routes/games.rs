use axum::{extract::Query, Extension, Json};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use crate::auth::middleware::AuthUser;
use crate::db::games;
use crate::error::AppError;

#[derive(Deserialize)]
pub struct GamesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/users/me/games
pub async fn get_my_games(
    Extension(pool): Extension<PgPool>,
    Query(q): Query<GamesQuery>,
    user: AuthUser,
) -> Result<Json<JsonValue>, AppError> {
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    let offset = q.offset.unwrap_or(0).max(0);

    let games_list = games::get_games_for_account(&pool, user.id, limit, offset).await?;
    let total = games::count_games_for_account(&pool, user.id).await?;

    Ok(Json(serde_json::json!({
        "games": games_list,
        "total": total,
        "limit": limit,
        "offset": offset,
        "hasMore": offset + (games_list.len() as i64) < total,
    })))
}
