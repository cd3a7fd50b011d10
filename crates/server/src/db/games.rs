use chess_core::session::GameRecord;
use serde_json::Value as JsonValue;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct GameRow {
    pub id: i64,
    pub session_id: Uuid,
    pub white_account_id: Option<i64>,
    pub black_account_id: Option<i64>,
    pub white_name: String,
    pub black_name: String,
    pub starting_fen: String,
    pub final_fen: String,
    pub moves: JsonValue,
    pub result: String,
    pub termination: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: chrono::DateTime<chrono::Utc>,
    pub duration_secs: i64,
}

/// Insert a finished game. A second insert for the same session is ignored.
pub async fn insert_game<'e, E: PgExecutor<'e>>(
    executor: E,
    record: &GameRecord,
) -> Result<Option<i64>, AppError> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"INSERT INTO games (
            session_id, white_account_id, black_account_id, white_name, black_name,
            starting_fen, final_fen, moves, result, termination,
            started_at, ended_at, duration_secs
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (session_id) DO NOTHING
        RETURNING id"#,
    )
    .bind(record.session_id)
    .bind(record.white.account_id)
    .bind(record.black.account_id)
    .bind(&record.white.display_name)
    .bind(&record.black.display_name)
    .bind(&record.starting_fen)
    .bind(&record.final_fen)
    .bind(sqlx::types::Json(&record.moves))
    .bind(record.result.as_str())
    .bind(record.termination.as_str())
    .bind(record.started_at)
    .bind(record.ended_at)
    .bind(record.duration_secs)
    .fetch_optional(executor)
    .await
    .map_err(AppError::Sqlx)?;

    Ok(row.map(|r| r.0))
}

pub async fn get_games_for_account(
    pool: &PgPool,
    account_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<GameRow>, AppError> {
    sqlx::query_as::<_, GameRow>(
        r#"SELECT id, session_id, white_account_id, black_account_id, white_name, black_name,
                  starting_fen, final_fen, moves, result, termination,
                  started_at, ended_at, duration_secs
           FROM games
           WHERE white_account_id = $1 OR black_account_id = $1
           ORDER BY ended_at DESC
           LIMIT $2 OFFSET $3"#,
    )
    .bind(account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(AppError::Sqlx)
}

pub async fn count_games_for_account(pool: &PgPool, account_id: i64) -> Result<i64, AppError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM games WHERE white_account_id = $1 OR black_account_id = $1",
    )
    .bind(account_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::Sqlx)?;
    Ok(row.0)
}

/// Games the account lost, by result tag.
pub async fn count_losses(pool: &PgPool, account_id: i64) -> Result<i64, AppError> {
    let row: (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM games
           WHERE (white_account_id = $1 AND result = '0-1')
              OR (black_account_id = $1 AND result = '1-0')"#,
    )
    .bind(account_id)
    .fetch_one(pool)
    .await
    .map_err(AppError::Sqlx)?;
    Ok(row.0)
}
