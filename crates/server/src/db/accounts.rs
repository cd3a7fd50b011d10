use sqlx::{PgExecutor, PgPool};

use crate::error::AppError;

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, display_name, rating, \
     games_played, games_won, is_online, last_login, created_at";

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub rating: i32,
    pub games_played: i32,
    pub games_won: i32,
    pub is_online: bool,
    pub last_login: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Account {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

pub async fn create_account(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<i64, AppError> {
    let row: (i64,) = sqlx::query_as(
        r#"INSERT INTO accounts (username, email, password_hash, display_name)
           VALUES ($1, $2, $3, $1)
           RETURNING id"#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .map_err(AppError::Sqlx)?;

    Ok(row.0)
}

pub async fn get_account_by_id(pool: &PgPool, id: i64) -> Result<Option<Account>, AppError> {
    sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::Sqlx)
}

/// Look up an account by username or email, case-insensitively.
pub async fn get_account_by_login(pool: &PgPool, login: &str) -> Result<Option<Account>, AppError> {
    sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts \
         WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($1) \
         ORDER BY id LIMIT 1"
    ))
    .bind(login)
    .fetch_optional(pool)
    .await
    .map_err(AppError::Sqlx)
}

pub async fn email_exists(pool: &PgPool, email: &str) -> Result<bool, AppError> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE LOWER(email) = LOWER($1))",
    )
    .bind(email)
    .fetch_one(pool)
    .await
    .map_err(AppError::Sqlx)?;

    Ok(row.0)
}

pub async fn username_exists(pool: &PgPool, username: &str) -> Result<bool, AppError> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE LOWER(username) = LOWER($1))",
    )
    .bind(username)
    .fetch_one(pool)
    .await
    .map_err(AppError::Sqlx)?;

    Ok(row.0)
}

pub async fn update_password_hash(
    pool: &PgPool,
    account_id: i64,
    new_hash: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE accounts SET password_hash = $2 WHERE id = $1",
    )
    .bind(account_id)
    .bind(new_hash)
    .execute(pool)
    .await
    .map_err(AppError::Sqlx)?;
    Ok(())
}

pub async fn update_email(pool: &PgPool, account_id: i64, email: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE accounts SET email = $2 WHERE id = $1")
        .bind(account_id)
        .bind(email)
        .execute(pool)
        .await
        .map_err(AppError::Sqlx)?;
    Ok(())
}

/// Mark the account online and stamp `last_login`.
pub async fn record_login(pool: &PgPool, account_id: i64) -> Result<(), AppError> {
    sqlx::query("UPDATE accounts SET is_online = TRUE, last_login = NOW() WHERE id = $1")
        .bind(account_id)
        .execute(pool)
        .await
        .map_err(AppError::Sqlx)?;
    Ok(())
}

pub async fn set_online(pool: &PgPool, account_id: i64, online: bool) -> Result<(), AppError> {
    sqlx::query("UPDATE accounts SET is_online = $2 WHERE id = $1")
        .bind(account_id)
        .bind(online)
        .execute(pool)
        .await
        .map_err(AppError::Sqlx)?;
    Ok(())
}

/// Count one finished game for the account.
pub async fn record_game_played<'e, E: PgExecutor<'e>>(
    executor: E,
    account_id: i64,
    won: bool,
) -> Result<(), AppError> {
    sqlx::query(
        r#"UPDATE accounts SET
            games_played = games_played + 1,
            games_won = games_won + CASE WHEN $2 THEN 1 ELSE 0 END
        WHERE id = $1"#,
    )
    .bind(account_id)
    .bind(won)
    .execute(executor)
    .await
    .map_err(AppError::Sqlx)?;
    Ok(())
}

/// Apply an Elo delta. Ratings never drop below 100.
pub async fn apply_rating_delta(pool: &PgPool, account_id: i64, delta: i32) -> Result<i32, AppError> {
    let row: (i32,) = sqlx::query_as(
        "UPDATE accounts SET rating = GREATEST(rating + $2, 100) WHERE id = $1 RETURNING rating",
    )
    .bind(account_id)
    .bind(delta)
    .fetch_one(pool)
    .await
    .map_err(AppError::Sqlx)?;
    Ok(row.0)
}
