use sqlx::postgres::{PgPool, PgPoolOptions};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Run the full Postgres schema migration inline.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}

/// Connectivity check for status endpoints.
pub async fn is_connected(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

const SCHEMA_SQL: &str = r#"
-- Accounts table (authentication + rating and statistics)
CREATE TABLE IF NOT EXISTS accounts (
    id            BIGSERIAL PRIMARY KEY,
    username      TEXT UNIQUE NOT NULL,
    email         TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    display_name  TEXT,
    rating        INTEGER NOT NULL DEFAULT 1200,
    games_played  INTEGER NOT NULL DEFAULT 0,
    games_won     INTEGER NOT NULL DEFAULT 0,
    is_online     BOOLEAN NOT NULL DEFAULT FALSE,
    last_login    TIMESTAMPTZ,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_accounts_email_lower
    ON accounts (LOWER(email));
CREATE INDEX IF NOT EXISTS idx_accounts_username_lower
    ON accounts (LOWER(username));

-- Finished games, written once when a session terminates
CREATE TABLE IF NOT EXISTS games (
    id               BIGSERIAL PRIMARY KEY,
    session_id       UUID UNIQUE NOT NULL,
    white_account_id BIGINT REFERENCES accounts(id) ON DELETE SET NULL,
    black_account_id BIGINT REFERENCES accounts(id) ON DELETE SET NULL,
    white_name       TEXT NOT NULL,
    black_name       TEXT NOT NULL,
    starting_fen     TEXT NOT NULL,
    final_fen        TEXT NOT NULL,
    moves            JSONB NOT NULL DEFAULT '[]'::jsonb,
    result           TEXT NOT NULL,
    termination      TEXT NOT NULL,
    started_at       TIMESTAMPTZ NOT NULL,
    ended_at         TIMESTAMPTZ NOT NULL,
    duration_secs    BIGINT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_games_white_account ON games (white_account_id);
CREATE INDEX IF NOT EXISTS idx_games_black_account ON games (black_account_id);
CREATE INDEX IF NOT EXISTS idx_games_ended_at      ON games (ended_at DESC);
"#;
