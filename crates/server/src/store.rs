//! Account access used by the live-game core.

use async_trait::async_trait;
use chess_core::session::GameRecord;
use shakmaty::Color;
use sqlx::PgPool;

use crate::db::{accounts, games};
use crate::error::AppError;

/// Identity snapshot handed to the matchmaker.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerAccount {
    pub id: i64,
    pub display_name: String,
    pub rating: i32,
}

#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn get_account(&self, id: i64) -> Result<Option<PlayerAccount>, AppError>;

    /// Persist a finished game and count it for each registered participant.
    async fn record_result(&self, record: &GameRecord) -> Result<(), AppError>;

    async fn update_rating(&self, account_id: i64, delta: i32) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgPlayerStore {
    pool: PgPool,
}

impl PgPlayerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlayerStore for PgPlayerStore {
    async fn get_account(&self, id: i64) -> Result<Option<PlayerAccount>, AppError> {
        Ok(accounts::get_account_by_id(&self.pool, id)
            .await?
            .map(|a| PlayerAccount {
                id: a.id,
                display_name: a.name().to_string(),
                rating: a.rating,
            }))
    }

    async fn record_result(&self, record: &GameRecord) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Sqlx)?;

        if games::insert_game(&mut *tx, record).await?.is_none() {
            // Already stored for this session
            return Ok(());
        }

        let winner = record.result.winner();
        for (color, participant) in [(Color::White, &record.white), (Color::Black, &record.black)] {
            if let Some(account_id) = participant.account_id {
                accounts::record_game_played(&mut *tx, account_id, winner == Some(color)).await?;
            }
        }

        tx.commit().await.map_err(AppError::Sqlx)?;
        Ok(())
    }

    async fn update_rating(&self, account_id: i64, delta: i32) -> Result<(), AppError> {
        accounts::apply_rating_delta(&self.pool, account_id, delta).await?;
        Ok(())
    }
}
