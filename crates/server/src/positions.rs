//! Starting positions for new games.

use async_trait::async_trait;
use position_generator::{generate_position, GeneratorConfig, GeneratorError, StockfishEvaluator};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn starting_position(&self) -> Result<String, GeneratorError>;
}

/// Engine-filtered imbalanced positions, with a reduced attempt budget.
pub struct EnginePositions {
    config: GeneratorConfig,
    evaluator: StockfishEvaluator,
}

impl EnginePositions {
    pub fn new(mut config: GeneratorConfig, evaluator: StockfishEvaluator, max_attempts: u32) -> Self {
        config.max_attempts = max_attempts;
        Self { config, evaluator }
    }
}

#[async_trait]
impl PositionSource for EnginePositions {
    async fn starting_position(&self) -> Result<String, GeneratorError> {
        let mut rng = StdRng::from_os_rng();
        let accepted = generate_position(&self.config, &self.evaluator, &mut rng).await?;
        Ok(accepted.fen)
    }
}

/// Always the same FEN.
#[derive(Debug, Clone)]
pub struct FixedPosition(pub String);

#[async_trait]
impl PositionSource for FixedPosition {
    async fn starting_position(&self) -> Result<String, GeneratorError> {
        Ok(self.0.clone())
    }
}
