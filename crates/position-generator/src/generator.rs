//! Sample / gate / evaluate loop.

use std::time::{Duration, Instant};

use chess_core::fen::color_name;
use chess_core::sampler::{sample_candidate, Candidate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use shakmaty::Position;
use tracing::{debug, info};

use crate::config::GeneratorConfig;
use crate::error::GeneratorError;
use crate::evaluator::{BatchEvaluator, Evaluation};

/// A position the engine placed inside the target band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedPosition {
    pub fen: String,
    pub white_material: u32,
    pub black_material: u32,
    pub material_difference: u32,
    pub turn: String,
    pub eval_line1: String,
    pub eval_line2: String,
    pub attempts: u32,
    pub time_seconds: f64,
}

impl AcceptedPosition {
    fn new(candidate: &Candidate, evaluation: &Evaluation, attempts: u32, elapsed: Duration) -> Self {
        let line = |i: usize| {
            evaluation
                .lines
                .get(i)
                .map(|l| l.display.clone())
                .unwrap_or_default()
        };
        Self {
            fen: candidate.fen.clone(),
            white_material: candidate.balance.white,
            black_material: candidate.balance.black,
            material_difference: candidate.balance.difference(),
            turn: color_name(candidate.position.turn()).to_string(),
            eval_line1: line(0),
            eval_line2: line(1),
            attempts,
            time_seconds: (elapsed.as_secs_f64() * 10.0).round() / 10.0,
        }
    }
}

/// Samples between cooperative yields to the runtime.
const YIELD_EVERY: u32 = 64;

fn passes_gate(config: &GeneratorConfig, candidate: &Candidate) -> bool {
    let cap = config.sampler.max_material_per_side;
    candidate.balance.white <= cap
        && candidate.balance.black <= cap
        && candidate
            .balance
            .passes_gate(config.min_material_difference, config.min_piece_difference)
}

/// Sample until the evaluator accepts a candidate or the attempt budget is
/// spent. Every sample counts as an attempt; only gated candidates reach the
/// evaluator, `batch_size` at a time. A partially filled batch at exhaustion
/// is not evaluated.
pub async fn generate_position<E, R>(
    config: &GeneratorConfig,
    evaluator: &E,
    rng: &mut R,
) -> Result<AcceptedPosition, GeneratorError>
where
    E: BatchEvaluator + ?Sized,
    R: Rng + Send,
{
    config.validate()?;

    let start = Instant::now();
    let mut attempts = 0;
    let mut buffer: Vec<Candidate> = Vec::with_capacity(config.batch_size);

    while attempts < config.max_attempts {
        attempts += 1;
        if attempts % YIELD_EVERY == 0 {
            // Sampling is synchronous; let timeouts and other tasks run.
            tokio::task::yield_now().await;
        }

        let Ok(candidate) = sample_candidate(&config.sampler, rng) else {
            continue;
        };
        if !passes_gate(config, &candidate) {
            continue;
        }

        buffer.push(candidate);
        if buffer.len() < config.batch_size {
            continue;
        }

        let fens: Vec<String> = buffer.iter().map(|c| c.fen.clone()).collect();
        debug!(attempts, batch = fens.len(), "Evaluating batch");
        let results = evaluator.evaluate_batch(&fens).await?;

        for (candidate, evaluation) in buffer.iter().zip(results) {
            let Some(evaluation) = evaluation else {
                continue;
            };
            if config.band.accepts(&evaluation) {
                let accepted =
                    AcceptedPosition::new(candidate, &evaluation, attempts, start.elapsed());
                info!(
                    fen = %accepted.fen,
                    attempts,
                    time_seconds = accepted.time_seconds,
                    "Position accepted"
                );
                return Ok(accepted);
            }
        }
        buffer.clear();
    }

    info!(attempts, "Attempt budget exhausted");
    Err(GeneratorError::NotFound { attempts })
}
