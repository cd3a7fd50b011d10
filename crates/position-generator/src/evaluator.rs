//! Batch position evaluation and band acceptance.

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{AcceptanceBand, EngineConfig, LinePolicy};
use crate::error::GeneratorError;
use crate::stockfish::{PvLine, StockfishEngine};

/// Centipawn stand-in for a forced mate.
pub const MATE_SCORE: i32 = 99_999;

/// Number of engine lines requested per position.
const LINES: u32 = 2;

/// One engine line, scored from white's perspective.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalLine {
    /// Centipawns, or `±MATE_SCORE` for a forced mate
    pub cp: i32,
    /// Mate in N (positive = white mates)
    pub mate: Option<i32>,
    /// Human-readable score, e.g. `+0.45` or `Mate in -3`
    pub display: String,
    pub best_move: Option<String>,
}

impl EvalLine {
    pub fn from_cp(cp: i32) -> Self {
        Self {
            cp,
            mate: None,
            display: format!("{:+.2}", cp as f64 / 100.0),
            best_move: None,
        }
    }

    pub fn from_mate(moves: i32) -> Self {
        Self {
            cp: if moves > 0 { MATE_SCORE } else { -MATE_SCORE },
            mate: Some(moves),
            display: format!("Mate in {moves}"),
            best_move: None,
        }
    }

    /// Convert a raw engine line. `None` when the engine gave no score.
    fn from_pv(pv: &PvLine, black_to_move: bool) -> Option<Self> {
        let sign = if black_to_move { -1 } else { 1 };
        let mut line = match (pv.mate, pv.cp) {
            // Side to move is already mated
            (Some(0), _) => Self {
                cp: -MATE_SCORE * sign,
                ..Self::from_mate(0)
            },
            (Some(mate), _) => Self::from_mate(mate * sign),
            (None, Some(cp)) => Self::from_cp(cp * sign),
            (None, None) => return None,
        };
        line.best_move = pv.pv.first().cloned();
        Some(line)
    }
}

/// The top engine lines for one position, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub lines: Vec<EvalLine>,
}

impl Evaluation {
    /// Build from engine output. Positions with fewer than two scored lines
    /// (for example a single legal move) yield `None`.
    pub fn from_pv_lines(pv_lines: &[PvLine], black_to_move: bool) -> Option<Self> {
        let lines: Vec<EvalLine> = pv_lines
            .iter()
            .map_while(|pv| EvalLine::from_pv(pv, black_to_move))
            .collect();
        if lines.len() < LINES as usize {
            return None;
        }
        Some(Self { lines })
    }
}

impl AcceptanceBand {
    /// Apply the line policy to the top two lines.
    pub fn accepts(&self, evaluation: &Evaluation) -> bool {
        let Some(top) = evaluation.lines.get(..LINES as usize) else {
            return false;
        };
        match self.policy {
            LinePolicy::Both => top.iter().all(|line| self.contains(line.cp)),
            LinePolicy::Any => top.iter().any(|line| self.contains(line.cp)),
        }
    }
}

/// Evaluates a batch of FENs. A per-position failure is reported as `None`;
/// an `Err` means the whole evaluator is unusable.
#[async_trait]
pub trait BatchEvaluator: Send + Sync {
    async fn evaluate_batch(
        &self,
        fens: &[String],
    ) -> Result<Vec<Option<Evaluation>>, GeneratorError>;
}

fn black_to_move(fen: &str) -> bool {
    fen.split_whitespace().nth(1) == Some("b")
}

/// Runs one Stockfish process per batch.
#[derive(Clone, Debug)]
pub struct StockfishEvaluator {
    config: EngineConfig,
}

impl StockfishEvaluator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start and stop the engine once.
    pub async fn check_available(&self) -> Result<(), GeneratorError> {
        let mut engine = StockfishEngine::new(&self.config).await?;
        engine.quit().await;
        Ok(())
    }
}

#[async_trait]
impl BatchEvaluator for StockfishEvaluator {
    async fn evaluate_batch(
        &self,
        fens: &[String],
    ) -> Result<Vec<Option<Evaluation>>, GeneratorError> {
        let mut engine = Some(StockfishEngine::new(&self.config).await?);
        let mut results = Vec::with_capacity(fens.len());

        for fen in fens {
            // A stuck or crashed engine is dropped (killed) and replaced
            if engine.is_none() {
                match StockfishEngine::new(&self.config).await {
                    Ok(fresh) => engine = Some(fresh),
                    Err(e) => warn!(error = %e, "Failed to restart Stockfish"),
                }
            }
            let Some(sf) = engine.as_mut() else {
                results.push(None);
                continue;
            };

            let analysis = sf.evaluate_multipv(fen, self.config.depth, self.config.movetime_ms, LINES);
            match timeout(self.config.position_timeout(), analysis).await {
                Ok(Ok(lines)) => {
                    let evaluation = Evaluation::from_pv_lines(&lines, black_to_move(fen));
                    debug!(fen = %fen, ?evaluation, "Position evaluated");
                    results.push(evaluation);
                }
                Ok(Err(e)) => {
                    warn!(fen = %fen, error = %e, "Analysis failed");
                    engine = None;
                    results.push(None);
                }
                Err(_) => {
                    warn!(fen = %fen, "Analysis timed out");
                    engine = None;
                    results.push(None);
                }
            }
        }

        if let Some(mut sf) = engine {
            sf.quit().await;
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pv(cp: Option<i32>, mate: Option<i32>, first: &str) -> PvLine {
        PvLine {
            pv: vec![first.to_string()],
            cp,
            mate,
        }
    }

    fn evaluation(cps: &[i32]) -> Evaluation {
        Evaluation {
            lines: cps.iter().map(|cp| EvalLine::from_cp(*cp)).collect(),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(EvalLine::from_cp(45).display, "+0.45");
        assert_eq!(EvalLine::from_cp(-130).display, "-1.30");
        assert_eq!(EvalLine::from_mate(-3).display, "Mate in -3");
        assert_eq!(EvalLine::from_mate(2).cp, MATE_SCORE);
    }

    #[test]
    fn test_scores_flip_for_black_to_move() {
        let lines = [pv(Some(40), None, "e7e5"), pv(None, Some(2), "d8h4")];
        let eval = Evaluation::from_pv_lines(&lines, true).unwrap();
        assert_eq!(eval.lines[0].cp, -40);
        assert_eq!(eval.lines[1].cp, -MATE_SCORE);
        assert_eq!(eval.lines[1].mate, Some(-2));
        assert_eq!(eval.lines[0].best_move.as_deref(), Some("e7e5"));
    }

    #[test]
    fn test_mate_zero_scores_against_side_to_move() {
        let mated = pv(None, Some(0), "");
        assert_eq!(EvalLine::from_pv(&mated, false).unwrap().cp, -MATE_SCORE);
        assert_eq!(EvalLine::from_pv(&mated, true).unwrap().cp, MATE_SCORE);
        assert_eq!(EvalLine::from_pv(&mated, true).unwrap().mate, Some(0));
    }

    #[test]
    fn test_single_line_is_no_evaluation() {
        let lines = [pv(Some(40), None, "e2e4"), PvLine::default()];
        assert!(Evaluation::from_pv_lines(&lines, false).is_none());
    }

    #[test]
    fn test_policy_both_and_any() {
        let both = AcceptanceBand::default();
        let any = AcceptanceBand {
            policy: LinePolicy::Any,
            ..AcceptanceBand::default()
        };

        assert!(both.accepts(&evaluation(&[50, -80])));
        assert!(!both.accepts(&evaluation(&[50, 300])));
        assert!(any.accepts(&evaluation(&[50, 300])));
        assert!(!any.accepts(&evaluation(&[5, 300])));
        assert!(!both.accepts(&evaluation(&[50])));
    }

    #[test]
    fn test_mate_never_accepted() {
        let band = AcceptanceBand {
            min_cp: 0,
            max_cp: MATE_SCORE - 1,
            policy: LinePolicy::Both,
        };
        let eval = Evaluation {
            lines: vec![EvalLine::from_mate(4), EvalLine::from_cp(60)],
        };
        assert!(!band.accepts(&eval));
    }

    #[test]
    fn test_black_to_move() {
        assert!(black_to_move("4k3/8/8/8/8/8/8/4K3 b - - 0 1"));
        assert!(!black_to_move("4k3/8/8/8/8/8/8/4K3 w - - 0 1"));
    }
}
