pub mod config;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod stockfish;

pub use config::{AcceptanceBand, EngineConfig, GeneratorConfig, LinePolicy};
pub use error::GeneratorError;
pub use evaluator::{BatchEvaluator, EvalLine, Evaluation, StockfishEvaluator};
pub use generator::{generate_position, AcceptedPosition};
