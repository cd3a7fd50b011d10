//! Generator error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No position found after {attempts} attempts")]
    NotFound { attempts: u32 },

    #[error("Stockfish unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Stockfish error: {0}")]
    Stockfish(String),
}
