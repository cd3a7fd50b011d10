//! Generator and engine configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chess_core::sampler::SamplerConfig;
use serde::{Deserialize, Serialize};
use shakmaty::Role;

use crate::error::GeneratorError;
use crate::evaluator::MATE_SCORE;

/// How many of the top two engine lines must fall inside the band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinePolicy {
    #[default]
    Both,
    Any,
}

impl FromStr for LinePolicy {
    type Err = GeneratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" => Ok(LinePolicy::Both),
            "any" => Ok(LinePolicy::Any),
            other => Err(GeneratorError::InvalidConfig(format!(
                "unknown line policy '{other}' (expected 'both' or 'any')"
            ))),
        }
    }
}

/// Target evaluation window, mirrored around zero: a score is inside when
/// `min_cp <= |score| <= max_cp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptanceBand {
    pub min_cp: i32,
    pub max_cp: i32,
    pub policy: LinePolicy,
}

impl Default for AcceptanceBand {
    fn default() -> Self {
        Self {
            min_cp: 25,
            max_cp: 100,
            policy: LinePolicy::Both,
        }
    }
}

impl AcceptanceBand {
    pub fn contains(&self, cp: i32) -> bool {
        (self.min_cp..=self.max_cp).contains(&cp) || (-self.max_cp..=-self.min_cp).contains(&cp)
    }

    pub fn validate(&self) -> Result<(), GeneratorError> {
        if self.min_cp < 0 {
            return Err(GeneratorError::InvalidConfig(
                "target_min must not be negative".into(),
            ));
        }
        if self.min_cp > self.max_cp {
            return Err(GeneratorError::InvalidConfig(format!(
                "target_min ({}) must not exceed target_max ({})",
                self.min_cp, self.max_cp
            )));
        }
        if self.max_cp >= MATE_SCORE {
            return Err(GeneratorError::InvalidConfig(format!(
                "target_max must be below {MATE_SCORE}"
            )));
        }
        Ok(())
    }
}

/// Pieces in the largest class of the pool (two knights plus two bishops).
const MAX_PIECE_CLASS_COUNT: u32 = 4;

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub sampler: SamplerConfig,
    pub band: AcceptanceBand,

    /// Minimum point gap between the two sides
    pub min_material_difference: u32,

    /// Minimum major- or minor-piece count difference
    pub min_piece_difference: u32,

    /// Sampling attempts before giving up (every sample counts, legal or not)
    pub max_attempts: u32,

    /// Gated candidates sent to the engine together
    pub batch_size: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            band: AcceptanceBand::default(),
            min_material_difference: 3,
            min_piece_difference: 1,
            max_attempts: 20_000,
            batch_size: 5,
        }
    }
}

impl GeneratorConfig {
    /// Defaults, with the line policy taken from `ACCEPT_LINE_POLICY`.
    pub fn from_env() -> Result<Self, GeneratorError> {
        let mut config = Self::default();
        if let Ok(policy) = env::var("ACCEPT_LINE_POLICY") {
            config.band.policy = policy.parse()?;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GeneratorError> {
        self.sampler
            .validate()
            .map_err(GeneratorError::InvalidConfig)?;
        self.band.validate()?;
        if self.batch_size == 0 {
            return Err(GeneratorError::InvalidConfig(
                "batch_size must be at least 1".into(),
            ));
        }
        let reachable = self.sampler.max_material_difference();
        if self.min_material_difference > reachable {
            return Err(GeneratorError::InvalidConfig(format!(
                "min_material_difference ({}) cannot exceed the largest reachable gap ({reachable})",
                self.min_material_difference
            )));
        }
        if self.min_piece_difference > MAX_PIECE_CLASS_COUNT {
            return Err(GeneratorError::InvalidConfig(format!(
                "min_piece_difference ({}) cannot exceed {MAX_PIECE_CLASS_COUNT}",
                self.min_piece_difference
            )));
        }
        Ok(())
    }
}

/// Parse piece names such as `"queen"`, `"n"` or `"Rook"` into roles.
pub fn parse_excluded_pieces(names: &[String]) -> Result<Vec<Role>, GeneratorError> {
    names
        .iter()
        .map(|name| {
            let role = match name.trim().to_ascii_lowercase().as_str() {
                "q" | "queen" => Role::Queen,
                "r" | "rook" => Role::Rook,
                "b" | "bishop" => Role::Bishop,
                "n" | "knight" => Role::Knight,
                "p" | "pawn" => Role::Pawn,
                other => {
                    return Err(GeneratorError::InvalidConfig(format!(
                        "unknown piece type '{other}'"
                    )))
                }
            };
            Ok(role)
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to Stockfish binary
    pub path: String,

    /// Search depth per position
    pub depth: u32,

    /// Move time per position, whichever of depth/time ends first
    pub movetime_ms: u64,

    pub threads: u32,
    pub hash_mb: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "/usr/local/bin/stockfish".to_string(),
            depth: 30,
            movetime_ms: 500,
            threads: 1,
            hash_mb: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let path = env::var("STOCKFISH_PATH").unwrap_or(defaults.path);

        let depth = env::var("STOCKFISH_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.depth);

        let movetime_ms = env::var("STOCKFISH_MOVETIME_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.movetime_ms);

        let threads = env::var("STOCKFISH_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.threads);

        let hash_mb = env::var("STOCKFISH_HASH_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.hash_mb);

        Self {
            path,
            depth,
            movetime_ms,
            threads,
            hash_mb,
        }
    }

    /// Upper bound on one position's analysis before the engine is
    /// considered stuck.
    pub fn position_timeout(&self) -> Duration {
        Duration::from_millis(self.movetime_ms.saturating_mul(2) + 5_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_is_symmetric() {
        let band = AcceptanceBand::default();
        assert!(band.contains(25));
        assert!(band.contains(100));
        assert!(band.contains(-60));
        assert!(!band.contains(0));
        assert!(!band.contains(24));
        assert!(!band.contains(-101));
        assert!(!band.contains(MATE_SCORE));
    }

    #[test]
    fn test_band_validation() {
        let band = AcceptanceBand {
            min_cp: 100,
            max_cp: 25,
            policy: LinePolicy::Both,
        };
        assert!(band.validate().is_err());

        let band = AcceptanceBand {
            min_cp: 0,
            max_cp: MATE_SCORE,
            policy: LinePolicy::Both,
        };
        assert!(band.validate().is_err());
    }

    #[test]
    fn test_generator_validation() {
        assert!(GeneratorConfig::default().validate().is_ok());

        let config = GeneratorConfig {
            batch_size: 0,
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GeneratorError::InvalidConfig(_))
        ));

        // The sampler never produces a 20-point gap
        let config = GeneratorConfig {
            min_material_difference: 20,
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GeneratorError::InvalidConfig(_))
        ));

        let config = GeneratorConfig {
            min_piece_difference: 5,
            ..GeneratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_line_policy_parse() {
        assert_eq!("both".parse::<LinePolicy>().unwrap(), LinePolicy::Both);
        assert_eq!(" ANY ".parse::<LinePolicy>().unwrap(), LinePolicy::Any);
        assert!("most".parse::<LinePolicy>().is_err());
    }

    #[test]
    fn test_parse_excluded_pieces() {
        let roles = parse_excluded_pieces(&["queen".into(), "N".into()]).unwrap();
        assert_eq!(roles, vec![Role::Queen, Role::Knight]);
        assert!(parse_excluded_pieces(&["king".into()]).is_err());
    }
}
