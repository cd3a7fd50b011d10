use axum::{Extension, Json};
use position_generator::config::parse_excluded_pieces;
use position_generator::{generate_position, GeneratorConfig, StockfishEvaluator};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::config::Config;
use crate::error::AppError;

/// Every field is optional; omitted ones keep the server defaults.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub target_min: Option<i32>,
    pub target_max: Option<i32>,
    pub max_attempts: Option<u32>,
    pub min_material_difference: Option<u32>,
    pub excluded_pieces: Option<Vec<String>>,
}

impl GenerateRequest {
    fn apply(&self, base: &GeneratorConfig) -> Result<GeneratorConfig, AppError> {
        let mut config = base.clone();
        if let Some(min) = self.target_min {
            config.band.min_cp = min;
        }
        if let Some(max) = self.target_max {
            config.band.max_cp = max;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(diff) = self.min_material_difference {
            config.min_material_difference = diff;
        }
        if let Some(names) = &self.excluded_pieces {
            config.sampler.excluded_roles = parse_excluded_pieces(names)?;
        }
        config.validate()?;
        Ok(config)
    }
}

/// POST /api/generate
pub async fn generate(
    Extension(config): Extension<Config>,
    Extension(base): Extension<GeneratorConfig>,
    Extension(evaluator): Extension<StockfishEvaluator>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let gen_config = req.apply(&base)?;

    tracing::info!(
        target_min = gen_config.band.min_cp,
        target_max = gen_config.band.max_cp,
        max_attempts = gen_config.max_attempts,
        "Generating position"
    );

    let mut rng = StdRng::from_os_rng();
    let accepted = tokio::time::timeout(
        config.generation_timeout(),
        generate_position(&gen_config, &evaluator, &mut rng),
    )
    .await
    .map_err(|_| {
        AppError::Timeout(format!(
            "Generation timed out after {} seconds",
            config.generation_timeout_secs
        ))
    })??;

    Ok(Json(json!({ "success": true, "data": accepted })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_request_keeps_defaults() {
        let base = GeneratorConfig::default();
        let config = GenerateRequest::default().apply(&base).unwrap();
        assert_eq!(config.band, base.band);
        assert_eq!(config.max_attempts, base.max_attempts);
    }

    #[test]
    fn test_overrides_applied() {
        let req = GenerateRequest {
            target_min: Some(50),
            target_max: Some(150),
            max_attempts: Some(500),
            min_material_difference: Some(4),
            excluded_pieces: Some(vec!["queen".into()]),
        };
        let config = req.apply(&GeneratorConfig::default()).unwrap();
        assert_eq!(config.band.min_cp, 50);
        assert_eq!(config.band.max_cp, 150);
        assert_eq!(config.max_attempts, 500);
        assert_eq!(config.min_material_difference, 4);
        assert_eq!(config.sampler.excluded_roles, vec![shakmaty::Role::Queen]);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let base = GeneratorConfig::default();
        let inverted = GenerateRequest {
            target_min: Some(200),
            target_max: Some(100),
            ..Default::default()
        };
        assert!(matches!(inverted.apply(&base), Err(AppError::BadRequest(_))));

        let unknown_piece = GenerateRequest {
            excluded_pieces: Some(vec!["dragon".into()]),
            ..Default::default()
        };
        assert!(matches!(unknown_piece.apply(&base), Err(AppError::BadRequest(_))));
    }
}
