//! Batch position generator
//!
//! Generates `--count` engine-filtered imbalanced positions and writes them
//! to `--output` as a JSON array.

use std::time::Instant;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};

use position_generator::{
    generate_position, EngineConfig, GeneratorConfig, GeneratorError, StockfishEvaluator,
};

const DEFAULT_COUNT: usize = 50;
const DEFAULT_OUTPUT: &str = "generated_positions.json";

/// Value following `flag` on the command line
fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let count = match arg_value(&args, "--count") {
        Some(v) => v.parse().context("--count must be a positive integer")?,
        None => DEFAULT_COUNT,
    };
    let output = arg_value(&args, "--output").unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

    let config = GeneratorConfig::from_env()?;
    let engine = EngineConfig::from_env();
    info!(
        stockfish_path = %engine.path,
        depth = engine.depth,
        movetime_ms = engine.movetime_ms,
        policy = ?config.band.policy,
        count,
        "Generator config loaded"
    );

    let evaluator = StockfishEvaluator::new(engine);
    let mut rng = StdRng::from_os_rng();
    let started = Instant::now();
    let mut positions = Vec::with_capacity(count);

    for i in 1..=count {
        println!("--- Position {i}/{count} ---");
        match generate_position(&config, &evaluator, &mut rng).await {
            Ok(position) => {
                println!("  OK ({}s): {}", position.time_seconds, position.fen);
                positions.push(position);
            }
            Err(e @ GeneratorError::EngineUnavailable(_)) => {
                error!(error = %e, "Engine unavailable, stopping");
                break;
            }
            Err(e) => {
                println!("  FAILED: {e}");
            }
        }
    }

    let json = serde_json::to_string_pretty(&positions)?;
    tokio::fs::write(&output, json)
        .await
        .with_context(|| format!("failed to write {output}"))?;

    println!(
        "Generated {} of {count} positions in {:.1}s, saved to {output}",
        positions.len(),
        started.elapsed().as_secs_f64()
    );

    Ok(())
}
