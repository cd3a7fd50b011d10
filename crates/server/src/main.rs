use std::sync::Arc;

use server::config;
use server::db;
use server::hub::Hub;
use server::matchmaking::Matchmaker;
use server::positions::{EnginePositions, FixedPosition, PositionSource};
use server::routes;
use server::store::{PgPlayerStore, PlayerStore};

use axum::{routing::{get, post, put}, Extension, Router};
use chess_core::fen::STANDARD_START_FEN;
use position_generator::{EngineConfig, GeneratorConfig, StockfishEvaluator};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();
    let generator_config = GeneratorConfig::from_env().expect("Invalid generator configuration");
    generator_config
        .validate()
        .expect("Invalid generator configuration");
    let engine_config = EngineConfig::from_env();
    let evaluator = StockfishEvaluator::new(engine_config);

    // Connect to Postgres
    tracing::info!("Connecting to database...");
    let pool = db::pool::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run schema migrations
    tracing::info!("Running migrations...");
    db::pool::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    match evaluator.check_available().await {
        Ok(()) => tracing::info!(path = %evaluator.config().path, "Stockfish ready"),
        Err(e) => tracing::warn!("Stockfish not available, generation will fail: {e}"),
    }

    let positions: Arc<dyn PositionSource> = if config.pairing_random_positions {
        Arc::new(EnginePositions::new(
            generator_config.clone(),
            evaluator.clone(),
            config.pairing_max_attempts,
        ))
    } else {
        tracing::info!("Random starting positions disabled");
        Arc::new(FixedPosition(STANDARD_START_FEN.to_string()))
    };

    let hub = Arc::new(Hub::new());
    let store: Arc<dyn PlayerStore> = Arc::new(PgPlayerStore::new(pool.clone()));
    let matchmaker = Arc::new(Matchmaker::new(
        Arc::clone(&hub),
        positions,
        Arc::clone(&store),
        config.pairing_timeout(),
    ));

    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(routes::health::index))
        .route("/health", get(routes::health::health_check))
        // Auth
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/auth/stats", get(routes::auth::stats))
        .route("/api/auth/check", get(routes::auth::check))
        .route("/api/auth/update-profile", put(routes::auth::update_profile))
        .route("/api/auth/change-password", put(routes::auth::change_password))
        // Positions
        .route("/api/generate", post(routes::generate::generate))
        .route("/api/status", get(routes::status::get_status))
        // Play
        .route("/api/lobby", get(routes::lobby::get_lobby))
        .route("/api/users/me/games", get(routes::games::get_my_games))
        .route("/ws/play", get(routes::play_ws::ws_handler))
        // Shared state
        .layer(Extension(pool))
        .layer(Extension(config.clone()))
        .layer(Extension(generator_config))
        .layer(Extension(evaluator))
        .layer(Extension(hub))
        .layer(Extension(store))
        .layer(Extension(matchmaker))
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
