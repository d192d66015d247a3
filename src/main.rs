use axum::http::Method;
use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use log;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use fogchess::errors::{AppResult, InfrastructureError};
use fogchess::{Config, ConnectionRegistry, GameService, ServiceStats, ShakmatyEngine, WebSocketService};

// Application state
#[derive(Clone)]
struct AppState {
    game_service: Arc<GameService>,
    registry: Arc<ConnectionRegistry>,
    websocket: WebSocketService,
}

// API Routes

async fn hello_world() -> &'static str {
    "Hello from the fog-of-war chess backend!"
}

async fn stats(State(state): State<AppState>) -> Json<ServiceStats> {
    let mut stats = state.game_service.stats().await;
    stats.connections = state.registry.connection_count();
    Json(stats)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let websocket = state.websocket.clone();
    ws.on_upgrade(move |socket| async move { websocket.handle_connection(socket).await })
}

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize logger
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &config.log_level);
    }
    env_logger::init();

    if let Err(e) = run(config).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> AppResult<()> {
    let registry = Arc::new(ConnectionRegistry::new());
    let game_service = Arc::new(GameService::new(
        config.game_config(),
        Arc::new(ShakmatyEngine::new()),
        registry.clone(),
    ));
    let state = AppState {
        websocket: WebSocketService::new(game_service.clone(), registry.clone()),
        registry,
        game_service,
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    let app = Router::new()
        .route("/", get(hello_world))
        .route("/stats", get(stats))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(cors);

    let address = config.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| InfrastructureError::Bind {
            address: address.clone(),
            details: e.to_string(),
        })?;

    log::info!("Server running on {}", address);
    axum::serve(listener, app)
        .await
        .map_err(|e| InfrastructureError::Serve {
            details: e.to_string(),
        })?;
    Ok(())
}
