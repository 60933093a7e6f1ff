use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use looproom::auth::TokenConfig;
use looproom::chat::repository::InMemoryMessageRepository;
use looproom::moderation::repository::InMemoryModerationRepository;
use looproom::room::config::RoomConfig;
use looproom::room::repository::InMemoryLooproomRepository;
use looproom::session::repository::InMemorySessionRepository;
use looproom::shared::AppState;
use looproom::websockets::{websocket_handler, ConnectionManager, InMemoryConnectionManager};
use looproom::{chat, room, RoomRegistry};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "looproom=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Looproom server");

    // Create shared application state with dependency injection
    // Easy to switch between implementations:
    let looproom_repository = Arc::new(InMemoryLooproomRepository::new());
    let message_repository = Arc::new(InMemoryMessageRepository::new());
    let session_repository = Arc::new(InMemorySessionRepository::new());
    let moderation_repository = Arc::new(InMemoryModerationRepository::new());

    // For production with PostgreSQL:
    // let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    // let pool = sqlx::PgPool::connect(&database_url).await.expect("Failed to connect to database");
    // let looproom_repository = Arc::new(PostgresLooproomRepository::new(pool.clone()));
    // ... and likewise for the message, session and moderation repositories

    let connection_manager: Arc<dyn ConnectionManager> = Arc::new(InMemoryConnectionManager::new());
    let registry = Arc::new(RoomRegistry::new(
        RoomConfig::default(),
        looproom_repository.clone(),
        session_repository,
        moderation_repository,
        message_repository.clone(),
        connection_manager.clone(),
    ));

    // periodic idle-room eviction and moderation reaping
    registry.clone().start_sweep_task();

    let app_state = AppState::new(
        looproom_repository,
        message_repository,
        registry,
        connection_manager,
        TokenConfig::new(),
    );

    let app = Router::new()
        .route("/", get(|| async { "Looproom server" }))
        .route("/looprooms", post(room::create_room).get(room::list_rooms))
        .route("/looprooms/:room_id/messages", get(chat::recent_messages))
        .route("/ws/:room_id", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind port 3000");
    info!("Server running on http://localhost:3000");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
