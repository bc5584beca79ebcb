//! apinbox - an ActivityPub inbox endpoint
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - POST /inbox                                              │
//! │  - /health, /metrics                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Federation Layer                          │
//! │  - HTTP signature verification                              │
//! │  - Key resolution / actor trust store                       │
//! │  - Inbox ingestion                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `federation`: signatures, actor resolution and ingestion
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus registry

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Inbox request pipeline
    pub inbox: Arc<federation::InboxHandler>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database (runs migrations)
    /// 2. Build the actor fetcher
    /// 3. Wire the inbox pipeline
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!(path = %config.database.path.display(), "Database connected");

        // 2. Actor fetcher
        let fetcher = federation::ActorFetcher::new(&config.federation)?;

        // 3. Inbox pipeline
        let accounts = Arc::new(federation::Accounts::new(db.clone(), fetcher));
        let inbox = federation::InboxHandler::new(
            accounts,
            db,
            federation::InboxOptions {
                max_clock_skew: config.federation.max_clock_skew(),
                require_actor_match: config.federation.require_actor_match,
            },
        );

        tracing::info!("Application state initialized successfully");

        Ok(Self::with_inbox(config, inbox))
    }

    /// Assemble state around an already-built inbox pipeline.
    pub fn with_inbox(config: config::AppConfig, inbox: federation::InboxHandler) -> Self {
        Self {
            config: Arc::new(config),
            inbox: Arc::new(inbox),
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, extract::DefaultBodyLimit};
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let max_body_bytes = state.config.federation.max_body_bytes;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::inbox_router())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
