use axum::http::HeaderValue;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod db;
mod error;
mod integrations;
mod models;
mod services;
mod utils;

use config::Config;
use constants::API_VERSION;
use db::{Database, SessionStore};
use integrations::{
    AssistantProvider, BankClient, BankProvider, ChainProvider, EvmClient, GeminiClient,
};
use services::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onchainbudget_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting OnchainBudget Backend Server");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    // Initialize database
    let db = Database::new(&config).await?;

    tracing::info!("Running database migrations...");
    db.run_migrations().await?;

    // Provider clients are built exactly once here and injected everywhere.
    let bank: Arc<dyn BankProvider> = Arc::new(BankClient::new(&config)?);
    let chain: Arc<dyn ChainProvider> = Arc::new(EvmClient::new(config.clone()));
    let assistant: Arc<dyn AssistantProvider> = Arc::new(GeminiClient::new(&config)?);
    let store: Arc<dyn SessionStore> = Arc::new(db.clone());

    let sessions = Arc::new(SessionRegistry::new(
        bank.clone(),
        chain.clone(),
        assistant,
        store,
    ));

    let app_state = api::AppState {
        db,
        config: config.clone(),
        bank,
        chain,
        sessions,
    };

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid address");

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Bank gateway
        .route(
            "/api/v1/bank/accounts/{account_id}",
            get(api::bank::get_account),
        )
        .route(
            "/api/v1/bank/accounts/{account_id}/transactions",
            get(api::bank::get_account_transactions),
        )
        // Onchain gateway
        .route(
            "/api/v1/onchain/balance/{address}",
            get(api::onchain::get_native_balance),
        )
        .route(
            "/api/v1/onchain/token-balance/{address}",
            get(api::onchain::get_token_balance),
        )
        .route(
            "/api/v1/onchain/identity/{address}",
            get(api::onchain::get_identity),
        )
        // Session & read model
        .route("/api/v1/session/connect", post(api::session::connect))
        .route(
            "/api/v1/session/{wallet}/snapshot",
            get(api::session::snapshot),
        )
        .route(
            "/api/v1/session/{wallet}/refresh/transactions",
            post(api::session::refresh_transactions),
        )
        .route(
            "/api/v1/session/{wallet}/refresh/balances",
            post(api::session::refresh_balances),
        )
        .route(
            "/api/v1/session/{wallet}/refresh/portfolio",
            post(api::session::refresh_portfolio),
        )
        .route(
            "/api/v1/session/{wallet}/refresh/identity",
            post(api::session::refresh_identity),
        )
        .route(
            "/api/v1/session/{wallet}/bank/link",
            post(api::session::link_bank),
        )
        .route(
            "/api/v1/session/{wallet}/bank/{account_id}",
            delete(api::session::unlink_bank),
        )
        .route(
            "/api/v1/session/{wallet}/spending-summary",
            get(api::session::spending_summary),
        )
        // Chat
        .route(
            "/api/v1/session/{wallet}/chat",
            post(api::session::chat_send),
        )
        .route(
            "/api/v1/session/{wallet}/chat/history",
            get(api::session::chat_history),
        )
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
