//! Order Book Client
//!
//! Connects to the matching engine, follows the configured trading pairs and
//! serves health and metrics over HTTP until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orderbook_client::{AppState, Config, MarketClient, SessionState, Side};

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting order book client");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(
        url = %config.server_url,
        pairs = ?config.trading_pairs,
        "Configuration loaded"
    );

    let client = Arc::new(MarketClient::from_config(config.as_ref().clone())?);
    let state = Arc::new(AppState {
        client: client.clone(),
        config: config.clone(),
    });

    // Start health check server
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    client.connect();

    // Books sync on every connection; failures here only mean the first sync is late
    for pair in &config.trading_pairs {
        let client = client.clone();
        let pair = pair.clone();
        tokio::spawn(async move {
            if let Err(e) = client.subscribe(&pair).await {
                warn!(pair = %pair, error = %e, "Initial subscribe failed");
            }
        });
    }

    let status = tokio::spawn(log_status(state.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    status.abort();
    client.shutdown().await;
    Ok(())
}

/// Periodically log the top of every followed book
async fn log_status(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(STATUS_LOG_INTERVAL);
    loop {
        interval.tick().await;
        for pair in &state.config.trading_pairs {
            let Some(book) = state.client.book_state(pair).await else {
                continue;
            };
            info!(
                pair = %pair,
                sync = ?book.sync,
                best_bid = ?book.metrics.best_bid,
                best_ask = ?book.metrics.best_ask,
                spread = ?book.metrics.spread,
                bid_levels = book.metrics.bid_levels,
                ask_levels = book.metrics.ask_levels,
                updates = book.updates_since_snapshot,
                "Order book status"
            );
        }
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/books/:pair", get(book))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let connected = state.client.state() == SessionState::Connected;
    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let mut books = serde_json::Map::new();
    for pair in &state.config.trading_pairs {
        let sync = state.client.sync_state(pair).await;
        books.insert(pair.clone(), serde_json::json!(sync));
    }

    (
        status,
        Json(serde_json::json!({
            "status": if connected { "healthy" } else { "disconnected" },
            "component": "orderbook-client",
            "books": books,
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

async fn metrics(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    match state.client.metrics().encode() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn book(
    State(state): State<Arc<AppState>>,
    Path(pair): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let pair = pair.to_uppercase();
    match state.client.book_state(&pair).await {
        Some(book) => {
            let bids = state.client.depth(&pair, Side::Bid).await;
            let asks = state.client.depth(&pair, Side::Ask).await;
            let bids_in_coins = state.client.book_side_in_coins(&pair, Side::Bid).await;
            let asks_in_coins = state.client.book_side_in_coins(&pair, Side::Ask).await;
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "trading_pair": book.trading_pair,
                    "sync": book.sync,
                    "bids": bids,
                    "asks": asks,
                    "in_coins": { "bids": bids_in_coins, "asks": asks_in_coins },
                    "updates_since_snapshot": book.updates_since_snapshot,
                    "last_trades": book.trades,
                    "metrics": book.metrics,
                })),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("{} is not followed", pair) })),
        ),
    }
}
