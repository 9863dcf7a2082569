// src/main.rs
use std::sync::Arc;

use axum::{Extension, Router};
use tower_http::cors::CorsLayer;

use videoteca::{db, handlers, middleware, AppConfig, AppState};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().expect("Failed to initialize logging");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    // The upload workflow parks incoming files here before streaming them out.
    if let Err(e) = tokio::fs::create_dir_all(handlers::upload::UPLOAD_DIR).await {
        tracing::warn!("Failed to create uploads directory: {}", e);
    } else {
        tracing::info!("Uploads directory ready");
    }

    let db_pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool.");

    let state = Arc::new(AppState::new(db_pool, config));

    // Old session rows accumulate between restarts; expired ones are also
    // dropped lazily on access.
    match state.sessions.sweep_expired().await {
        Ok(0) => {}
        Ok(n) => tracing::info!("removed {} expired sessions", n),
        Err(e) => tracing::warn!("session sweep failed: {}", e),
    }

    tracing::info!(
        "Configuration - YouTube API: {}, OAuth: {}, allowed hosts: {}",
        if state.config.youtube_api_key.is_some() {
            "configured"
        } else {
            "missing"
        },
        if state.config.oauth.is_some() {
            "configured"
        } else {
            "missing"
        },
        state.config.allowed_hosts.join(", ")
    );

    let bind_addr = state.config.bind_addr.clone();

    let app = Router::new()
        .merge(handlers::pages::pages_routes())
        .merge(handlers::auth::auth_routes())
        .merge(handlers::upload::upload_routes())
        .layer(axum::middleware::from_fn(
            middleware::session_context::session_context,
        ))
        .layer(axum::middleware::from_fn(
            middleware::allowed_hosts::allowed_hosts,
        ))
        .layer(axum::middleware::from_fn(
            middleware::logging::request_logging,
        ))
        .layer(CorsLayer::permissive())
        .layer(Extension(state.clone()));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind server address");
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,videoteca=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,videoteca=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for production (easier for log aggregation)
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        // Human-readable logging for development
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Videoteca starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Build mode: {}",
        if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        }
    );
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
