// lib.rs - Main library file that exports all modules
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod session;
pub mod youtube_client;

use sqlx::PgPool;

pub use config::AppConfig;
pub use error::AppError;
pub use session::SessionStore;
pub use youtube_client::YouTubeClient;

/// Shared application state injected into every handler via `Extension`.
pub struct AppState {
    pub db_pool: PgPool,
    pub config: AppConfig,
    pub youtube: YouTubeClient,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: AppConfig) -> Self {
        let youtube = YouTubeClient::new(config.youtube_api_key.clone());
        let sessions = SessionStore::new(db_pool.clone());
        Self {
            db_pool,
            config,
            youtube,
            sessions,
        }
    }
}
