// src/session.rs
//
// Cookie sessions backed by the sessions table. Middleware loads one snapshot
// per request; handlers mutate through SessionStore so every successful
// workflow step writes exactly once.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::auth::TokenBundle;

pub const SESSION_COOKIE: &str = "videoteca_session";
pub const SESSION_TTL_DAYS: i64 = 14;

/// Per-request snapshot of one session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: Option<i32>,
    pub oauth_state: Option<String>,
    pub credentials: Option<TokenBundle>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Error,
}

/// One pending flash message, rendered and discarded by the next page load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub text: String,
}

impl Flash {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            text: text.into(),
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    pool: PgPool,
}

impl SessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the session named by the cookie, or creates a fresh row when the
    /// cookie is absent, unknown, or expired. The boolean is true when a new
    /// session was created and the response needs a Set-Cookie.
    pub async fn load_or_create(
        &self,
        cookie_id: Option<&str>,
    ) -> Result<(Session, bool), sqlx::Error> {
        if let Some(id) = cookie_id {
            let row = sqlx::query(
                "SELECT id, user_id, oauth_state, credentials, expires_at FROM sessions WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
                if expires_at > Utc::now() {
                    return Ok((
                        Session {
                            id: row.try_get("id")?,
                            user_id: row.try_get("user_id")?,
                            oauth_state: row.try_get("oauth_state")?,
                            credentials: parse_credentials(
                                row.try_get::<Option<serde_json::Value>, _>("credentials")?,
                            ),
                        },
                        false,
                    ));
                }

                // Expired row found under this id: discard it and start over
                sqlx::query("DELETE FROM sessions WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        let session = self.create().await?;
        Ok((session, true))
    }

    async fn create(&self) -> Result<Session, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::days(SESSION_TTL_DAYS);

        sqlx::query("INSERT INTO sessions (id, expires_at) VALUES ($1, $2)")
            .bind(&id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

        Ok(Session {
            id,
            user_id: None,
            oauth_state: None,
            credentials: None,
        })
    }

    /// Callback success is one step: bind the user and cache the bundle in a
    /// single write.
    pub async fn login(
        &self,
        session_id: &str,
        user_id: i32,
        bundle: &TokenBundle,
    ) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_value(bundle)
            .map_err(|e| sqlx::Error::Protocol(format!("credential bundle encode: {}", e)))?;
        sqlx::query("UPDATE sessions SET user_id = $2, credentials = $3 WHERE id = $1")
            .bind(session_id)
            .bind(user_id)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_oauth_state(&self, session_id: &str, state: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET oauth_state = $2 WHERE id = $1")
            .bind(session_id)
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The state token is one-time use: cleared as soon as a callback has
    /// been checked against it, match or not.
    pub async fn clear_oauth_state(&self, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET oauth_state = NULL WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_credentials(
        &self,
        session_id: &str,
        bundle: &TokenBundle,
    ) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_value(bundle)
            .map_err(|e| sqlx::Error::Protocol(format!("credential bundle encode: {}", e)))?;
        sqlx::query("UPDATE sessions SET credentials = $2 WHERE id = $1")
            .bind(session_id)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drops the cached bundle so the next upload attempt forces
    /// re-authorization instead of repeating a doomed refresh.
    pub async fn clear_credentials(&self, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET credentials = NULL WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Logout keeps the session row but strips everything tied to the user.
    pub async fn logout(&self, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sessions SET user_id = NULL, credentials = NULL, oauth_state = NULL WHERE id = $1",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn push_flash(&self, session_id: &str, flash: Flash) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_value(vec![flash])
            .map_err(|e| sqlx::Error::Protocol(format!("flash encode: {}", e)))?;
        sqlx::query("UPDATE sessions SET flash = flash || $2::jsonb WHERE id = $1")
            .bind(session_id)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns the pending flash messages and resets the queue.
    pub async fn take_flash(&self, session_id: &str) -> Result<Vec<Flash>, sqlx::Error> {
        let row = sqlx::query("SELECT flash FROM sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(Vec::new());
        };
        let raw: serde_json::Value = row.try_get("flash")?;
        let flashes: Vec<Flash> = serde_json::from_value(raw).unwrap_or_default();

        if !flashes.is_empty() {
            sqlx::query("UPDATE sessions SET flash = '[]'::jsonb WHERE id = $1")
                .bind(session_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(flashes)
    }

    /// Startup maintenance: drop every expired session row.
    pub async fn sweep_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// A bundle that fails to decode is treated as absent; the user simply has to
/// authorize again.
fn parse_credentials(raw: Option<serde_json::Value>) -> Option<TokenBundle> {
    raw.and_then(|value| serde_json::from_value(value).ok())
}

/// Finds the session id inside a Cookie header value.
pub fn session_id_from_cookies(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == SESSION_COOKIE && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}
