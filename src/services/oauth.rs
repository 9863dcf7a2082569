// src/services/oauth.rs
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Deserialize;
use sqlx::PgPool;

use crate::config::OAuthConfig;
use crate::error::AppError;
use crate::models::auth::TokenBundle;
use crate::models::user::User;
use crate::session::{Session, SessionStore};
use crate::youtube_client::{
    build_authorization_url, GoogleTokenResponse, YouTubeClient, OAUTH_SCOPES, TOKEN_URL,
};

// ============ Callback parameters ============

/// Query parameters the provider appends when redirecting back to us.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

/// What a completed authorization hands back to the web layer.
#[derive(Debug)]
pub struct AuthorizedLogin {
    pub user: User,
    pub bundle: TokenBundle,
}

// ============ Begin: mint state, build the consent URL ============

/// First half of the flow: mint a session-bound anti-forgery token, persist
/// it, and build the provider consent URL the browser gets redirected to.
pub async fn begin(
    store: &SessionStore,
    session: &Session,
    oauth: Option<&OAuthConfig>,
) -> Result<String, AppError> {
    let oauth = oauth.ok_or_else(|| {
        AppError::Configuration(
            "GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REDIRECT_URI must be set"
                .to_string(),
        )
    })?;

    let state = generate_state();
    store.set_oauth_state(&session.id, &state).await?;

    tracing::info!("authorization flow started for session");
    Ok(build_authorization_url(
        &oauth.client_id,
        &oauth.redirect_uri,
        &state,
    ))
}

/// Anti-forgery token: 32 random bytes, URL-safe base64 without padding.
fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

// ============ Complete: validate, exchange, resolve the user ============

/// Second half of the flow, driven by the provider callback. Validates the
/// anti-forgery state against the session-bound copy, exchanges the one-time
/// code, resolves the Google identity to a local user and leaves the session
/// authenticated with the credential bundle cached.
///
/// The stored state is consumed exactly once, whether or not validation
/// passes.
pub async fn complete(
    pool: &PgPool,
    store: &SessionStore,
    client: &YouTubeClient,
    oauth: Option<&OAuthConfig>,
    session: &Session,
    params: &CallbackParams,
) -> Result<AuthorizedLogin, AppError> {
    if session.oauth_state.is_some() {
        store.clear_oauth_state(&session.id).await?;
    }

    validate_state(session.oauth_state.as_deref(), params.state.as_deref())?;

    let oauth = oauth.ok_or_else(|| {
        AppError::Configuration("OAuth client credentials are not configured".to_string())
    })?;

    let code = match params.code.as_deref().filter(|c| !c.is_empty()) {
        Some(code) => code,
        None => {
            let reason = params
                .error
                .clone()
                .unwrap_or_else(|| "authorization code missing from callback".to_string());
            return Err(AppError::Authentication(reason));
        }
    };

    let tokens = client
        .exchange_code_for_token(
            code,
            &oauth.client_id,
            &oauth.client_secret,
            &oauth.redirect_uri,
        )
        .await
        .map_err(|e| AppError::Authentication(e.to_string()))?;

    let profile = client
        .fetch_user_info(&tokens.access_token)
        .await
        .map_err(|e| AppError::Authentication(e.to_string()))?;

    let email = profile
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            AppError::Authentication("profile response carried no email address".to_string())
        })?;
    let first_name = profile.given_name.as_deref().unwrap_or("Usuario");

    let user = find_or_create_user(pool, email, first_name).await?;
    let bundle = build_bundle(oauth, &tokens, Utc::now());

    store.login(&session.id, user.id, &bundle).await?;
    upsert_credentials(pool, user.id, &bundle).await?;

    tracing::info!(user_id = user.id, "authorization completed");
    Ok(AuthorizedLogin { user, bundle })
}

/// The callback state must equal the session-bound value; anything else is
/// treated as a forged or replayed callback.
fn validate_state(
    session_state: Option<&str>,
    callback_state: Option<&str>,
) -> Result<(), AppError> {
    match (session_state, callback_state) {
        (Some(expected), Some(received)) if !expected.is_empty() && expected == received => Ok(()),
        _ => Err(AppError::Security(
            "oauth state missing or mismatched".to_string(),
        )),
    }
}

/// Username doubles as the email address. The no-op upsert makes concurrent
/// callbacks for the same account converge on one row.
async fn find_or_create_user(
    pool: &PgPool,
    email: &str,
    first_name: &str,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, first_name)
        VALUES ($1, $1, $2)
        ON CONFLICT (username) DO UPDATE SET updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(email)
    .bind(first_name)
    .fetch_one(pool)
    .await
}

/// Assembles the credential bundle from the token response, carrying the
/// client identity so later refreshes need no configuration lookup. When the
/// response omits the granted scopes, the requested set stands in.
fn build_bundle(
    oauth: &OAuthConfig,
    tokens: &GoogleTokenResponse,
    now: DateTime<Utc>,
) -> TokenBundle {
    let scopes = tokens
        .scope
        .as_deref()
        .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| OAUTH_SCOPES.iter().map(|s| s.to_string()).collect());

    TokenBundle {
        access_token: tokens.access_token.clone(),
        refresh_token: tokens.refresh_token.clone(),
        token_uri: TOKEN_URL.to_string(),
        client_id: oauth.client_id.clone(),
        client_secret: oauth.client_secret.clone(),
        scopes,
        expires_at: Some(now + Duration::seconds(tokens.expires_in)),
    }
}

/// Durable copy of the bundle, one row per user, replaced on every new grant.
async fn upsert_credentials(
    pool: &PgPool,
    user_id: i32,
    bundle: &TokenBundle,
) -> Result<(), sqlx::Error> {
    let payload = serde_json::to_value(bundle)
        .map_err(|e| sqlx::Error::Protocol(format!("credential bundle encode: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO youtube_credentials (user_id, token)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET token = EXCLUDED.token, updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(payload)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_state_is_url_safe_and_unique() {
        let a = generate_state();
        let b = generate_state();

        assert!(!a.is_empty());
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_validate_state_accepts_matching_values() {
        assert!(validate_state(Some("abc123"), Some("abc123")).is_ok());
    }

    #[test]
    fn test_validate_state_rejects_mismatch() {
        let err = validate_state(Some("abc123"), Some("zzz999")).unwrap_err();
        assert!(matches!(err, AppError::Security(_)));
    }

    #[test]
    fn test_validate_state_rejects_missing_values() {
        assert!(matches!(
            validate_state(None, Some("abc123")),
            Err(AppError::Security(_))
        ));
        assert!(matches!(
            validate_state(Some("abc123"), None),
            Err(AppError::Security(_))
        ));
        assert!(matches!(
            validate_state(Some(""), Some("")),
            Err(AppError::Security(_))
        ));
    }

    #[test]
    fn test_build_bundle_splits_granted_scopes() {
        let oauth = OAuthConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://app.example/youtube/callback/".to_string(),
        };
        let tokens = GoogleTokenResponse {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_in: 3600,
            scope: Some("openid https://www.googleapis.com/auth/youtube.upload".to_string()),
            token_type: "Bearer".to_string(),
        };
        let now = Utc::now();

        let bundle = build_bundle(&oauth, &tokens, now);

        assert_eq!(bundle.scopes.len(), 2);
        assert_eq!(bundle.token_uri, TOKEN_URL);
        assert_eq!(bundle.client_id, "cid");
        assert_eq!(bundle.expires_at, Some(now + Duration::seconds(3600)));
        assert!(bundle.has_refresh_token());
    }

    #[test]
    fn test_build_bundle_falls_back_to_requested_scopes() {
        let oauth = OAuthConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://app.example/youtube/callback/".to_string(),
        };
        let tokens = GoogleTokenResponse {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_in: 3600,
            scope: None,
            token_type: "Bearer".to_string(),
        };

        let bundle = build_bundle(&oauth, &tokens, Utc::now());

        assert_eq!(bundle.scopes.len(), OAUTH_SCOPES.len());
        assert!(!bundle.has_refresh_token());
    }
}
