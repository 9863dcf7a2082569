// src/middleware/session_context.rs
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderValue,
    },
    middleware::Next,
    response::Response,
    Extension,
};

use crate::error::AppError;
use crate::session::{session_id_from_cookies, SESSION_COOKIE, SESSION_TTL_DAYS};
use crate::AppState;

/// Resolves the browser's session row and puts an explicit `Session` value
/// into the request extensions, so handlers receive their context as an
/// argument instead of reading shared mutable state. When storage had to
/// create a fresh row the response carries the cookie for it.
pub async fn session_context(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let cookie_id = request
        .headers()
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_id_from_cookies);

    let (session, created) = state.sessions.load_or_create(cookie_id.as_deref()).await?;
    let session_id = session.id.clone();

    request.extensions_mut().insert(session);
    let mut response = next.run(request).await;

    if created {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            session_id,
            SESSION_TTL_DAYS * 24 * 60 * 60
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }

    Ok(response)
}
