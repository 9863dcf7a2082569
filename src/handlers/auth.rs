// src/handlers/auth.rs
use std::sync::Arc;

use axum::{
    extract::Query,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Router,
};

use crate::error::AppError;
use crate::services::oauth::{self, CallbackParams};
use crate::session::{Flash, Session};
use crate::AppState;

pub fn auth_routes() -> Router {
    Router::new()
        .route("/autorizar/", get(autorizar))
        .route("/youtube/callback/", get(callback))
}

/// Kicks off the authorization flow by redirecting the browser to the
/// provider consent screen. Without OAuth client configuration the flow is
/// unavailable and the visitor is told so on the login page.
async fn autorizar(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    match oauth::begin(&state.sessions, &session, state.config.oauth.as_ref()).await {
        Ok(url) => Ok(Redirect::to(&url).into_response()),
        Err(AppError::Configuration(reason)) => {
            tracing::error!("authorization unavailable: {}", reason);
            state
                .sessions
                .push_flash(
                    &session.id,
                    Flash::error("La integración con YouTube no está configurada."),
                )
                .await?;
            Ok(Redirect::to("/login/").into_response())
        }
        Err(other) => Err(other),
    }
}

/// Provider callback. A passed security check logs the user in and lands on
/// their catalog; every failure class turns into a flash plus a redirect so
/// the visitor never sees a bare error page.
async fn callback(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let outcome = oauth::complete(
        &state.db_pool,
        &state.sessions,
        &state.youtube,
        state.config.oauth.as_ref(),
        &session,
        &params,
    )
    .await;

    match outcome {
        Ok(login) => {
            state
                .sessions
                .push_flash(
                    &session.id,
                    Flash::success(format!("¡Bienvenido, {}!", login.user.display_name())),
                )
                .await?;
            Ok(Redirect::to("/mis-videos/").into_response())
        }
        Err(AppError::Security(reason)) => {
            tracing::warn!("callback rejected: {}", reason);
            state
                .sessions
                .push_flash(
                    &session.id,
                    Flash::error(
                        "La verificación de seguridad falló. Intenta iniciar sesión de nuevo.",
                    ),
                )
                .await?;
            Ok(Redirect::to("/").into_response())
        }
        Err(AppError::Authentication(reason)) => {
            tracing::error!("authentication failed: {}", reason);
            state
                .sessions
                .push_flash(
                    &session.id,
                    Flash::error("Error en la autenticación con Google."),
                )
                .await?;
            Ok(Redirect::to("/").into_response())
        }
        Err(AppError::Configuration(reason)) => {
            tracing::error!("authorization unavailable: {}", reason);
            state
                .sessions
                .push_flash(
                    &session.id,
                    Flash::error("La integración con YouTube no está configurada."),
                )
                .await?;
            Ok(Redirect::to("/login/").into_response())
        }
        Err(other) => Err(other),
    }
}
