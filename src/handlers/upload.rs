// src/handlers/upload.rs
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Router,
};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::catalog;
use crate::error::AppError;
use crate::models::video::{Privacy, VideoCategory};
use crate::services::uploader::{self, TempUpload, UploadRequest};
use crate::session::{Flash, Session};
use crate::AppState;

use super::pages::base_page;

/// Where temporary upload files land before they are streamed out.
pub const UPLOAD_DIR: &str = "uploads";

/// Multipart bodies beyond this are rejected by the extractor.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

pub fn upload_routes() -> Router {
    Router::new()
        .route("/subir/", get(subir_form).post(subir_submit))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

// ============ Route handlers ============

/// Upload form. Requires a signed-in visitor whose session carries
/// refresh-capable credentials; anyone else is routed to authorization
/// first.
async fn subir_form(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    if !session.is_authenticated() {
        return Ok(Redirect::to("/login/").into_response());
    }
    if !has_refreshable_credentials(&session) {
        state
            .sessions
            .push_flash(
                &session.id,
                Flash::info("Primero autoriza el acceso a tu cuenta de YouTube."),
            )
            .await?;
        return Ok(Redirect::to("/autorizar/").into_response());
    }

    let flashes = state.sessions.take_flash(&session.id).await?;
    Ok(base_page("Subir video", &session, &flashes, &render_upload_form()).into_response())
}

/// Receives the multipart form, parks the file under `uploads/` and runs the
/// upload workflow. Whatever happens, the temporary file is discarded; the
/// failure class decides where the visitor lands next.
async fn subir_submit(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let Some(user_id) = session.user_id else {
        return Ok(Redirect::to("/login/").into_response());
    };
    let Some(bundle) = session.credentials.clone() else {
        state
            .sessions
            .push_flash(
                &session.id,
                Flash::info("Primero autoriza el acceso a tu cuenta de YouTube."),
            )
            .await?;
        return Ok(Redirect::to("/autorizar/").into_response());
    };

    let form = read_upload_form(&mut multipart, user_id).await?;

    let Some(temp) = form.temp else {
        state
            .sessions
            .push_flash(&session.id, Flash::error("Selecciona un archivo de video."))
            .await?;
        return Ok(Redirect::to("/subir/").into_response());
    };
    if form.title.is_empty() {
        temp.cleanup().await;
        state
            .sessions
            .push_flash(&session.id, Flash::error("El título es obligatorio."))
            .await?;
        return Ok(Redirect::to("/subir/").into_response());
    }

    let request = UploadRequest {
        title: form.title,
        description: form.description,
        category: form.category,
        privacy: form.privacy,
    };

    let result =
        uploader::upload_and_discard(&state.youtube, &bundle, temp, &request, user_id).await;

    match result {
        Ok(outcome) => {
            if let Some(renewed) = outcome.refreshed_bundle.as_ref() {
                state.sessions.set_credentials(&session.id, renewed).await?;
            }
            let video = catalog::insert_video(&state.db_pool, &outcome.record).await?;
            state
                .sessions
                .push_flash(
                    &session.id,
                    Flash::success(format!("¡Video \"{}\" subido a YouTube!", video.title)),
                )
                .await?;
            Ok(Redirect::to("/mis-videos/").into_response())
        }
        Err(err) if err.is_credential_failure() => {
            tracing::warn!("upload credentials rejected: {}", err);
            state.sessions.clear_credentials(&session.id).await?;
            state
                .sessions
                .push_flash(
                    &session.id,
                    Flash::error("Tu autorización expiró. Conecta tu cuenta de nuevo."),
                )
                .await?;
            Ok(Redirect::to("/autorizar/").into_response())
        }
        Err(err) => {
            tracing::error!("upload failed: {}", err);
            state
                .sessions
                .push_flash(
                    &session.id,
                    Flash::error("No se pudo subir el video. Inténtalo de nuevo."),
                )
                .await?;
            Ok(Redirect::to("/subir/").into_response())
        }
    }
}

fn has_refreshable_credentials(session: &Session) -> bool {
    session
        .credentials
        .as_ref()
        .map(|bundle| bundle.has_refresh_token())
        .unwrap_or(false)
}

// ============ Multipart parsing ============

struct UploadForm {
    temp: Option<TempUpload>,
    title: String,
    description: String,
    category: VideoCategory,
    privacy: Privacy,
}

/// Walks the multipart fields, streaming the video part to disk and picking
/// the text parts into the form. Unknown fields are skipped.
async fn read_upload_form(multipart: &mut Multipart, user_id: i32) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        temp: None,
        title: String::new(),
        description: String::new(),
        category: VideoCategory::Otro,
        privacy: Privacy::Private,
    };

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Upload(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "archivo" => {
                let original = field.file_name().unwrap_or("").to_string();
                // An untouched file input still submits a nameless part.
                if original.is_empty() {
                    continue;
                }
                let temp = TempUpload::new(temp_path(user_id, &original));
                let mut file = File::create(temp.path()).await?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::Upload(format!("upload stream failed: {}", e)))?
                {
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                form.temp = Some(temp);
            }
            "titulo" => form.title = field_text(field).await?,
            "descripcion" => form.description = field_text(field).await?,
            "categoria" => {
                form.category = VideoCategory::from_slug(&field_text(field).await?)
                    .unwrap_or(VideoCategory::Otro)
            }
            "privacidad" => form.privacy = Privacy::from_form(&field_text(field).await?),
            _ => {}
        }
    }

    form.title = form.title.trim().to_string();
    form.description = form.description.trim().to_string();
    Ok(form)
}

async fn field_text(field: Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Upload(format!("invalid form field: {}", e)))
}

fn temp_path(user_id: i32, original_name: &str) -> PathBuf {
    PathBuf::from(UPLOAD_DIR).join(format!(
        "temp_{}_{}.{}",
        user_id,
        Uuid::new_v4(),
        file_extension(original_name)
    ))
}

/// Extension taken from the submitted filename, kept only when it looks like
/// a plain ASCII suffix.
fn file_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

// ============ Rendering ============

fn render_upload_form() -> String {
    let categories: String = VideoCategory::ALL
        .iter()
        .map(|c| format!(r#"<option value="{}">{}</option>"#, c.slug(), c.label()))
        .collect();

    format!(
        r#"<h1>Subir video</h1>
<form class="upload" method="post" action="/subir/" enctype="multipart/form-data">
<label for="archivo">Archivo de video</label>
<input type="file" id="archivo" name="archivo" accept="video/*" required>
<label for="titulo">Título</label>
<input type="text" id="titulo" name="titulo" maxlength="300" required>
<label for="descripcion">Descripción</label>
<textarea id="descripcion" name="descripcion" rows="4"></textarea>
<label for="categoria">Categoría</label>
<select id="categoria" name="categoria">{categories}</select>
<label for="privacidad">Privacidad</label>
<select id="privacidad" name="privacidad">
<option value="private">Privado</option>
<option value="unlisted">No listado</option>
<option value="public">Público</option>
</select>
<button type="submit" class="button">Subir a YouTube</button>
</form>"#,
        categories = categories
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_extension_keeps_plain_suffixes() {
        assert_eq!(file_extension("clase.mp4"), "mp4");
        assert_eq!(file_extension("CLASE.MOV"), "mov");
        assert_eq!(file_extension("archivo.tar.gz"), "gz");
    }

    #[test]
    fn test_file_extension_falls_back_on_odd_names() {
        assert_eq!(file_extension("sin_extension"), "bin");
        assert_eq!(file_extension("raro.<script>"), "bin");
        assert_eq!(file_extension("larguisima.extensiondemasiadolarga"), "bin");
        assert_eq!(file_extension(""), "bin");
    }

    #[test]
    fn test_temp_path_is_scoped_to_user_and_unique() {
        let a = temp_path(7, "clase.mp4");
        let b = temp_path(7, "clase.mp4");

        let a_name = a.file_name().unwrap().to_str().unwrap();
        assert!(a.starts_with(UPLOAD_DIR));
        assert!(a_name.starts_with("temp_7_"));
        assert!(a_name.ends_with(".mp4"));
        assert_ne!(a, b);
    }
}
