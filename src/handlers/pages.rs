// src/handlers/pages.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;

use crate::catalog::{self, VideoFilter};
use crate::error::AppError;
use crate::models::video::{Page, Video, VideoCategory, VideoTotals};
use crate::session::{Flash, FlashLevel, Session};
use crate::AppState;

pub fn pages_routes() -> Router {
    Router::new()
        .route("/", get(inicio))
        .route("/mis-videos/", get(mis_videos))
        .route("/video/:id/", get(detalle))
        .route("/login/", get(login))
        .route("/logout/", post(logout))
}

// ============ Route handlers ============

/// Public home page: the whole catalog, newest first, with aggregate
/// counters in the header.
async fn inicio(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Html<String>, AppError> {
    let videos = catalog::all_videos(&state.db_pool).await?;
    let totals = catalog::catalog_totals(&state.db_pool).await?;
    let flashes = state.sessions.take_flash(&session.id).await?;

    let cards = if videos.is_empty() {
        r#"<p class="empty">Todavía no hay videos en el catálogo.</p>"#.to_string()
    } else {
        videos.iter().map(render_video_card).collect()
    };

    let body = format!(
        "<h1>Videoteca</h1>\n{}\n<div class=\"grid\">{}</div>",
        render_totals(&totals),
        cards
    );

    Ok(base_page("Videoteca", &session, &flashes, &body))
}

#[derive(Debug, Default, Deserialize)]
struct CatalogQuery {
    buscar: Option<String>,
    categoria: Option<String>,
    page: Option<String>,
}

/// The owner's slice of the catalog with title search, category filter and
/// pagination. Anonymous visitors are sent to the login page.
async fn mis_videos(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<CatalogQuery>,
) -> Result<Response, AppError> {
    let Some(user_id) = session.user_id else {
        return Ok(Redirect::to("/login/").into_response());
    };

    let buscar = clean_param(query.buscar);
    let categoria = clean_param(query.categoria);
    // Non-numeric page values fall back to the first page; out-of-range
    // numbers are clamped by the catalog layer.
    let requested_page = query
        .page
        .as_deref()
        .and_then(|p| p.parse::<i64>().ok())
        .unwrap_or(1);

    let filter = VideoFilter {
        owner_id: user_id,
        search: buscar.clone(),
        category: categoria.clone(),
    };
    let (page, totals) = catalog::videos_for_user(&state.db_pool, &filter, requested_page).await?;
    let flashes = state.sessions.take_flash(&session.id).await?;

    let cards = if page.items.is_empty() {
        r#"<p class="empty">No se encontraron videos.</p>"#.to_string()
    } else {
        page.items.iter().map(render_video_card).collect()
    };

    let body = format!(
        "<h1>Mis videos</h1>\n{}\n{}\n<div class=\"grid\">{}</div>\n{}",
        render_totals(&totals),
        render_filter_form(buscar.as_deref(), categoria.as_deref()),
        cards,
        render_pager(&page, buscar.as_deref(), categoria.as_deref())
    );

    Ok(base_page("Mis videos", &session, &flashes, &body).into_response())
}

/// Detail page for one catalog entry. Unknown and non-numeric ids both land
/// on the not-found page.
async fn detalle(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(raw_id): Path<String>,
) -> Result<Html<String>, AppError> {
    let id = raw_id.parse::<i32>().map_err(|_| AppError::NotFound)?;
    let video = catalog::video_by_id(&state.db_pool, id)
        .await?
        .ok_or(AppError::NotFound)?;
    let flashes = state.sessions.take_flash(&session.id).await?;

    let tags = video.tag_list();
    let tags_html = if tags.is_empty() {
        String::new()
    } else {
        let chips: String = tags
            .iter()
            .map(|tag| format!(r#"<span class="tag">{}</span>"#, escape_html(tag)))
            .collect();
        format!(r#"<p class="tags">{}</p>"#, chips)
    };

    let body = format!(
        r#"<h1>{title}</h1>
<div class="player"><iframe src="{embed}" title="{title}" allowfullscreen></iframe></div>
<p class="meta">{channel} &middot; {date} &middot; {category}</p>
<ul class="totals">
<li><strong>{views}</strong> vistas</li>
<li><strong>{likes}</strong> me gusta</li>
<li><strong>{comments}</strong> comentarios</li>
<li>Duración: <strong>{duration}</strong></li>
</ul>
<p class="description">{description}</p>
{tags}
<p><a href="/mis-videos/">&larr; Volver a mis videos</a></p>"#,
        title = escape_html(&video.title),
        embed = escape_html(&video.embed_url()),
        channel = escape_html(&video.channel_title),
        date = video.published_at.format("%d/%m/%Y"),
        category = escape_html(&category_label(&video.category)),
        views = video.view_count,
        likes = video.like_count,
        comments = video.comment_count,
        duration = format_duration(video.duration_seconds),
        description = escape_html(&video.description).replace('\n', "<br>"),
        tags = tags_html,
    );

    Ok(base_page(&video.title, &session, &flashes, &body))
}

/// Login page; an already authenticated visitor goes straight to their
/// catalog.
async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    if session.is_authenticated() {
        return Ok(Redirect::to("/mis-videos/").into_response());
    }
    let flashes = state.sessions.take_flash(&session.id).await?;

    let body = r#"<h1>Iniciar sesión</h1>
<p>Conecta tu cuenta de Google para administrar tu videoteca y subir videos a YouTube.</p>
<p><a class="button" href="/autorizar/">Continuar con Google</a></p>"#;

    Ok(base_page("Iniciar sesión", &session, &flashes, body).into_response())
}

async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Redirect, AppError> {
    state.sessions.logout(&session.id).await?;
    state
        .sessions
        .push_flash(&session.id, Flash::info("Sesión cerrada."))
        .await?;
    Ok(Redirect::to("/"))
}

// ============ Page rendering ============

const STYLE: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
       color: #1f2933; background: #f5f7fa; line-height: 1.5; }
header { background: #102a43; }
nav { max-width: 960px; margin: 0 auto; padding: 0.8rem 1rem;
      display: flex; justify-content: space-between; align-items: center; }
nav .logo { color: #fff; font-weight: 700; font-size: 1.2rem; text-decoration: none; }
nav .links { display: flex; gap: 1rem; align-items: center; }
nav .links a { color: #d9e2ec; text-decoration: none; }
nav .links a:hover { color: #fff; }
nav form { display: inline; }
nav button { background: none; border: none; color: #d9e2ec; cursor: pointer; font: inherit; }
main { max-width: 960px; margin: 1.5rem auto; padding: 0 1rem; }
h1 { margin-bottom: 1rem; }
.flash { padding: 0.6rem 1rem; border-radius: 6px; margin-bottom: 0.8rem; }
.flash-success { background: #e3f9e5; color: #207227; }
.flash-info { background: #e1f0ff; color: #1c4f82; }
.flash-error { background: #ffe3e3; color: #a61b1b; }
.totals { list-style: none; display: flex; gap: 1.5rem; margin-bottom: 1rem; flex-wrap: wrap; }
.filters { display: flex; gap: 0.5rem; margin-bottom: 1.2rem; flex-wrap: wrap; }
.filters input, .filters select { padding: 0.4rem 0.6rem; border: 1px solid #bcccdc; border-radius: 6px; }
.filters button, .button { background: #2b6cb0; color: #fff; border: none; padding: 0.45rem 1rem;
                           border-radius: 6px; cursor: pointer; text-decoration: none; display: inline-block; }
.grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(260px, 1fr)); gap: 1rem; }
.card { background: #fff; border-radius: 8px; overflow: hidden; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
.card img { width: 100%; display: block; }
.card h2 { font-size: 1rem; margin: 0.5rem 0.8rem 0.2rem; }
.card p { margin: 0 0.8rem 0.5rem; color: #52606d; font-size: 0.85rem; }
.card a { color: inherit; text-decoration: none; }
.player iframe { width: 100%; aspect-ratio: 16 / 9; border: 0; border-radius: 8px; margin-bottom: 1rem; }
.meta { color: #52606d; margin-bottom: 0.8rem; }
.description { margin: 1rem 0; white-space: normal; }
.tags .tag { display: inline-block; background: #d9e2ec; border-radius: 12px;
             padding: 0.15rem 0.7rem; margin-right: 0.4rem; font-size: 0.8rem; }
.pager { display: flex; gap: 1rem; margin: 1.5rem 0; align-items: center; }
.empty { color: #52606d; padding: 1rem 0; }
form.upload label { display: block; margin: 0.8rem 0 0.2rem; font-weight: 600; }
form.upload input[type=text], form.upload textarea, form.upload select {
  width: 100%; max-width: 480px; padding: 0.4rem 0.6rem; border: 1px solid #bcccdc; border-radius: 6px; }
form.upload button { margin-top: 1rem; }
"#;

/// Shared layout: nav bar keyed to authentication state, pending flash
/// messages, then the page body.
pub(crate) fn base_page(
    title: &str,
    session: &Session,
    flashes: &[Flash],
    body: &str,
) -> Html<String> {
    let nav = if session.is_authenticated() {
        concat!(
            r#"<a href="/">Inicio</a>"#,
            r#"<a href="/mis-videos/">Mis videos</a>"#,
            r#"<a href="/subir/">Subir video</a>"#,
            r#"<form method="post" action="/logout/"><button type="submit">Cerrar sesión</button></form>"#,
        )
    } else {
        concat!(
            r#"<a href="/">Inicio</a>"#,
            r#"<a href="/login/">Iniciar sesión</a>"#,
        )
    };

    let flash_html: String = flashes.iter().map(render_flash).collect();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} &middot; Videoteca</title>
<style>{style}</style>
</head>
<body>
<header><nav><a class="logo" href="/">Videoteca</a><div class="links">{nav}</div></nav></header>
<main>
{flashes}
{body}
</main>
</body>
</html>"#,
        title = escape_html(title),
        style = STYLE,
        nav = nav,
        flashes = flash_html,
        body = body,
    ))
}

fn render_flash(flash: &Flash) -> String {
    let class = match flash.level {
        FlashLevel::Success => "flash flash-success",
        FlashLevel::Info => "flash flash-info",
        FlashLevel::Error => "flash flash-error",
    };
    format!(
        r#"<div class="{}">{}</div>"#,
        class,
        escape_html(&flash.text)
    )
}

fn render_totals(totals: &VideoTotals) -> String {
    format!(
        r#"<ul class="totals">
<li><strong>{}</strong> videos</li>
<li><strong>{}</strong> vistas</li>
<li><strong>{}</strong> me gusta</li>
<li><strong>{}</strong> comentarios</li>
</ul>"#,
        totals.videos, totals.views, totals.likes, totals.comments
    )
}

fn render_video_card(video: &Video) -> String {
    let thumb = if video.thumbnail_url.is_empty() {
        String::new()
    } else {
        format!(
            r#"<img src="{}" alt="" loading="lazy">"#,
            escape_html(&video.thumbnail_url)
        )
    };
    format!(
        r#"<article class="card">
<a href="/video/{id}/">{thumb}
<h2>{title}</h2></a>
<p>{channel} &middot; {date}</p>
<p>{views} vistas &middot; {duration}</p>
</article>"#,
        id = video.id,
        thumb = thumb,
        title = escape_html(&video.title),
        channel = escape_html(&video.channel_title),
        date = video.published_at.format("%d/%m/%Y"),
        views = video.view_count,
        duration = format_duration(video.duration_seconds),
    )
}

fn render_filter_form(buscar: Option<&str>, categoria: Option<&str>) -> String {
    let options: String = VideoCategory::ALL
        .iter()
        .map(|c| {
            let selected = if Some(c.slug()) == categoria {
                " selected"
            } else {
                ""
            };
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                c.slug(),
                selected,
                c.label()
            )
        })
        .collect();

    format!(
        r#"<form class="filters" method="get" action="/mis-videos/">
<input type="text" name="buscar" placeholder="Buscar por título" value="{}">
<select name="categoria">
<option value="">Todas las categorías</option>
{}
</select>
<button type="submit">Filtrar</button>
</form>"#,
        escape_html(buscar.unwrap_or("")),
        options
    )
}

fn render_pager(page: &Page<Video>, buscar: Option<&str>, categoria: Option<&str>) -> String {
    if page.total_pages <= 1 {
        return String::new();
    }

    let mut parts = Vec::new();
    if page.has_previous() {
        parts.push(format!(
            r#"<a href="{}">&laquo; Anterior</a>"#,
            page_href(page.number - 1, buscar, categoria)
        ));
    }
    parts.push(format!(
        "<span>Página {} de {}</span>",
        page.number, page.total_pages
    ));
    if page.has_next() {
        parts.push(format!(
            r#"<a href="{}">Siguiente &raquo;</a>"#,
            page_href(page.number + 1, buscar, categoria)
        ));
    }

    format!(r#"<nav class="pager">{}</nav>"#, parts.join(" "))
}

/// Builds a my-videos link that keeps the active filters.
fn page_href(page: i64, buscar: Option<&str>, categoria: Option<&str>) -> String {
    let mut href = format!("/mis-videos/?page={}", page);
    if let Some(term) = buscar {
        href.push_str("&buscar=");
        href.push_str(&urlencoding::encode(term));
    }
    if let Some(slug) = categoria {
        href.push_str("&categoria=");
        href.push_str(&urlencoding::encode(slug));
    }
    href
}

fn category_label(slug: &str) -> String {
    VideoCategory::from_slug(slug)
        .map(|c| c.label().to_string())
        .unwrap_or_else(|| slug.to_string())
}

// ============ Text helpers ============

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn format_duration(seconds: i32) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

fn clean_param(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
