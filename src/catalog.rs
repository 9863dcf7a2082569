// src/catalog.rs
//
// Catalog store operations. Plain queries over the videos table; pagination
// is fixed-size and aggregate sums always come back as BIGINT so empty sets
// read as zeros.

use sqlx::{PgPool, Row};

use crate::models::video::{NewVideo, Page, Video, VideoTotals};

pub const PAGE_SIZE: i64 = 10;

/// Owner-scoped listing filter for the my-videos page.
#[derive(Debug, Clone, Default)]
pub struct VideoFilter {
    pub owner_id: i32,
    /// Case-insensitive title substring.
    pub search: Option<String>,
    /// Exact category slug; an unknown slug simply matches nothing.
    pub category: Option<String>,
}

/// Inserts an upload-produced record. A duplicate external id is a hard
/// error here because YouTube assigns a fresh id per upload.
pub async fn insert_video(pool: &PgPool, video: &NewVideo) -> Result<Video, sqlx::Error> {
    sqlx::query_as::<_, Video>(
        r#"
        INSERT INTO videos (
            youtube_id, title, description, video_url, thumbnail_url,
            channel_id, channel_title, duration, duration_seconds,
            published_at, view_count, like_count, comment_count,
            category, tags, added_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING *
        "#,
    )
    .bind(&video.youtube_id)
    .bind(&video.title)
    .bind(&video.description)
    .bind(&video.video_url)
    .bind(&video.thumbnail_url)
    .bind(&video.channel_id)
    .bind(&video.channel_title)
    .bind(&video.duration)
    .bind(video.duration_seconds)
    .bind(video.published_at)
    .bind(video.view_count)
    .bind(video.like_count)
    .bind(video.comment_count)
    .bind(&video.category)
    .bind(&video.tags)
    .bind(video.added_by)
    .fetch_one(pool)
    .await
}

/// Insert used by the channel import tool: an already-cataloged external id
/// is skipped, not an error.
pub async fn insert_video_if_new(
    pool: &PgPool,
    video: &NewVideo,
) -> Result<Option<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>(
        r#"
        INSERT INTO videos (
            youtube_id, title, description, video_url, thumbnail_url,
            channel_id, channel_title, duration, duration_seconds,
            published_at, view_count, like_count, comment_count,
            category, tags, added_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (youtube_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(&video.youtube_id)
    .bind(&video.title)
    .bind(&video.description)
    .bind(&video.video_url)
    .bind(&video.thumbnail_url)
    .bind(&video.channel_id)
    .bind(&video.channel_title)
    .bind(&video.duration)
    .bind(video.duration_seconds)
    .bind(video.published_at)
    .bind(video.view_count)
    .bind(video.like_count)
    .bind(video.comment_count)
    .bind(&video.category)
    .bind(&video.tags)
    .bind(video.added_by)
    .fetch_optional(pool)
    .await
}

/// Whole catalog, newest publication first. The home page shows everything.
pub async fn all_videos(pool: &PgPool) -> Result<Vec<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>("SELECT * FROM videos ORDER BY published_at DESC")
        .fetch_all(pool)
        .await
}

/// Catalog-wide counters for the home page header.
pub async fn catalog_totals(pool: &PgPool) -> Result<VideoTotals, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS videos,
               COALESCE(SUM(view_count), 0)::BIGINT AS views,
               COALESCE(SUM(like_count), 0)::BIGINT AS likes,
               COALESCE(SUM(comment_count), 0)::BIGINT AS comments
        FROM videos
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(VideoTotals {
        videos: row.try_get("videos")?,
        views: row.try_get("views")?,
        likes: row.try_get("likes")?,
        comments: row.try_get("comments")?,
    })
}

/// One filtered, paginated page of the owner's videos plus sum aggregation
/// over the whole filtered set (not just the page).
pub async fn videos_for_user(
    pool: &PgPool,
    filter: &VideoFilter,
    requested_page: i64,
) -> Result<(Page<Video>, VideoTotals), sqlx::Error> {
    let search = filter.search.as_deref().map(escape_like);
    let category = filter.category.as_deref();

    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS videos,
               COALESCE(SUM(view_count), 0)::BIGINT AS views,
               COALESCE(SUM(like_count), 0)::BIGINT AS likes,
               COALESCE(SUM(comment_count), 0)::BIGINT AS comments
        FROM videos
        WHERE added_by = $1
          AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%')
          AND ($3::text IS NULL OR category = $3)
        "#,
    )
    .bind(filter.owner_id)
    .bind(search.as_deref())
    .bind(category)
    .fetch_one(pool)
    .await?;

    let totals = VideoTotals {
        videos: row.try_get("videos")?,
        views: row.try_get("views")?,
        likes: row.try_get("likes")?,
        comments: row.try_get("comments")?,
    };

    let (page_number, total_pages, offset) = page_bounds(totals.videos, requested_page);

    let items = sqlx::query_as::<_, Video>(
        r#"
        SELECT * FROM videos
        WHERE added_by = $1
          AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%')
          AND ($3::text IS NULL OR category = $3)
        ORDER BY published_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(filter.owner_id)
    .bind(search.as_deref())
    .bind(category)
    .bind(PAGE_SIZE)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok((
        Page {
            items,
            number: page_number,
            total_pages,
            total_items: totals.videos,
        },
        totals,
    ))
}

pub async fn video_by_id(pool: &PgPool, id: i32) -> Result<Option<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Clamps a requested page into range: anything below 1 goes to the first
/// page, anything past the end goes to the last page, and an empty set
/// still has one (empty) page.
fn page_bounds(total_items: i64, requested_page: i64) -> (i64, i64, i64) {
    let total_pages = if total_items == 0 {
        1
    } else {
        (total_items + PAGE_SIZE - 1) / PAGE_SIZE
    };
    let page = requested_page.clamp(1, total_pages);
    (page, total_pages, (page - 1) * PAGE_SIZE)
}

/// Escapes LIKE wildcards in a user-supplied search term so they match
/// literally.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds_clamps_into_range() {
        // 25 items over 3 pages
        assert_eq!(page_bounds(25, 1), (1, 3, 0));
        assert_eq!(page_bounds(25, 2), (2, 3, 10));
        assert_eq!(page_bounds(25, 3), (3, 3, 20));
        // Past the end lands on the last page
        assert_eq!(page_bounds(25, 99), (3, 3, 20));
        // Below the start lands on the first page
        assert_eq!(page_bounds(25, 0), (1, 3, 0));
        assert_eq!(page_bounds(25, -4), (1, 3, 0));
    }

    #[test]
    fn test_page_bounds_empty_set_has_one_page() {
        assert_eq!(page_bounds(0, 1), (1, 1, 0));
        assert_eq!(page_bounds(0, 7), (1, 1, 0));
    }

    #[test]
    fn test_page_bounds_exact_multiple() {
        assert_eq!(page_bounds(20, 2), (2, 2, 10));
        assert_eq!(page_bounds(20, 3), (2, 2, 10));
    }

    #[test]
    fn test_escape_like_makes_wildcards_literal() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like(r"back\slash"), r"back\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }
}
