// src/models/video.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A cataloged YouTube video. Rows are created by a successful upload or by
/// the channel import tool and afterwards only touched by statistics jobs.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Video {
    pub id: i32,
    pub youtube_id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub channel_id: String,
    pub channel_title: String,
    pub duration: String,
    pub duration_seconds: i32,
    pub published_at: DateTime<Utc>,
    pub view_count: i64,
    pub like_count: i32,
    pub comment_count: i32,
    pub category: String,
    pub tags: String,
    pub added_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// Embeddable player URL for the detail page.
    pub fn embed_url(&self) -> String {
        format!("https://www.youtube.com/embed/{}", self.youtube_id)
    }

    /// Tags split back out of their comma-joined storage form.
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .split(',')
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    }
}

/// Insert payload for a new catalog row.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub youtube_id: String,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub channel_id: String,
    pub channel_title: String,
    pub duration: String,
    pub duration_seconds: i32,
    pub published_at: DateTime<Utc>,
    pub view_count: i64,
    pub like_count: i32,
    pub comment_count: i32,
    pub category: String,
    pub tags: String,
    pub added_by: Option<i32>,
}

/// Closed local category enumeration. The slug is what gets stored and
/// filtered on; the YouTube category id is derived from it at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCategory {
    Programacion,
    BasesDatos,
    Redes,
    Seguridad,
    Otro,
}

impl VideoCategory {
    pub const ALL: [VideoCategory; 5] = [
        VideoCategory::Programacion,
        VideoCategory::BasesDatos,
        VideoCategory::Redes,
        VideoCategory::Seguridad,
        VideoCategory::Otro,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            VideoCategory::Programacion => "programacion",
            VideoCategory::BasesDatos => "bases_datos",
            VideoCategory::Redes => "redes",
            VideoCategory::Seguridad => "seguridad",
            VideoCategory::Otro => "otro",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VideoCategory::Programacion => "Programación",
            VideoCategory::BasesDatos => "Bases de Datos",
            VideoCategory::Redes => "Redes",
            VideoCategory::Seguridad => "Seguridad",
            VideoCategory::Otro => "Otro",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.slug() == slug)
    }

    /// YouTube Data API `categoryId` submitted with an upload.
    pub fn youtube_category_id(&self) -> &'static str {
        match self {
            // 28 = Science & Technology, 27 = Education, 22 = People & Blogs
            VideoCategory::Programacion => "28",
            VideoCategory::BasesDatos => "27",
            VideoCategory::Redes => "28",
            VideoCategory::Seguridad => "28",
            VideoCategory::Otro => "22",
        }
    }
}

/// Upload privacy status; YouTube defaults new uploads to private here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Privacy {
    #[default]
    Private,
    Public,
    Unlisted,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Private => "private",
            Privacy::Public => "public",
            Privacy::Unlisted => "unlisted",
        }
    }

    /// Lenient form parsing: anything unrecognized stays private.
    pub fn from_form(value: &str) -> Self {
        match value {
            "public" => Privacy::Public,
            "unlisted" => Privacy::Unlisted,
            _ => Privacy::Private,
        }
    }
}

/// Sum aggregation over a filtered set of videos.
#[derive(Debug, Default, Clone, Copy)]
pub struct VideoTotals {
    pub videos: i64,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

/// One page of a fixed-size paginated listing.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: i64,
    pub total_pages: i64,
    pub total_items: i64,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}
