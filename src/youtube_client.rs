// YouTube Data API v3 client: metadata reads, OAuth token endpoints and
// resumable uploads
// Docs: https://developers.google.com/youtube/v3

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::models::auth::TokenBundle;
use crate::models::video::{NewVideo, VideoCategory};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Token endpoint recorded into every bundle; refreshes go wherever the
/// bundle points, not to a hardcoded URL.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Hard API limit for `search.list` page sizes.
pub const MAX_SEARCH_RESULTS: u32 = 50;

// Region bias the catalog has always searched with.
const SEARCH_REGION: &str = "HN";

/// Scopes requested on every authorization. Forced re-consent at the
/// authorization URL guarantees a refresh token even for returning users.
pub const OAUTH_SCOPES: [&str; 5] = [
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube.readonly",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "openid",
];

#[derive(Debug, Error)]
pub enum YouTubeError {
    #[error("YouTube API key is not configured")]
    MissingApiKey,

    #[error("YouTube API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("token refresh rejected ({status}): {message}")]
    TokenRefresh { status: u16, message: String },

    #[error("upload session response carried no Location header")]
    MissingSessionUrl,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl YouTubeError {
    /// Token problems force re-authorization upstream; everything else is an
    /// ordinary API failure. Callers branch on this instead of inspecting
    /// message text.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, YouTubeError::TokenRefresh { .. })
    }
}

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    api_key: Option<String>,
}

// ============================================================================
// Normalized records
// ============================================================================

/// Provider response flattened into one defensive record: the duration kept
/// verbatim and parsed to seconds, timestamps as UTC instants, tags joined
/// with commas, missing statistics defaulted to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedVideo {
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
    pub tags: String,
}

impl NormalizedVideo {
    /// Catalog insert payload for rows that do not come from an upload.
    pub fn into_new_video(self, category: VideoCategory, added_by: Option<i32>) -> NewVideo {
        NewVideo {
            youtube_id: self.youtube_id,
            title: self.title,
            description: self.description,
            video_url: self.video_url,
            thumbnail_url: self.thumbnail_url,
            channel_id: self.channel_id,
            channel_title: self.channel_title,
            duration: self.duration,
            duration_seconds: self.duration_seconds,
            published_at: self.published_at,
            view_count: self.view_count,
            like_count: self.like_count,
            comment_count: self.comment_count,
            category: category.slug().to_string(),
            tags: self.tags,
            added_by,
        }
    }
}

// ============================================================================
// Wire structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Option<VideoSnippet>,
    #[serde(rename = "contentDetails")]
    content_details: Option<ContentDetails>,
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "channelId", default)]
    channel_id: String,
    #[serde(rename = "channelTitle", default)]
    channel_title: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    thumbnails: Option<Thumbnails>,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoStatistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "likeCount")]
    like_count: Option<String>,
    #[serde(rename = "commentCount")]
    comment_count: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Thumbnails {
    pub default: Option<ThumbnailInfo>,
    pub medium: Option<ThumbnailInfo>,
    pub high: Option<ThumbnailInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThumbnailInfo {
    pub url: String,
}

impl Thumbnails {
    /// Best thumbnail for catalog listings.
    pub fn preferred(&self) -> Option<&str> {
        self.high
            .as_ref()
            .or(self.medium.as_ref())
            .or(self.default.as_ref())
            .map(|t| t.url.as_str())
    }

    /// Upload mapping rule: the high-resolution URL, or the
    /// default-resolution one when high is absent.
    pub fn high_or_default(&self) -> Option<&str> {
        self.high
            .as_ref()
            .or(self.default.as_ref())
            .map(|t| t.url.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
}

/// Metadata submitted when a resumable upload session is opened.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub privacy_status: String,
}

/// Result of one chunk submission.
#[derive(Debug)]
pub enum ChunkOutcome {
    /// HTTP 308: chunk accepted, the session expects more bytes.
    Incomplete,
    /// Final chunk: the platform returned the finished resource.
    Complete(UploadedResource),
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedResource {
    pub id: String,
    #[serde(default)]
    pub snippet: UploadedSnippet,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadedSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "channelId", default)]
    pub channel_id: String,
    #[serde(rename = "channelTitle", default)]
    pub channel_title: String,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
    pub thumbnails: Option<Thumbnails>,
}

// ============================================================================
// Metadata API (search and detail reads)
// ============================================================================

/// Raw read operations plus the two-phase orchestration built on them. The
/// split lets the orchestration run against a test double without network
/// access.
#[async_trait]
pub trait MetadataApi {
    /// Phase one of a search: candidate video ids only.
    async fn search_ids(
        &self,
        query: &str,
        max_results: u32,
        order: &str,
    ) -> Result<Vec<String>, YouTubeError>;

    /// Phase one of a channel listing: newest-first video ids.
    async fn channel_video_ids(
        &self,
        channel_id: &str,
        max_results: u32,
    ) -> Result<Vec<String>, YouTubeError>;

    /// Batched detail fetch for exactly the given ids.
    async fn videos_by_ids(&self, ids: &[String]) -> Result<Vec<NormalizedVideo>, YouTubeError>;

    /// Two-phase search: a lightweight id query, then one batched detail
    /// fetch. An empty candidate list short-circuits without issuing the
    /// second call, and results keep the phase-one order.
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        order: &str,
    ) -> Result<Vec<NormalizedVideo>, YouTubeError> {
        let max_results = clamp_max_results(max_results);
        let mut ids = self.search_ids(query, max_results, order).await?;
        ids.truncate(max_results as usize);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let videos = self.videos_by_ids(&ids).await?;
        Ok(order_by_ids(videos, &ids))
    }

    /// Same two-phase shape for a channel's recent videos.
    async fn channel_videos(
        &self,
        channel_id: &str,
        max_results: u32,
    ) -> Result<Vec<NormalizedVideo>, YouTubeError> {
        let max_results = clamp_max_results(max_results);
        let mut ids = self.channel_video_ids(channel_id, max_results).await?;
        ids.truncate(max_results as usize);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let videos = self.videos_by_ids(&ids).await?;
        Ok(order_by_ids(videos, &ids))
    }
}

fn clamp_max_results(requested: u32) -> u32 {
    requested.clamp(1, MAX_SEARCH_RESULTS)
}

/// Re-orders a detail-fetch result to the phase-one id order, dropping
/// anything the platform returned that was never asked for.
fn order_by_ids(mut videos: Vec<NormalizedVideo>, ids: &[String]) -> Vec<NormalizedVideo> {
    let position: std::collections::HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| (id.as_str(), index))
        .collect();
    videos.retain(|video| position.contains_key(video.youtube_id.as_str()));
    videos.sort_by_key(|video| {
        position
            .get(video.youtube_id.as_str())
            .copied()
            .unwrap_or(usize::MAX)
    });
    videos
}

// ============================================================================
// Upload API (token refresh and resumable transfer)
// ============================================================================

/// Token refresh plus resumable transfer operations used by the upload
/// workflow, split out for the same testability reason as `MetadataApi`.
#[async_trait]
pub trait UploadApi {
    /// Silent renewal against the bundle's own token endpoint and client
    /// identity. A rejection is a credential failure, typed as such.
    async fn refresh_access_token(
        &self,
        bundle: &TokenBundle,
    ) -> Result<TokenRefreshResponse, YouTubeError>;

    /// Opens a resumable upload session; returns the session URL from the
    /// `Location` header.
    async fn begin_resumable_session(
        &self,
        access_token: &str,
        metadata: &UploadMetadata,
        total_bytes: u64,
    ) -> Result<String, YouTubeError>;

    /// Submits one chunk. 308 means the session wants more bytes; the final
    /// chunk yields the finished resource.
    async fn upload_chunk(
        &self,
        session_url: &str,
        chunk: Vec<u8>,
        start_byte: u64,
        end_byte: u64,
        total_bytes: u64,
    ) -> Result<ChunkOutcome, YouTubeError>;
}

// ============================================================================
// YouTube Client Implementation
// ============================================================================

impl YouTubeClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, YouTubeError> {
        self.api_key.as_deref().ok_or(YouTubeError::MissingApiKey)
    }

    /// Exchange an authorization code for the initial token set.
    pub async fn exchange_code_for_token(
        &self,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Result<GoogleTokenResponse, YouTubeError> {
        let params = json!({
            "code": code,
            "client_id": client_id,
            "client_secret": client_secret,
            "redirect_uri": redirect_uri,
            "grant_type": "authorization_code"
        });

        let response = self.client.post(TOKEN_URL).json(&params).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Email and given name of the authenticated account.
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<GoogleUserInfo, YouTubeError> {
        let response = self
            .client
            .get(USERINFO_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MetadataApi for YouTubeClient {
    async fn search_ids(
        &self,
        query: &str,
        max_results: u32,
        order: &str,
    ) -> Result<Vec<String>, YouTubeError> {
        let key = self.api_key()?;
        let max = max_results.to_string();

        let response = self
            .client
            .get(format!("{}/search", API_BASE))
            .query(&[
                ("part", "id"),
                ("q", query),
                ("type", "video"),
                ("maxResults", max.as_str()),
                ("order", order),
                ("regionCode", SEARCH_REGION),
                ("key", key),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;

        let parsed: SearchListResponse = response.json().await?;
        Ok(parsed
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect())
    }

    async fn channel_video_ids(
        &self,
        channel_id: &str,
        max_results: u32,
    ) -> Result<Vec<String>, YouTubeError> {
        let key = self.api_key()?;
        let max = max_results.to_string();

        let response = self
            .client
            .get(format!("{}/search", API_BASE))
            .query(&[
                ("part", "id"),
                ("channelId", channel_id),
                ("type", "video"),
                ("order", "date"),
                ("maxResults", max.as_str()),
                ("key", key),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;

        let parsed: SearchListResponse = response.json().await?;
        Ok(parsed
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect())
    }

    async fn videos_by_ids(&self, ids: &[String]) -> Result<Vec<NormalizedVideo>, YouTubeError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let key = self.api_key()?;
        let id_param = ids.join(",");

        let response = self
            .client
            .get(format!("{}/videos", API_BASE))
            .query(&[
                ("part", "snippet,contentDetails,statistics"),
                ("id", id_param.as_str()),
                ("key", key),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;

        let parsed: VideoListResponse = response.json().await?;
        Ok(parsed.items.into_iter().map(normalize_video).collect())
    }
}

#[async_trait]
impl UploadApi for YouTubeClient {
    async fn refresh_access_token(
        &self,
        bundle: &TokenBundle,
    ) -> Result<TokenRefreshResponse, YouTubeError> {
        let params = json!({
            "client_id": bundle.client_id,
            "client_secret": bundle.client_secret,
            "refresh_token": bundle.refresh_token.as_deref().unwrap_or_default(),
            "grant_type": "refresh_token"
        });

        let response = self
            .client
            .post(&bundle.token_uri)
            .json(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(YouTubeError::TokenRefresh {
                status: status.as_u16(),
                message: extract_api_error(&body),
            });
        }

        Ok(response.json().await?)
    }

    async fn begin_resumable_session(
        &self,
        access_token: &str,
        metadata: &UploadMetadata,
        total_bytes: u64,
    ) -> Result<String, YouTubeError> {
        tracing::info!(
            "initiating resumable upload: {} ({} bytes)",
            metadata.title,
            total_bytes
        );

        let body = json!({
            "snippet": {
                "title": metadata.title,
                "description": metadata.description,
                "categoryId": metadata.category_id,
            },
            "status": {
                "privacyStatus": metadata.privacy_status,
                "selfDeclaredMadeForKids": false,
            }
        });

        let response = self
            .client
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("Authorization", format!("Bearer {}", access_token))
            .header("X-Upload-Content-Length", total_bytes.to_string())
            .header("X-Upload-Content-Type", "video/*")
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let session_url = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
            .ok_or(YouTubeError::MissingSessionUrl)?;

        Ok(session_url)
    }

    async fn upload_chunk(
        &self,
        session_url: &str,
        chunk: Vec<u8>,
        start_byte: u64,
        end_byte: u64,
        total_bytes: u64,
    ) -> Result<ChunkOutcome, YouTubeError> {
        tracing::debug!("uploading chunk: bytes {}-{}/{}", start_byte, end_byte, total_bytes);

        let content_range = format!("bytes {}-{}/{}", start_byte, end_byte, total_bytes);

        let response = self
            .client
            .put(session_url)
            .header(reqwest::header::CONTENT_LENGTH, chunk.len().to_string())
            .header(reqwest::header::CONTENT_RANGE, content_range)
            .header(reqwest::header::CONTENT_TYPE, "video/*")
            .body(chunk)
            .send()
            .await?;

        let status = response.status();

        // 308 Resume Incomplete = chunk stored, more chunks expected
        if status.as_u16() == 308 {
            return Ok(ChunkOutcome::Incomplete);
        }

        if status.is_success() {
            let resource: UploadedResource = response.json().await?;
            tracing::info!("resumable upload complete: {}", resource.id);
            return Ok(ChunkOutcome::Complete(resource));
        }

        let body = response.text().await.unwrap_or_default();
        Err(YouTubeError::Api {
            status: status.as_u16(),
            message: extract_api_error(&body),
        })
    }
}

// ============================================================================
// Google OAuth Helpers
// ============================================================================

/// Builds the Google authorization URL. Offline access plus forced consent
/// makes the provider issue a refresh token on every pass through the flow.
pub fn build_authorization_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    let scope_string = OAUTH_SCOPES.join(" ");

    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&include_granted_scopes=true&state={}",
        AUTH_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scope_string),
        urlencoding::encode(state)
    )
}

// ============================================================================
// Normalization helpers
// ============================================================================

lazy_static! {
    static ref DURATION_RE: Regex =
        Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").unwrap();
}

/// Parses an ISO-8601 duration (`PT15M30S`) to total seconds. Anything the
/// pattern does not cover normalizes to zero rather than failing.
pub fn parse_iso8601_duration(duration: &str) -> i32 {
    let captures = match DURATION_RE.captures(duration.trim()) {
        Some(captures) => captures,
        None => return 0,
    };

    let group = |index: usize| -> i32 {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or(0)
    };

    group(1) * 86_400 + group(2) * 3_600 + group(3) * 60 + group(4)
}

pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn parse_count(raw: Option<&str>) -> i64 {
    raw.and_then(|value| value.parse::<i64>().ok()).unwrap_or(0)
}

fn normalize_video(item: VideoItem) -> NormalizedVideo {
    let snippet = item.snippet.unwrap_or_default();
    let stats = item.statistics.unwrap_or_default();
    let duration = item
        .content_details
        .and_then(|details| details.duration)
        .unwrap_or_default();
    let thumbnail_url = snippet
        .thumbnails
        .as_ref()
        .and_then(|thumbs| thumbs.preferred())
        .unwrap_or_default()
        .to_string();
    let video_url = format!("https://www.youtube.com/watch?v={}", item.id);

    NormalizedVideo {
        youtube_id: item.id,
        title: snippet.title,
        description: snippet.description,
        video_url,
        thumbnail_url,
        channel_id: snippet.channel_id,
        channel_title: snippet.channel_title,
        duration_seconds: parse_iso8601_duration(&duration),
        duration,
        published_at: parse_timestamp(snippet.published_at.as_deref()).unwrap_or_default(),
        view_count: parse_count(stats.view_count.as_deref()),
        like_count: parse_count(stats.like_count.as_deref()).clamp(0, i32::MAX as i64) as i32,
        comment_count: parse_count(stats.comment_count.as_deref()).clamp(0, i32::MAX as i64) as i32,
        tags: snippet.tags.unwrap_or_default().join(","),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, YouTubeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(YouTubeError::Api {
        status: status.as_u16(),
        message: extract_api_error(&body),
    })
}

/// Pulls `error.message` out of a Google error body, falling back to the raw
/// text when the body is not the usual JSON shape.
fn extract_api_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")?
                .get("message")?
                .as_str()
                .map(|message| message.to_string())
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT15M30S"), 930);
        assert_eq!(parse_iso8601_duration("PT0S"), 0);
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), 3723);
        assert_eq!(parse_iso8601_duration("P1DT2H"), 93600);
        assert_eq!(parse_iso8601_duration("PT45S"), 45);
        // Garbage normalizes to zero instead of failing
        assert_eq!(parse_iso8601_duration("forty seconds"), 0);
        assert_eq!(parse_iso8601_duration(""), 0);
    }

    #[test]
    fn test_clamp_max_results() {
        assert_eq!(clamp_max_results(0), 1);
        assert_eq!(clamp_max_results(10), 10);
        assert_eq!(clamp_max_results(500), MAX_SEARCH_RESULTS);
    }

    #[test]
    fn test_order_by_ids_restores_phase_one_order() {
        let ids = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let videos = vec![stub_video("a"), stub_video("c"), stub_video("b")];

        let ordered = order_by_ids(videos, &ids);
        let order: Vec<&str> = ordered.iter().map(|v| v.youtube_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_order_by_ids_drops_unrequested_items() {
        let ids = vec!["a".to_string()];
        let videos = vec![stub_video("a"), stub_video("zzz")];
        assert_eq!(order_by_ids(videos, &ids).len(), 1);
    }

    #[test]
    fn test_extract_api_error_prefers_google_message() {
        let body = r#"{"error": {"code": 403, "message": "quotaExceeded"}}"#;
        assert_eq!(extract_api_error(body), "quotaExceeded");
        assert_eq!(extract_api_error("plain failure"), "plain failure");
    }

    #[test]
    fn test_thumbnail_fallback_chains() {
        let thumbs: Thumbnails = serde_json::from_value(serde_json::json!({
            "default": {"url": "d"},
            "medium": {"url": "m"}
        }))
        .unwrap();
        assert_eq!(thumbs.preferred(), Some("m"));
        assert_eq!(thumbs.high_or_default(), Some("d"));

        let empty = Thumbnails::default();
        assert_eq!(empty.preferred(), None);
    }

    #[test]
    fn test_normalize_video_defaults_missing_fields() {
        let item: VideoItem = serde_json::from_value(serde_json::json!({
            "id": "abc123",
            "snippet": {
                "title": "Aprende Rust",
                "channelId": "UC1",
                "channelTitle": "Canal",
                "publishedAt": "2024-03-01T12:00:00Z",
                "tags": ["rust", "web"]
            },
            "contentDetails": {"duration": "PT15M30S"}
        }))
        .unwrap();

        let video = normalize_video(item);
        assert_eq!(video.youtube_id, "abc123");
        assert_eq!(video.video_url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(video.duration, "PT15M30S");
        assert_eq!(video.duration_seconds, 930);
        assert_eq!(video.tags, "rust,web");
        // Statistics block was absent entirely
        assert_eq!(video.view_count, 0);
        assert_eq!(video.like_count, 0);
        assert_eq!(video.comment_count, 0);
        assert_eq!(video.published_at.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_normalize_video_tolerates_bare_item() {
        let item: VideoItem = serde_json::from_value(serde_json::json!({"id": "x"})).unwrap();
        let video = normalize_video(item);
        assert_eq!(video.youtube_id, "x");
        assert_eq!(video.title, "");
        assert_eq!(video.duration_seconds, 0);
    }

    #[test]
    fn test_build_authorization_url_requests_offline_consent() {
        let url = build_authorization_url("client-1", "https://app/callback", "tok123");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("include_granted_scopes=true"));
        assert!(url.contains("state=tok123"));
        assert!(url.contains(&urlencoding::encode(
            "https://www.googleapis.com/auth/youtube.upload"
        )
        .into_owned()));
    }

    // ------------------------------------------------------------------
    // Two-phase orchestration against a mock
    // ------------------------------------------------------------------

    struct MockMetadata {
        ids: Vec<String>,
        detail_calls: AtomicUsize,
    }

    impl MockMetadata {
        fn with_ids(ids: &[&str]) -> Self {
            Self {
                ids: ids.iter().map(|id| id.to_string()).collect(),
                detail_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetadataApi for MockMetadata {
        async fn search_ids(
            &self,
            _query: &str,
            _max_results: u32,
            _order: &str,
        ) -> Result<Vec<String>, YouTubeError> {
            Ok(self.ids.clone())
        }

        async fn channel_video_ids(
            &self,
            _channel_id: &str,
            _max_results: u32,
        ) -> Result<Vec<String>, YouTubeError> {
            Ok(self.ids.clone())
        }

        async fn videos_by_ids(
            &self,
            ids: &[String],
        ) -> Result<Vec<NormalizedVideo>, YouTubeError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ids.iter().map(|id| stub_video(id)).collect())
        }
    }

    #[tokio::test]
    async fn test_search_skips_detail_phase_when_no_candidates() {
        let api = MockMetadata::with_ids(&[]);
        let results = api.search("rust", 10, "relevance").await.unwrap();
        assert!(results.is_empty());
        assert_eq!(api.detail_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_never_exceeds_max_results() {
        let ids: Vec<String> = (0..12).map(|i| format!("vid{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let api = MockMetadata::with_ids(&id_refs);

        let results = api.search("rust", 10, "relevance").await.unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(api.detail_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_videos_keeps_phase_one_order() {
        let api = MockMetadata::with_ids(&["newest", "older", "oldest"]);
        let results = api.channel_videos("UC1", 20).await.unwrap();
        let order: Vec<&str> = results.iter().map(|v| v.youtube_id.as_str()).collect();
        assert_eq!(order, vec!["newest", "older", "oldest"]);
    }

    fn stub_video(id: &str) -> NormalizedVideo {
        NormalizedVideo {
            youtube_id: id.to_string(),
            title: format!("video {}", id),
            description: String::new(),
            video_url: format!("https://www.youtube.com/watch?v={}", id),
            thumbnail_url: String::new(),
            channel_id: "UC1".to_string(),
            channel_title: "Canal".to_string(),
            duration: "PT1M".to_string(),
            duration_seconds: 60,
            published_at: chrono::Utc::now(),
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            tags: String::new(),
        }
    }
}
