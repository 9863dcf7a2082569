// src/services/uploader.rs
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use backoff::ExponentialBackoff;
use chrono::{Duration, Utc};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::AppError;
use crate::models::auth::TokenBundle;
use crate::models::video::{NewVideo, Privacy, VideoCategory};
use crate::youtube_client::{
    parse_timestamp, ChunkOutcome, UploadApi, UploadMetadata, UploadedResource,
};

/// Fixed transfer unit for resumable uploads.
pub const CHUNK_SIZE: usize = 1024 * 1024;

// ============ Inputs and outputs ============

/// Form fields accompanying an upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub title: String,
    pub description: String,
    pub category: VideoCategory,
    pub privacy: Privacy,
}

/// Result of a completed upload: the fresh platform id, the catalog record
/// mapped from the returned representation, and the bundle as it looked after
/// any silent renewal so the caller can re-cache it.
#[derive(Debug)]
pub struct UploadOutcome {
    pub youtube_id: String,
    pub record: NewVideo,
    pub refreshed_bundle: Option<TokenBundle>,
}

// ============ Workflow ============

/// Runs the whole upload: refuse without a refresh token, renew a stale
/// access token, open the resumable session, stream the file in fixed-size
/// chunks and map the finished representation into a catalog record.
///
/// A failed chunk aborts the upload; the resumable protocol itself is the
/// retry mechanism, not this function.
pub async fn upload_video<A: UploadApi + ?Sized>(
    api: &A,
    bundle: &TokenBundle,
    file_path: &Path,
    request: &UploadRequest,
    owner_id: i32,
) -> Result<UploadOutcome, AppError> {
    // Without a refresh token the upload is doomed partway through; refuse
    // before any network traffic so the caller can route to re-authorization.
    if !bundle.has_refresh_token() {
        return Err(AppError::Credential(
            "credential bundle holds no refresh token".to_string(),
        ));
    }

    let mut active = bundle.clone();
    let mut refreshed = false;
    if active.needs_refresh(Utc::now()) {
        let renewed = api
            .refresh_access_token(&active)
            .await
            .map_err(AppError::from_upload_failure)?;
        active.access_token = renewed.access_token;
        active.expires_at = Some(Utc::now() + Duration::seconds(renewed.expires_in));
        refreshed = true;
        tracing::info!("access token renewed before upload");
    }

    let total_bytes = tokio::fs::metadata(file_path).await?.len();
    if total_bytes == 0 {
        return Err(AppError::Upload("upload source file is empty".to_string()));
    }

    let metadata = UploadMetadata {
        title: request.title.clone(),
        description: request.description.clone(),
        category_id: request.category.youtube_category_id().to_string(),
        privacy_status: request.privacy.as_str().to_string(),
    };

    let session_url = api
        .begin_resumable_session(&active.access_token, &metadata, total_bytes)
        .await
        .map_err(AppError::from_upload_failure)?;

    let resource = transfer_chunks(api, &session_url, file_path, total_bytes).await?;
    let record = map_uploaded_resource(&resource, request, owner_id);

    tracing::info!(youtube_id = %resource.id, "upload finished");
    Ok(UploadOutcome {
        youtube_id: resource.id,
        record,
        refreshed_bundle: refreshed.then_some(active),
    })
}

/// Same workflow, with the temporary source file deleted afterwards whether
/// the upload succeeded or not.
pub async fn upload_and_discard<A: UploadApi + ?Sized>(
    api: &A,
    bundle: &TokenBundle,
    temp: TempUpload,
    request: &UploadRequest,
    owner_id: i32,
) -> Result<UploadOutcome, AppError> {
    let result = upload_video(api, bundle, temp.path(), request, owner_id).await;
    temp.cleanup().await;
    result
}

/// Drives the chunk loop: fixed-size reads and Content-Range submissions
/// until the platform hands back the finished resource.
async fn transfer_chunks<A: UploadApi + ?Sized>(
    api: &A,
    session_url: &str,
    file_path: &Path,
    total_bytes: u64,
) -> Result<UploadedResource, AppError> {
    let mut file = File::open(file_path).await?;
    let mut start: u64 = 0;

    while start < total_bytes {
        let chunk_len = CHUNK_SIZE.min((total_bytes - start) as usize);
        let mut chunk = vec![0u8; chunk_len];
        file.read_exact(&mut chunk).await?;
        let end = start + chunk_len as u64 - 1;

        let outcome = api
            .upload_chunk(session_url, chunk, start, end, total_bytes)
            .await
            .map_err(AppError::from_upload_failure)?;

        match outcome {
            ChunkOutcome::Incomplete => {
                let percent = (end + 1) * 100 / total_bytes;
                tracing::info!("upload progress: {}%", percent);
            }
            ChunkOutcome::Complete(resource) => return Ok(resource),
        }

        start = end + 1;
    }

    Err(AppError::Upload(
        "upload session ended without a finished resource".to_string(),
    ))
}

/// Maps the returned representation into a catalog record. The submitted form
/// values stand in where the snippet comes back empty, and the counters start
/// at zero because the platform has not served the video yet.
fn map_uploaded_resource(
    resource: &UploadedResource,
    request: &UploadRequest,
    owner_id: i32,
) -> NewVideo {
    let snippet = &resource.snippet;
    let title = if snippet.title.is_empty() {
        request.title.clone()
    } else {
        snippet.title.clone()
    };
    let description = if snippet.description.is_empty() {
        request.description.clone()
    } else {
        snippet.description.clone()
    };
    let thumbnail_url = snippet
        .thumbnails
        .as_ref()
        .and_then(|t| t.high_or_default())
        .unwrap_or_default()
        .to_string();

    NewVideo {
        youtube_id: resource.id.clone(),
        title,
        description,
        video_url: format!("https://www.youtube.com/watch?v={}", resource.id),
        thumbnail_url,
        channel_id: snippet.channel_id.clone(),
        channel_title: snippet.channel_title.clone(),
        duration: String::new(),
        duration_seconds: 0,
        published_at: parse_timestamp(snippet.published_at.as_deref()).unwrap_or_else(Utc::now),
        view_count: 0,
        like_count: 0,
        comment_count: 0,
        category: request.category.slug().to_string(),
        tags: String::new(),
        added_by: Some(owner_id),
    }
}

// ============ Temp file ownership ============

/// Scoped ownership of the temporary upload file. `cleanup` deletes it with a
/// short bounded retry (another handle may still be closing on some
/// platforms) and swallows the final failure with a warning; the deletion
/// outcome never overrides the upload's. Drop does one last synchronous
/// attempt if the async path was skipped.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    cleaned: bool,
}

impl TempUpload {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cleaned: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn cleanup(mut self) {
        self.cleaned = true;
        let path = self.path.clone();

        let policy = ExponentialBackoff {
            initial_interval: StdDuration::from_millis(500),
            max_interval: StdDuration::from_secs(2),
            max_elapsed_time: Some(StdDuration::from_secs(8)),
            ..ExponentialBackoff::default()
        };

        let attempt = backoff::future::retry(policy, || {
            let path = path.clone();
            async move {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(backoff::Error::transient(e)),
                }
            }
        })
        .await;

        if let Err(e) = attempt {
            tracing::warn!(
                "could not remove temporary upload file {}: {}",
                path.display(),
                e
            );
        }
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if !self.cleaned {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::youtube_client::{TokenRefreshResponse, YouTubeError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockUpload {
        network_calls: AtomicUsize,
        refresh_ok: bool,
        fail_chunk_index: Option<usize>,
        chunks: Mutex<Vec<(u64, u64, usize)>>,
    }

    impl MockUpload {
        fn new() -> Self {
            Self {
                network_calls: AtomicUsize::new(0),
                refresh_ok: true,
                fail_chunk_index: None,
                chunks: Mutex::new(Vec::new()),
            }
        }

        fn rejecting_refresh() -> Self {
            Self {
                refresh_ok: false,
                ..Self::new()
            }
        }

        fn failing_at_chunk(index: usize) -> Self {
            Self {
                fail_chunk_index: Some(index),
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.network_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UploadApi for MockUpload {
        async fn refresh_access_token(
            &self,
            _bundle: &TokenBundle,
        ) -> Result<TokenRefreshResponse, YouTubeError> {
            self.network_calls.fetch_add(1, Ordering::SeqCst);
            if self.refresh_ok {
                Ok(TokenRefreshResponse {
                    access_token: "renewed-token".to_string(),
                    expires_in: 3600,
                    token_type: "Bearer".to_string(),
                })
            } else {
                Err(YouTubeError::TokenRefresh {
                    status: 400,
                    message: "invalid_grant".to_string(),
                })
            }
        }

        async fn begin_resumable_session(
            &self,
            _access_token: &str,
            _metadata: &UploadMetadata,
            _total_bytes: u64,
        ) -> Result<String, YouTubeError> {
            self.network_calls.fetch_add(1, Ordering::SeqCst);
            Ok("mock://upload-session".to_string())
        }

        async fn upload_chunk(
            &self,
            _session_url: &str,
            chunk: Vec<u8>,
            start_byte: u64,
            end_byte: u64,
            total_bytes: u64,
        ) -> Result<ChunkOutcome, YouTubeError> {
            self.network_calls.fetch_add(1, Ordering::SeqCst);
            let index = {
                let mut seen = self.chunks.lock().unwrap();
                seen.push((start_byte, end_byte, chunk.len()));
                seen.len() - 1
            };
            if self.fail_chunk_index == Some(index) {
                return Err(YouTubeError::Api {
                    status: 500,
                    message: "backend error".to_string(),
                });
            }
            if end_byte + 1 == total_bytes {
                Ok(ChunkOutcome::Complete(finished_resource()))
            } else {
                Ok(ChunkOutcome::Incomplete)
            }
        }
    }

    fn finished_resource() -> UploadedResource {
        serde_json::from_value(serde_json::json!({
            "id": "nuevoVid99",
            "snippet": {
                "title": "Mi video corporativo",
                "description": "Material interno",
                "channelId": "UCcanal",
                "channelTitle": "Canal Teca",
                "publishedAt": "2024-06-01T12:00:00Z",
                "thumbnails": {
                    "high": { "url": "https://i.ytimg.com/vi/nuevoVid99/hqdefault.jpg" }
                }
            }
        }))
        .unwrap()
    }

    fn bundle_with_refresh() -> TokenBundle {
        TokenBundle {
            access_token: "valid-token".to_string(),
            refresh_token: Some("refresh-token".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/youtube.upload".to_string()],
            expires_at: Some(Utc::now() + Duration::hours(1)),
        }
    }

    fn sample_request() -> UploadRequest {
        UploadRequest {
            title: "Título del formulario".to_string(),
            description: "Descripción del formulario".to_string(),
            category: VideoCategory::Programacion,
            privacy: Privacy::Unlisted,
        }
    }

    async fn write_temp_file(bytes: usize) -> PathBuf {
        let path = std::env::temp_dir().join(format!("videoteca_test_{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, vec![7u8; bytes]).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_refuses_without_refresh_token() {
        let api = MockUpload::new();
        let mut bundle = bundle_with_refresh();
        bundle.refresh_token = None;

        let err = upload_video(&api, &bundle, Path::new("/nonexistent"), &sample_request(), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Credential(_)));
        assert_eq!(api.calls(), 0, "refusal must happen before any network call");
    }

    #[tokio::test]
    async fn test_upload_treats_empty_refresh_token_as_missing() {
        let api = MockUpload::new();
        let mut bundle = bundle_with_refresh();
        bundle.refresh_token = Some(String::new());

        let err = upload_video(&api, &bundle, Path::new("/nonexistent"), &sample_request(), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Credential(_)));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_streams_in_fixed_chunks() {
        let api = MockUpload::new();
        let bundle = bundle_with_refresh();
        let path = write_temp_file(2 * CHUNK_SIZE + 512 * 1024).await;

        let outcome = upload_video(&api, &bundle, &path, &sample_request(), 7)
            .await
            .unwrap();

        let chunks = api.chunks.lock().unwrap().clone();
        assert_eq!(
            chunks,
            vec![
                (0, 1_048_575, CHUNK_SIZE),
                (1_048_576, 2_097_151, CHUNK_SIZE),
                (2_097_152, 2_621_439, 512 * 1024),
            ]
        );
        assert_eq!(outcome.youtube_id, "nuevoVid99");
        assert!(outcome.refreshed_bundle.is_none(), "token was still fresh");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_maps_resource_into_catalog_record() {
        let api = MockUpload::new();
        let bundle = bundle_with_refresh();
        let path = write_temp_file(1024).await;

        let outcome = upload_video(&api, &bundle, &path, &sample_request(), 7)
            .await
            .unwrap();

        let record = outcome.record;
        assert_eq!(record.youtube_id, "nuevoVid99");
        assert_eq!(record.title, "Mi video corporativo");
        assert_eq!(record.video_url, "https://www.youtube.com/watch?v=nuevoVid99");
        assert_eq!(
            record.thumbnail_url,
            "https://i.ytimg.com/vi/nuevoVid99/hqdefault.jpg"
        );
        assert_eq!(record.category, "programacion");
        assert_eq!(record.view_count, 0);
        assert_eq!(record.added_by, Some(7));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test]
    fn test_form_metadata_stands_in_for_an_empty_snippet() {
        let resource: UploadedResource =
            serde_json::from_value(serde_json::json!({ "id": "soloId01" })).unwrap();

        let record = map_uploaded_resource(&resource, &sample_request(), 3);

        assert_eq!(record.title, "Título del formulario");
        assert_eq!(record.description, "Descripción del formulario");
        assert_eq!(record.category, "programacion");
        assert_eq!(record.thumbnail_url, "");
        assert_eq!(record.added_by, Some(3));
    }

    #[tokio::test]
    async fn test_stale_token_is_renewed_and_returned() {
        let api = MockUpload::new();
        let mut bundle = bundle_with_refresh();
        bundle.expires_at = Some(Utc::now() - Duration::minutes(1));
        let path = write_temp_file(1024).await;

        let outcome = upload_video(&api, &bundle, &path, &sample_request(), 7)
            .await
            .unwrap();

        let renewed = outcome.refreshed_bundle.unwrap();
        assert_eq!(renewed.access_token, "renewed-token");
        assert!(renewed.expires_at.unwrap() > Utc::now());

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_rejection_is_a_credential_failure() {
        let api = MockUpload::rejecting_refresh();
        let mut bundle = bundle_with_refresh();
        bundle.expires_at = None;
        let path = write_temp_file(1024).await;

        let err = upload_video(&api, &bundle, &path, &sample_request(), 7)
            .await
            .unwrap_err();

        assert!(err.is_credential_failure());
        assert_eq!(api.calls(), 1, "must stop at the refresh attempt");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_chunk_aborts_without_retry() {
        let api = MockUpload::failing_at_chunk(1);
        let bundle = bundle_with_refresh();
        let path = write_temp_file(3 * CHUNK_SIZE).await;

        let err = upload_video(&api, &bundle, &path, &sample_request(), 7)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upload(_)));
        let chunks = api.chunks.lock().unwrap().clone();
        assert_eq!(chunks.len(), 2, "no resubmission of the failed chunk");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_file_is_rejected() {
        let api = MockUpload::new();
        let bundle = bundle_with_refresh();
        let path = write_temp_file(0).await;

        let err = upload_video(&api, &bundle, &path, &sample_request(), 7)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upload(_)));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_temp_file_is_gone_after_success() {
        let api = MockUpload::new();
        let bundle = bundle_with_refresh();
        let path = write_temp_file(1024).await;

        let result = upload_and_discard(
            &api,
            &bundle,
            TempUpload::new(path.clone()),
            &sample_request(),
            7,
        )
        .await;

        assert!(result.is_ok());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_temp_file_is_gone_after_failure() {
        let api = MockUpload::failing_at_chunk(0);
        let bundle = bundle_with_refresh();
        let path = write_temp_file(CHUNK_SIZE).await;

        let result = upload_and_discard(
            &api,
            &bundle,
            TempUpload::new(path.clone()),
            &sample_request(),
            7,
        )
        .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_already_deleted_file() {
        let path = write_temp_file(16).await;
        tokio::fs::remove_file(&path).await.unwrap();

        TempUpload::new(path.clone()).cleanup().await;

        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_file_when_cleanup_was_skipped() {
        let path = std::env::temp_dir().join(format!("videoteca_drop_{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"payload").unwrap();

        drop(TempUpload::new(path.clone()));

        assert!(!path.exists());
    }
}
