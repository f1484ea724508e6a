//! The backing API client.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use uuid::Uuid;

use clyppy_models::interaction::{ErrorReport, InteractionEdit, InteractionPublish};
use clyppy_models::limits::{API_TIMEOUT, UPLOAD_CHUNK_BYTES};

use crate::error::{ApiError, ApiResult};
use crate::retry::{retry_async, RetryConfig};
use crate::types::{
    AckResponse, AddClipResponse, ClipRecord, PublishResponse, StatusResponse, SubtractResponse,
    TokenBalance,
};

/// User agent sent on every request.
pub const CLYPPYIO_USER_AGENT: &str = concat!("ClyppyBot/", env!("CARGO_PKG_VERSION"));

/// Client for the clyppy.io backing API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chunk_bytes: usize,
}

impl ApiClient {
    /// Create a client for `base_url` authenticating with `api_key`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(CLYPPYIO_USER_AGENT)
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chunk_bytes: UPLOAD_CHUNK_BYTES,
        })
    }

    /// Override the chunked-upload threshold. Tests shrink it to drive
    /// the chunked path with tiny files.
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.get(url).header("X-API-Key", &self.api_key)
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.post(url).header("X-API-Key", &self.api_key)
    }

    /// Whether a clip with this public id is already hosted.
    pub async fn clip_exists(&self, clyppy_id: &str) -> ApiResult<bool> {
        let url = self.url("/api/clips/get-status/");
        let config = RetryConfig::new("clip_exists");

        let status: StatusResponse = retry_async(&config, || async {
            let response = self
                .get(&url)
                .query(&[("clip_id", clyppy_id)])
                .send()
                .await?;
            read_json("clips/get-status", response).await
        })
        .await?;

        Ok(status.exists)
    }

    /// Stored metadata for a clip, or `None` when it is not hosted.
    pub async fn get_clip(&self, clyppy_id: &str) -> ApiResult<Option<ClipRecord>> {
        let url = self.url(&format!("/api/clips/get/{clyppy_id}"));
        let config = RetryConfig::new("get_clip");

        retry_async(&config, || async {
            let response = self.get(&url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            read_json("clips/get", response).await.map(Some)
        })
        .await
    }

    /// Publish an interaction record. Not retried; a duplicate publish
    /// would create a second row.
    pub async fn publish(&self, row: &InteractionPublish) -> ApiResult<PublishResponse> {
        let url = self.url("/api/clips/publish/");
        let response = self.post(&url).json(row).send().await?;
        let parsed: PublishResponse = read_json("clips/publish", response).await?;

        if !parsed.success {
            return Err(ApiError::rejected(
                "clips/publish",
                "server refused the interaction record",
            ));
        }
        debug!(id = ?parsed.id, override_id = ?parsed.video_page_id, "published interaction");
        Ok(parsed)
    }

    /// Patch the measured response time and reply message id onto a
    /// published row.
    pub async fn publish_edit(&self, edit: &InteractionEdit) -> ApiResult<()> {
        let url = self.url("/api/clips/publish/");
        let response = self.post(&url).json(edit).send().await?;
        let parsed: AckResponse = read_json("clips/publish(edit)", response).await?;

        if !parsed.success {
            return Err(ApiError::rejected(
                "clips/publish(edit)",
                "server refused the edit",
            ));
        }
        Ok(())
    }

    /// Post a structured error event.
    pub async fn report_error(&self, report: &ErrorReport) -> ApiResult<()> {
        let url = self.url("/api/clips/publish/error/");
        let response = self.post(&url).json(report).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::http("clips/publish/error", status.as_u16(), body));
        }
        Ok(())
    }

    /// Upload a clip file, one-shot for small files and chunked above
    /// the chunk threshold.
    pub async fn upload_clip(
        &self,
        path: impl AsRef<Path>,
        filename: &str,
    ) -> ApiResult<AddClipResponse> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();

        if size <= self.chunk_bytes as u64 {
            self.upload_oneshot(path, filename).await
        } else {
            self.upload_chunked(path, filename, size).await
        }
    }

    async fn upload_oneshot(&self, path: &Path, filename: &str) -> ApiResult<AddClipResponse> {
        let url = self.url("/api/addclip/");
        let bytes = tokio::fs::read(path).await?;

        let response = self
            .post(&url)
            .json(&json!({
                "filename": filename,
                "data": BASE64.encode(&bytes),
            }))
            .send()
            .await?;

        let parsed: AddClipResponse = read_json("addclip", response).await?;
        if !parsed.success {
            return Err(ApiError::rejected("addclip", "upload rejected"));
        }
        info!(filename = %filename, size, "uploaded clip");
        Ok(parsed)
    }

    async fn upload_chunked(
        &self,
        path: &Path,
        filename: &str,
        size: u64,
    ) -> ApiResult<AddClipResponse> {
        let url = self.url("/api/addclip/");
        let file_id = Uuid::new_v4().to_string();
        let chunk_bytes = self.chunk_bytes as u64;
        let total_chunks = size.div_ceil(chunk_bytes);

        let mut file = tokio::fs::File::open(path).await?;
        let mut last: Option<AddClipResponse> = None;

        for number in 1..=total_chunks {
            let sent = (number - 1) * chunk_bytes;
            let len = chunk_bytes.min(size - sent) as usize;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf).await?;

            let response = self
                .post(&url)
                .header("X-File-ID", &file_id)
                .header("X-Chunk-Number", number.to_string())
                .header("X-Total-Chunks", total_chunks.to_string())
                .json(&json!({
                    "filename": filename,
                    "data": BASE64.encode(&buf),
                }))
                .send()
                .await?;

            let parsed: AddClipResponse = read_json("addclip", response).await?;
            debug!(
                chunk = number,
                total = total_chunks,
                finished = parsed.finished,
                "uploaded chunk"
            );
            last = Some(parsed);
        }

        // The final chunk's verdict is the authoritative one.
        let last = last.ok_or_else(|| ApiError::rejected("addclip", "nothing to upload"))?;
        if !last.success {
            return Err(ApiError::rejected("addclip", "final chunk rejected"));
        }
        info!(filename = %filename, size, chunks = total_chunks, "uploaded clip");
        Ok(last)
    }

    /// Replace the hosted MP4 for an existing clip.
    pub async fn overwrite(&self, clyppy_id: &str, path: impl AsRef<Path>) -> ApiResult<()> {
        let url = self.url("/api/overwrite/");
        let bytes = tokio::fs::read(path.as_ref()).await?;

        let response = self
            .post(&url)
            .json(&json!({
                "clyppy_id": clyppy_id,
                "data": BASE64.encode(&bytes),
            }))
            .send()
            .await?;

        let parsed: AckResponse = read_json("overwrite", response).await?;
        if !parsed.success {
            return Err(ApiError::rejected("overwrite", "server refused overwrite"));
        }
        Ok(())
    }

    /// Token balance for a user.
    pub async fn get_tokens(&self, user_id: u64) -> ApiResult<i64> {
        let url = self.url("/api/tokens/get/");
        let config = RetryConfig::new("get_tokens");

        let balance: TokenBalance = retry_async(&config, || async {
            let response = self
                .get(&url)
                .query(&[("user_id", user_id.to_string())])
                .send()
                .await?;
            read_json("tokens/get", response).await
        })
        .await?;

        Ok(balance.tokens)
    }

    /// Charge (or, with a negative amount, refund) tokens. Never
    /// retried: a replay would double the charge.
    pub async fn subtract_tokens(
        &self,
        user_id: u64,
        amount: i64,
        reason: &str,
    ) -> ApiResult<SubtractResponse> {
        let url = self.url("/api/tokens/subtract/");
        let response = self
            .post(&url)
            .json(&json!({
                "user_id": user_id,
                "amount": amount,
                "reason": reason,
            }))
            .send()
            .await?;

        read_json("tokens/subtract", response).await
    }
}

async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> ApiResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::http(endpoint, status.as_u16(), body));
    }
    Ok(response.json::<T>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri(), "test-key").unwrap()
    }

    #[tokio::test]
    async fn test_clip_exists_sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/clips/get-status/"))
            .and(query_param("clip_id", "ab12cd34"))
            .and(header("X-API-Key", "test-key"))
            .and(header("user-agent", CLYPPYIO_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exists": true
            })))
            .mount(&server)
            .await;

        assert!(client(&server).clip_exists("ab12cd34").await.unwrap());
    }

    #[tokio::test]
    async fn test_clip_exists_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/clips/get-status/"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/clips/get-status/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exists": false
            })))
            .mount(&server)
            .await;

        assert!(!client(&server).clip_exists("ab12cd34").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_clip_found_and_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/clips/get/ab12cd34"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "clip_id": "ab12cd34",
                "remote_url": "https://cdn.clyppy.io/temp/twitch_ab12cd34.mp4",
                "duration": 28,
                "is_redirect": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/clips/get/missing0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = client(&server);
        let record = api.get_clip("ab12cd34").await.unwrap().unwrap();
        assert_eq!(record.duration, Some(28));
        assert!(api.get_clip("missing0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_returns_server_override() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/clips/publish/"))
            .and(body_partial_json(serde_json::json!({
                "platform": "twitch",
                "clip_id": "ab12cd34"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "id": 991,
                "video_page_id": "zz99aa11"
            })))
            .mount(&server)
            .await;

        let row = InteractionPublish {
            video_url: "https://clips.twitch.tv/Funny".to_string(),
            platform: "twitch".to_string(),
            clip_id: "ab12cd34".to_string(),
            original_id: "Funny".to_string(),
            remote_url: None,
            width: None,
            height: None,
            filesize: None,
            duration: 30,
            is_redirect: false,
            expires_at: None,
            uploader: None,
            thumbnail_url: None,
            is_nsfw: false,
            user_id: 7,
            username: "viewer".to_string(),
            channel_id: 11,
            guild_id: Some(22),
            guild_name: "Clips".to_string(),
            response_time_seconds: 1.25,
        };

        let resp = client(&server).publish(&row).await.unwrap();
        assert_eq!(resp.id, Some(991));
        assert_eq!(resp.video_page_id.as_deref(), Some("zz99aa11"));
    }

    #[tokio::test]
    async fn test_publish_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/clips/publish/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": false})),
            )
            .mount(&server)
            .await;

        let edit = InteractionEdit::new(5, 2.0, 999);
        let err = client(&server).publish_edit(&edit).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_subtract_tokens_posts_signed_amount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens/subtract/"))
            .and(body_partial_json(serde_json::json!({
                "user_id": 7,
                "amount": -2,
                "reason": "Token Refund"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "user_success": true,
                "tokens": 12
            })))
            .mount(&server)
            .await;

        let resp = client(&server)
            .subtract_tokens(7, -2, "Token Refund")
            .await
            .unwrap();
        assert!(resp.success && resp.user_success);
        assert_eq!(resp.tokens, Some(12));
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens/subtract/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "user_success": false,
                "tokens": 0
            })))
            .mount(&server)
            .await;

        let resp = client(&server).subtract_tokens(7, 3, "Embed").await.unwrap();
        assert!(resp.success);
        assert!(!resp.user_success);
    }

    #[tokio::test]
    async fn test_upload_clip_oneshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/addclip/"))
            .and(body_partial_json(serde_json::json!({
                "filename": "twitch_ab12cd34.mp4"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "file_path": "temp/twitch_ab12cd34.mp4",
                "finished": true
            })))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        tokio::fs::write(&file, b"tiny clip").await.unwrap();

        let resp = client(&server)
            .upload_clip(&file, "twitch_ab12cd34.mp4")
            .await
            .unwrap();
        assert_eq!(resp.file_path.as_deref(), Some("temp/twitch_ab12cd34.mp4"));
    }

    #[tokio::test]
    async fn test_upload_clip_chunked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/addclip/"))
            .and(header_exists("X-File-ID"))
            .and(header_exists("X-Chunk-Number"))
            .and(header("X-Total-Chunks", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "finished": true
            })))
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        tokio::fs::write(&file, b"0123456789").await.unwrap();

        let resp = client(&server)
            .with_chunk_bytes(4)
            .upload_clip(&file, "big.mp4")
            .await
            .unwrap();
        assert!(resp.success);
    }

    #[tokio::test]
    async fn test_report_error_posts_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/clips/publish/error/"))
            .and(body_partial_json(serde_json::json!({
                "error_type": "VideoUnavailable",
                "handled": true
            })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let report = ErrorReport {
            error_type: "VideoUnavailable".to_string(),
            error_message: "remote said 404".to_string(),
            video_url: "https://youtu.be/gone".to_string(),
            video_platform: "youtube".to_string(),
            username: "viewer".to_string(),
            user_id: 7,
            handled: true,
        };
        client(&server).report_error(&report).await.unwrap();
    }
}
