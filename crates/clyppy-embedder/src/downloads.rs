//! Bounded download execution.
//!
//! Every media fetch in the process passes through one counting semaphore,
//! then the per-platform shard lock shared with sibling processes. Mirror
//! platforms (Instagram, TikTok) are fetched by following one HEAD redirect
//! to the mirror's CDN instead of running the media tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use clyppy_media::DownloadOptions;
use clyppy_models::{Clip, EmbedErrorKind, Service};
use clyppy_platforms::{instagram_mirror_url, tiktok_mirror_url};

use crate::error::{EmbedError, EmbedResult};
use crate::orchestrator::EmbedContext;

/// Counting gate over concurrent media fetches, plus the scratch directory
/// downloaded files land in.
#[derive(Debug)]
pub struct DownloadManager {
    semaphore: Arc<Semaphore>,
    work_dir: PathBuf,
}

impl DownloadManager {
    pub fn new(max_concurrent: usize, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Working path for a clip's video file.
    pub fn working_path(&self, clip: &Clip) -> PathBuf {
        self.work_dir.join(clip.working_filename())
    }

    /// Working path for a clip's thumbnail.
    pub fn thumbnail_path(&self, clip: &Clip) -> PathBuf {
        self.work_dir.join(clip.thumbnail_filename())
    }

    pub async fn acquire(&self) -> EmbedResult<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EmbedError::internal("download pool closed"))
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Fetch the clip's media into its working file.
///
/// Holds a pool permit and the platform's shard-lock slot for the duration.
/// `max_filesize` caps the fetch for forced downloads where the probe gave
/// no size.
pub async fn fetch_clip_media(
    ctx: &EmbedContext,
    clip: &Clip,
    max_filesize: Option<u64>,
) -> EmbedResult<PathBuf> {
    let dest = ctx.downloads.working_path(clip);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let _permit = ctx.downloads.acquire().await?;
    ctx.inflight.begin_download(&clip.source_id);
    let result = fetch_locked(ctx, clip, &dest, max_filesize).await;
    ctx.inflight.end_download(&clip.source_id);
    result?;
    Ok(dest)
}

async fn fetch_locked(
    ctx: &EmbedContext,
    clip: &Clip,
    dest: &Path,
    max_filesize: Option<u64>,
) -> EmbedResult<()> {
    let guard = ctx.shard.acquire(clip.service.as_str()).await?;
    let result = run_fetch(ctx, clip, dest, max_filesize).await;
    guard.release().await;
    result
}

async fn run_fetch(
    ctx: &EmbedContext,
    clip: &Clip,
    dest: &Path,
    max_filesize: Option<u64>,
) -> EmbedResult<()> {
    match clip.service {
        // Mirror hosts hand out plain MP4s; the media tool is blocked there.
        Service::Instagram | Service::TikTok => {
            let mirror = mirror_url_for(clip);
            mirror_download(&ctx.mirror_http, &mirror, dest).await
        }
        _ => {
            let mut opts = DownloadOptions::default();
            if let Some(cap) = max_filesize {
                opts = opts.with_max_filesize(cap);
            }
            opts = opts.with_cookies(ctx.cookies_for(clip.service).await);

            info!(
                clip_id = %clip.clyppy_id,
                platform = %clip.service,
                "downloading media"
            );
            ctx.ytdlp.download(&clip.source_url, dest, &opts).await?;
            Ok(())
        }
    }
}

/// Mirror URL for a mirror-delivered platform.
pub fn mirror_url_for(clip: &Clip) -> String {
    match clip.service {
        Service::Instagram => instagram_mirror_url(&clip.source_id),
        _ => tiktok_mirror_url(&clip.source_url),
    }
}

/// Fetch from a mirror host: HEAD for the CDN location, then stream the
/// bytes to `dest`. The client must not follow redirects itself.
pub async fn mirror_download(
    http: &reqwest::Client,
    mirror_url: &str,
    dest: &Path,
) -> EmbedResult<()> {
    debug!(url = %mirror_url, "resolving mirror redirect");
    let head = http
        .head(mirror_url)
        .send()
        .await
        .map_err(|e| EmbedError::internal(format!("mirror HEAD failed: {e}")))?;

    let location = head
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            EmbedError::terminal(
                EmbedErrorKind::VideoUnavailable,
                "mirror returned no redirect",
            )
        })?;

    let response = http
        .get(&location)
        .send()
        .await
        .map_err(|e| EmbedError::internal(format!("mirror GET failed: {e}")))?;
    if !response.status().is_success() {
        return Err(EmbedError::terminal(
            EmbedErrorKind::VideoUnavailable,
            format!("mirror CDN returned {}", response.status()),
        ));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| EmbedError::internal(format!("mirror stream failed: {e}")))?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    debug!(dest = %dest.display(), "mirror download complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_working_paths_join_the_scratch_dir() {
        let manager = DownloadManager::new(2, "/tmp/clyppy_test_work");
        let clip = Clip::new(Service::Twitch, "Slug", "https://clips.twitch.tv/Slug");
        let video = manager.working_path(&clip);
        let thumb = manager.thumbnail_path(&clip);
        assert!(video.starts_with("/tmp/clyppy_test_work"));
        assert!(video.to_string_lossy().ends_with(".mp4"));
        assert!(thumb.to_string_lossy().ends_with(".webp"));
    }

    #[test]
    fn test_pool_never_starts_empty() {
        let manager = DownloadManager::new(0, "/tmp/x");
        assert_eq!(manager.available(), 1);
    }

    #[tokio::test]
    async fn test_permits_are_returned_on_drop() {
        let manager = DownloadManager::new(2, "/tmp/x");
        let permit = manager.acquire().await.unwrap();
        assert_eq!(manager.available(), 1);
        drop(permit);
        assert_eq!(manager.available(), 2);
    }

    #[test]
    fn test_mirror_urls_per_platform() {
        let ig = Clip::new(Service::Instagram, "DBxyz", "https://www.instagram.com/reel/DBxyz/");
        assert!(mirror_url_for(&ig).ends_with("/reel/DBxyz"));

        let tt = Clip::new(
            Service::TikTok,
            "7300000000000000002",
            "https://www.tiktok.com/@user/video/7300000000000000002",
        );
        let mirror = mirror_url_for(&tt);
        assert!(!mirror.contains("www.tiktok.com"));
        assert!(mirror.ends_with("/@user/video/7300000000000000002"));
    }

    #[tokio::test]
    async fn test_mirror_download_follows_one_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(url_path("/reel/abc"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/video.mp4", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MP4BYTES".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("clip.mp4");
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        mirror_download(&client, &format!("{}/reel/abc", server.uri()), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"MP4BYTES");
    }

    #[tokio::test]
    async fn test_mirror_without_redirect_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let err = mirror_download(
            &client,
            &format!("{}/reel/gone", server.uri()),
            &dir.path().join("clip.mp4"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), EmbedErrorKind::VideoUnavailable);
    }
}
