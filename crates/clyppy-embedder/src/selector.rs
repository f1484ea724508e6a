//! Delivery-path selection.
//!
//! Order of preference: platform redirect (no bytes through this host),
//! direct chat attachment (small files), CDN reupload (everything else).
//! The probe's size hint short-circuits to an attachment download whenever
//! the file is known to fit, regardless of the platform's strategy.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use clyppy_media::ProbedMedia;
use clyppy_models::limits::TWITCH_EPHEMERAL_URL_TTL;
use clyppy_models::{Clip, DeliveryStrategy, DownloadResponse, EmbedErrorKind, Service};
use clyppy_platforms::twitch::PERMANENT_ASSET_HOST;

use crate::downloads::{fetch_clip_media, mirror_url_for};
use crate::error::{EmbedError, EmbedResult};
use crate::orchestrator::EmbedContext;

/// What the selector hands the publisher: the response for the API row plus
/// the local file backing it (kept for thumbnailing, removed after the
/// reply goes out).
#[derive(Debug)]
pub struct Delivery {
    pub response: DownloadResponse,
    pub local_artifact: Option<PathBuf>,
}

impl Delivery {
    pub fn remote(response: DownloadResponse) -> Self {
        Self {
            response,
            local_artifact: None,
        }
    }

    pub fn backed(response: DownloadResponse, path: impl Into<PathBuf>) -> Self {
        Self {
            response,
            local_artifact: Some(path.into()),
        }
    }
}

/// Whether this platform is probed before admission. Mirror-redirect
/// platforms are never probed: the media tool is blocked there and the
/// mirror link embeds as-is.
pub fn probes_before_admission(service: Service) -> bool {
    !matches!(service, Service::Instagram | Service::TikTok)
}

/// Whether a file of `size` may go out as a chat attachment.
pub fn fits_attach(size: Option<u64>, can_attach: bool, max_bytes: u64) -> bool {
    can_attach && size.is_some_and(|s| s <= max_bytes)
}

/// Derive the permanent MP4 URL from a Twitch preview thumbnail, when the
/// clip lives on the permanent asset CDN.
///
/// `https://{host}/AT-cm%7C123-preview-480x272.jpg` -> `.../AT-cm%7C123.mp4`
pub fn twitch_permanent_url(thumbnail: &str) -> Option<String> {
    if !thumbnail.contains(PERMANENT_ASSET_HOST) {
        return None;
    }
    let cut = thumbnail.find("-preview-")?;
    Some(format!("{}.mp4", &thumbnail[..cut]))
}

/// Pick and execute the cheapest viable delivery for `clip`.
///
/// `predownloaded` carries a file the admission fallback already fetched so
/// it is never downloaded twice.
pub async fn resolve_delivery(
    ctx: &EmbedContext,
    clip: &mut Clip,
    probe: Option<&ProbedMedia>,
    can_attach: bool,
    predownloaded: Option<PathBuf>,
) -> EmbedResult<Delivery> {
    let strategy = ctx.strategy_for(clip.service);

    // Mirror platforms deliver a rewritten link; nothing is fetched.
    if strategy == DeliveryStrategy::Redirect && !probes_before_admission(clip.service) {
        let url = mirror_url_for(clip);
        clip.uses_redirect = true;
        info!(clip_id = %clip.clyppy_id, url = %url, "mirror redirect delivery");
        return Ok(Delivery::remote(
            DownloadResponse::redirect(url).with_duration(clip.duration_secs),
        ));
    }

    // Reuse the admission fallback's file rather than refetching.
    if let Some(path) = predownloaded {
        return finish_local(ctx, clip, path, can_attach, probe).await;
    }

    // Known-small files attach regardless of the platform's strategy.
    let size_hint = probe.and_then(|p| p.size_hint());
    if fits_attach(size_hint, can_attach, ctx.config.attach_max_bytes) {
        let path = fetch_clip_media(ctx, clip, None).await?;
        return finish_local(ctx, clip, path, can_attach, probe).await;
    }

    match strategy {
        DeliveryStrategy::Redirect => redirect_delivery(ctx, clip, probe, can_attach).await,
        DeliveryStrategy::AlwaysReupload => {
            let path = fetch_clip_media(ctx, clip, None).await?;
            reupload(ctx, clip, path, probe).await
        }
        DeliveryStrategy::AttachOrReupload => {
            let path = fetch_clip_media(ctx, clip, None).await?;
            finish_local(ctx, clip, path, can_attach, probe).await
        }
        DeliveryStrategy::AttachOnly => {
            let path = fetch_clip_media(ctx, clip, None).await?;
            let size = file_size(&path).await?;
            if fits_attach(Some(size), can_attach, ctx.config.attach_max_bytes) {
                finish_local(ctx, clip, path, can_attach, probe).await
            } else {
                clyppy_media::fs_utils::remove_quiet(&path).await;
                Err(EmbedError::terminal(
                    EmbedErrorKind::Unknown,
                    format!("{size} bytes is too large to attach here"),
                ))
            }
        }
    }
}

/// Redirect strategy: embed the extractor's direct URL when it is a plain
/// file, falling back to download+rehost for HLS playlists and probes with
/// no usable URL.
async fn redirect_delivery(
    ctx: &EmbedContext,
    clip: &mut Clip,
    probe: Option<&ProbedMedia>,
    can_attach: bool,
) -> EmbedResult<Delivery> {
    let is_hls = probe.is_some_and(|p| p.is_hls());
    let format_url = probe
        .and_then(|p| p.format_url.clone())
        .filter(|_| !is_hls);

    let Some(url) = format_url else {
        debug!(clip_id = %clip.clyppy_id, "redirect URL unusable, rehosting");
        let path = fetch_clip_media(ctx, clip, None).await?;
        return finish_local(ctx, clip, path, can_attach, probe).await;
    };

    clip.uses_redirect = true;

    let mut response = if clip.service == Service::Twitch {
        match probe
            .and_then(|p| p.thumbnail.as_deref())
            .and_then(twitch_permanent_url)
        {
            Some(permanent) => {
                info!(clip_id = %clip.clyppy_id, "permanent twitch asset URL");
                DownloadResponse::redirect(permanent)
            }
            None => {
                // Signed CDN URL; record when it goes stale so the stored
                // row is not reused past that.
                let ttl = chrono::Duration::seconds(TWITCH_EPHEMERAL_URL_TTL.as_secs() as i64);
                DownloadResponse::redirect(url).with_expires_at(Some(Utc::now() + ttl))
            }
        }
    } else {
        DownloadResponse::redirect(url)
    };

    response = apply_probe_metadata(response, clip, probe);
    Ok(Delivery::remote(response))
}

/// Attach when the downloaded file fits, otherwise rehost it on the CDN.
async fn finish_local(
    ctx: &EmbedContext,
    clip: &Clip,
    path: PathBuf,
    can_attach: bool,
    probe: Option<&ProbedMedia>,
) -> EmbedResult<Delivery> {
    let size = file_size(&path).await?;
    if fits_attach(Some(size), can_attach, ctx.config.attach_max_bytes) {
        let response = apply_probe_metadata(
            DownloadResponse::local(&path)
                .with_filesize(Some(size))
                .with_can_be_attached(true),
            clip,
            probe,
        );
        return Ok(Delivery::backed(response, path));
    }
    reupload(ctx, clip, path, probe).await
}

/// Rehost a downloaded file on the CDN.
async fn reupload(
    ctx: &EmbedContext,
    clip: &Clip,
    path: PathBuf,
    probe: Option<&ProbedMedia>,
) -> EmbedResult<Delivery> {
    let size = file_size(&path).await?;
    let url = ctx.cdn.upload_video(&path, &clip.working_filename()).await?;
    info!(clip_id = %clip.clyppy_id, size, "rehosted on CDN");

    let response = apply_probe_metadata(
        DownloadResponse::remote(url).with_filesize(Some(size)),
        clip,
        probe,
    );
    Ok(Delivery::backed(response, path))
}

fn apply_probe_metadata(
    response: DownloadResponse,
    clip: &Clip,
    probe: Option<&ProbedMedia>,
) -> DownloadResponse {
    let mut response = response.with_duration(clip.duration_secs);
    if let Some(p) = probe {
        response = response
            .with_dimensions(p.width, p.height)
            .with_video_name(p.title.clone())
            .with_uploader(p.uploader.clone());
        if response.filesize_bytes.is_none() {
            response = response.with_filesize(p.size_hint());
        }
    }
    response
}

async fn file_size(path: &Path) -> EmbedResult<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "downloaded file unreadable");
            Err(e.into())
        }
    }
}
