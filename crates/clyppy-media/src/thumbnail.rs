//! First-frame thumbnail extraction.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use clyppy_models::EmbedErrorKind;

use crate::classify::{classify_tool_stderr, last_stderr_line};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_quiet;

/// Thumbnails are scaled to this width, height following the aspect.
const THUMBNAIL_SCALE_WIDTH: u32 = 480;

/// Extract the first frame of `video` into `dest` (webp).
///
/// A file that yields no first frame is not a video; it is removed and
/// the failure surfaces as `InvalidFileType`.
pub async fn extract_first_frame(
    video: impl AsRef<Path>,
    dest: impl AsRef<Path>,
) -> MediaResult<()> {
    let video = video.as_ref();
    let dest = dest.as_ref();

    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let args = thumbnail_args(video, dest);
    debug!(video = %video.display(), dest = %dest.display(), "extracting thumbnail");

    let output = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(kind) = classify_tool_stderr(&stderr) {
            if kind == EmbedErrorKind::InvalidFileType {
                remove_quiet(video).await;
            }
            return Err(MediaError::probe(kind, last_stderr_line(&stderr)));
        }
        return Err(MediaError::ffmpeg_failed(
            "thumbnail extraction failed",
            Some(stderr.into_owned()),
            output.status.code(),
        ));
    }

    if !dest.exists() {
        remove_quiet(video).await;
        return Err(MediaError::probe(
            EmbedErrorKind::InvalidFileType,
            "failed to read the first frame",
        ));
    }

    Ok(())
}

fn thumbnail_args(video: &Path, dest: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-vf".to_string(),
        format!("scale={THUMBNAIL_SCALE_WIDTH}:-2"),
        "-frames:v".to_string(),
        "1".to_string(),
        dest.to_string_lossy().to_string(),
    ]
}
