//! AI video extension subprocess.
//!
//! The generative models live behind a Python script; this module checks the
//! input bounds, runs the script with a hard timeout, and re-probes the
//! output. The caller owns charging, id regeneration and delivery.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use clyppy_media::probe_file;
use clyppy_models::limits::{
    EXTEND_DURATION_SECS, EXTEND_MAX_INPUT_SECS, EXTEND_MIN_INPUT_SECS, MEDIA_TOOL_TIMEOUT,
};
use clyppy_models::{EmbedErrorKind, ExtendModel};

use crate::error::{EmbedError, EmbedResult};

/// Output of a successful extension run.
#[derive(Debug)]
pub struct ExtendedVideo {
    pub path: PathBuf,
    pub duration_secs: u32,
    pub filesize_bytes: u64,
}

/// Check the input length against the accepted range.
pub fn check_extendable(duration_secs: u32) -> EmbedResult<()> {
    if duration_secs < EXTEND_MIN_INPUT_SECS {
        return Err(EmbedError::from(EmbedErrorKind::VideoTooShortForExtend));
    }
    if duration_secs > EXTEND_MAX_INPUT_SECS {
        return Err(EmbedError::from(EmbedErrorKind::VideoTooLongForExtend));
    }
    Ok(())
}

/// Output path next to the input: `{stem}_extended_{uuid8}.mp4`.
///
/// The random tag keeps a rerun from clobbering a previous extension of the
/// same clip.
pub fn extended_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clip".to_string());
    let uuid = Uuid::new_v4().simple().to_string();
    input.with_file_name(format!("{stem}_extended_{}.mp4", &uuid[..8]))
}

/// Argument list for the extension script.
pub fn extend_args(script: &Path, input: &Path, output: &Path, model: ExtendModel) -> Vec<String> {
    vec![
        script.to_string_lossy().into_owned(),
        input.to_string_lossy().into_owned(),
        "--output".to_string(),
        output.to_string_lossy().into_owned(),
        "--model".to_string(),
        model.as_str().to_string(),
        "--duration".to_string(),
        EXTEND_DURATION_SECS.to_string(),
    ]
}

/// Run the generative extension over a downloaded clip.
pub async fn extend_video(
    script: &Path,
    input: &Path,
    model: ExtendModel,
) -> EmbedResult<ExtendedVideo> {
    let before = probe_file(input).await?;
    let input_duration = before
        .duration_secs()
        .map(|d| d.round() as u32)
        .unwrap_or(0);
    check_extendable(input_duration)?;

    let python = which::which("python3")
        .or_else(|_| which::which("python"))
        .map_err(|_| {
            EmbedError::terminal(
                EmbedErrorKind::VideoExtensionFailed,
                "no python interpreter on PATH",
            )
        })?;

    let output = extended_output_path(input);
    let args = extend_args(script, input, &output, model);
    info!(
        input = %input.display(),
        model = model.as_str(),
        input_duration,
        "extending video"
    );

    let child = Command::new(python)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let out = match tokio::time::timeout(MEDIA_TOOL_TIMEOUT, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(input = %input.display(), "extension timed out");
            return Err(EmbedError::terminal(
                EmbedErrorKind::VideoExtensionFailed,
                format!("timed out after {}s", MEDIA_TOOL_TIMEOUT.as_secs()),
            ));
        }
    };

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        warn!(status = %out.status, stderr = %stderr, "extension subprocess failed");
        return Err(EmbedError::terminal(
            EmbedErrorKind::VideoExtensionFailed,
            format!("script exited with {}", out.status),
        ));
    }
    if !output.exists() {
        return Err(EmbedError::terminal(
            EmbedErrorKind::VideoExtensionFailed,
            "script produced no output file",
        ));
    }

    let after = probe_file(&output).await?;
    let duration_secs = after
        .duration_secs()
        .map(|d| d.round() as u32)
        .unwrap_or(input_duration + EXTEND_DURATION_SECS);

    info!(output = %output.display(), duration_secs, "extension complete");
    Ok(ExtendedVideo {
        filesize_bytes: after.size_bytes,
        path: output,
        duration_secs,
    })
}
