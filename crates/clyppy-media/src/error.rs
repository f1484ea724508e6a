//! Media adapter error types.

use std::path::PathBuf;
use thiserror::Error;

use clyppy_models::EmbedErrorKind;

/// Errors from the external media tools and the shard lock.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    /// Probe failure the stderr translator recognized.
    #[error("probe failed ({kind}): {message}")]
    Probe {
        kind: EmbedErrorKind,
        message: String,
    },

    /// Download failure the stderr translator recognized.
    #[error("download failed ({kind}): {message}")]
    Download {
        kind: EmbedErrorKind,
        message: String,
    },

    /// yt-dlp exited non-zero with stderr nothing in the table matched.
    #[error("yt-dlp failed: {message}")]
    ToolFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("FFmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),

    #[error("no free download slot for {platform} after {waited_secs}s")]
    ShardLockTimeout { platform: String, waited_secs: u64 },

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a probe error with a translated kind.
    pub fn probe(kind: EmbedErrorKind, message: impl Into<String>) -> Self {
        Self::Probe {
            kind,
            message: message.into(),
        }
    }

    /// Create a download error with a translated kind.
    pub fn download(kind: EmbedErrorKind, message: impl Into<String>) -> Self {
        Self::Download {
            kind,
            message: message.into(),
        }
    }

    /// Create an untranslated tool failure.
    pub fn tool_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ToolFailed {
            message: message.into(),
            stderr,
        }
    }

    /// Create an FFmpeg error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// The user-facing kind this failure maps to, when one was translated.
    /// Untranslated failures map to `None`; callers report those as
    /// [`EmbedErrorKind::Unknown`].
    pub fn kind(&self) -> Option<EmbedErrorKind> {
        match self {
            Self::Probe { kind, .. } | Self::Download { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;
