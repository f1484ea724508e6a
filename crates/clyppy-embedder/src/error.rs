//! Pipeline error type.

use thiserror::Error;

use clyppy_api::ApiError;
use clyppy_media::MediaError;
use clyppy_models::EmbedErrorKind;
use clyppy_platforms::PlatformError;
use clyppy_queue::QueueError;
use clyppy_storage::StorageError;

pub type EmbedResult<T> = Result<T, EmbedError>;

/// Everything that can stop an embed request.
///
/// `Terminal` is the normal failure shape: a translated [`EmbedErrorKind`]
/// plus detail for the error report. Wrapped sub-crate errors keep their own
/// detail and are mapped to a kind only at reporting time.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("{kind}: {message}")]
    Terminal {
        kind: EmbedErrorKind,
        message: String,
    },

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmbedError {
    /// Create a terminal error with a translated kind.
    pub fn terminal(kind: EmbedErrorKind, message: impl Into<String>) -> Self {
        Self::Terminal {
            kind,
            message: message.into(),
        }
    }

    /// Create a gateway error.
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway(message.into())
    }

    /// Create a configuration error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The user-facing kind this failure maps to. Untranslated failures
    /// collapse to `Unknown`; storage failures surface as `UploadFailed`.
    pub fn kind(&self) -> EmbedErrorKind {
        match self {
            Self::Terminal { kind, .. } => *kind,
            Self::Media(e) => e.kind().unwrap_or(EmbedErrorKind::Unknown),
            Self::Storage(_) => EmbedErrorKind::UploadFailed,
            _ => EmbedErrorKind::Unknown,
        }
    }

    /// Whether the fixed message table covers this failure. Unhandled
    /// failures are flagged in the error report for triage.
    pub fn is_handled(&self) -> bool {
        match self {
            Self::Terminal { .. } => true,
            Self::Media(e) => e.kind().is_some(),
            Self::Storage(_) => true,
            _ => false,
        }
    }
}

impl From<EmbedErrorKind> for EmbedError {
    fn from(kind: EmbedErrorKind) -> Self {
        Self::Terminal {
            kind,
            message: kind.user_message().to_string(),
        }
    }
}
