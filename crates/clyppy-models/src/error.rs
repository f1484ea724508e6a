//! Terminal error kinds and the user-facing message table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Footer appended to every user-visible error message.
pub const SUPPORT_FOOTER: &str = "\n\nNeed help? https://clyppy.io/support";

/// Every way an embed request can terminally fail.
///
/// The wire name (`as_str`) goes into the structured error report; the
/// user-visible text comes from the fixed table in [`user_message`].
///
/// [`user_message`]: EmbedErrorKind::user_message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbedErrorKind {
    /// URL parser did not recognize the site, or the probe said so.
    Unsupported,
    /// DNS or syntactic failure on the URL itself.
    UrlUnparsable,
    /// Remote said 404 / unavailable.
    VideoUnavailable,
    /// Remote said permission denied.
    NoPermissionToView,
    /// Remote returned 403 on download.
    Forbidden,
    /// Probe returned no duration.
    NoDuration,
    /// No duration even after the capped-download fallback.
    DefinitelyNoDuration,
    /// Local file exists but cannot be opened as video; the file is removed.
    InvalidFileType,
    /// Duration at or past the hard cap, or the token gate refused.
    VideoTooLong,
    /// Probe reported the remote is blocking our IP.
    IpBlocked,
    /// Object storage or the addclip endpoint rejected the upload.
    UploadFailed,
    /// AI extender precondition: input too long.
    VideoTooLongForExtend,
    /// AI extender precondition: input too short.
    VideoTooShortForExtend,
    /// Every generative model failed.
    VideoExtensionFailed,
    /// Catch-all.
    Unknown,
}

impl EmbedErrorKind {
    /// Wire name for the `error_type` field of error reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedErrorKind::Unsupported => "Unsupported",
            EmbedErrorKind::UrlUnparsable => "UrlUnparsable",
            EmbedErrorKind::VideoUnavailable => "VideoUnavailable",
            EmbedErrorKind::NoPermissionToView => "NoPermissionToView",
            EmbedErrorKind::Forbidden => "Forbidden",
            EmbedErrorKind::NoDuration => "NoDuration",
            EmbedErrorKind::DefinitelyNoDuration => "DefinitelyNoDuration",
            EmbedErrorKind::InvalidFileType => "InvalidFileType",
            EmbedErrorKind::VideoTooLong => "VideoTooLong",
            EmbedErrorKind::IpBlocked => "IPBlocked",
            EmbedErrorKind::UploadFailed => "UploadFailed",
            EmbedErrorKind::VideoTooLongForExtend => "VideoTooLongForExtend",
            EmbedErrorKind::VideoTooShortForExtend => "VideoTooShortForExtend",
            EmbedErrorKind::VideoExtensionFailed => "VideoExtensionFailed",
            EmbedErrorKind::Unknown => "Unknown",
        }
    }

    /// Fixed human message, without the support footer.
    pub fn user_message(&self) -> &'static str {
        match self {
            EmbedErrorKind::Unsupported => "Sorry, I can't embed videos from that site yet.",
            EmbedErrorKind::UrlUnparsable => {
                "That link doesn't look like a valid URL, or the site couldn't be reached."
            }
            EmbedErrorKind::VideoUnavailable => {
                "That video is unavailable. It may have been deleted or made private."
            }
            EmbedErrorKind::NoPermissionToView => "I don't have permission to view that video.",
            EmbedErrorKind::Forbidden => "The video host refused the request (403 Forbidden).",
            EmbedErrorKind::NoDuration | EmbedErrorKind::DefinitelyNoDuration => {
                "I couldn't read that video's duration, so I can't embed it."
            }
            EmbedErrorKind::InvalidFileType => "The downloaded file isn't a playable video.",
            EmbedErrorKind::VideoTooLong => "That video is too long to embed.",
            EmbedErrorKind::IpBlocked => {
                "The video host is blocking our server right now. Please try again later."
            }
            EmbedErrorKind::UploadFailed => {
                "Something went wrong while uploading your video. Please try again."
            }
            EmbedErrorKind::VideoTooLongForExtend => "That video is too long to extend.",
            EmbedErrorKind::VideoTooShortForExtend => "That video is too short to extend.",
            EmbedErrorKind::VideoExtensionFailed => {
                "The AI extension failed. Your tokens have been refunded."
            }
            EmbedErrorKind::Unknown => "Something went wrong. Please try again later.",
        }
    }

    /// Full user-visible reply text, footer included.
    pub fn user_reply(&self) -> String {
        format!("{}{SUPPORT_FOOTER}", self.user_message())
    }

    /// Whether charged tokens are refunded when this kind terminates a
    /// request. `VideoTooLong` is raised at the gate before any charge, so it
    /// never refunds.
    pub fn refunds_tokens(&self) -> bool {
        !matches!(self, EmbedErrorKind::VideoTooLong)
    }
}

impl fmt::Display for EmbedErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
