//! Translation of media-tool stderr text into terminal error kinds.
//!
//! yt-dlp and ffmpeg report failures as free text on stderr. The bot
//! cares about a fixed set of them (video gone, permission walls, bad
//! URLs) and surfaces everything else as an opaque failure. The match
//! is substring-based and case-insensitive; first hit wins.

use clyppy_models::EmbedErrorKind;

/// Substring table, checked in order.
const STDERR_TABLE: &[(&[&str], EmbedErrorKind)] = &[
    (&["duration: n/a"], EmbedErrorKind::NoDuration),
    (
        &["http error 404", "http 404", "video unavailable"],
        EmbedErrorKind::VideoUnavailable,
    ),
    (
        &["permission", "unable to view"],
        EmbedErrorKind::NoPermissionToView,
    ),
    (
        &["unsupported url", "not a valid url"],
        EmbedErrorKind::Unsupported,
    ),
    (
        &["http error 403", "http 403: forbidden"],
        EmbedErrorKind::Forbidden,
    ),
    (
        &["name resolution", "service not known"],
        EmbedErrorKind::UrlUnparsable,
    ),
    (
        &["failed to read the first frame"],
        EmbedErrorKind::InvalidFileType,
    ),
    (&["ip address is blocked"], EmbedErrorKind::IpBlocked),
];

/// Map media-tool stderr text to a terminal error kind.
///
/// Returns `None` when nothing in the table matches; the caller bubbles
/// the raw failure up instead of guessing.
pub fn classify_tool_stderr(stderr: &str) -> Option<EmbedErrorKind> {
    let text = stderr.to_ascii_lowercase();
    for (needles, kind) in STDERR_TABLE {
        if needles.iter().any(|needle| text.contains(needle)) {
            return Some(*kind);
        }
    }
    None
}

/// Last non-empty stderr line, for compact error messages.
pub fn last_stderr_line(stderr: &str) -> &str {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("unknown error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_duration() {
        assert_eq!(
            classify_tool_stderr("WARNING: Duration: N/A"),
            Some(EmbedErrorKind::NoDuration)
        );
    }

    #[test]
    fn test_video_unavailable() {
        assert_eq!(
            classify_tool_stderr("ERROR: [youtube] abc: Video unavailable"),
            Some(EmbedErrorKind::VideoUnavailable)
        );
        assert_eq!(
            classify_tool_stderr("ERROR: unable to download video data: HTTP Error 404: Not Found"),
            Some(EmbedErrorKind::VideoUnavailable)
        );
    }

    #[test]
    fn test_no_permission() {
        assert_eq!(
            classify_tool_stderr("ERROR: You don't have permission to access this video"),
            Some(EmbedErrorKind::NoPermissionToView)
        );
        assert_eq!(
            classify_tool_stderr("ERROR: This post is private, unable to view"),
            Some(EmbedErrorKind::NoPermissionToView)
        );
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(
            classify_tool_stderr("ERROR: Unsupported URL: https://example.com/x"),
            Some(EmbedErrorKind::Unsupported)
        );
        assert_eq!(
            classify_tool_stderr("ERROR: 'foo' is not a valid URL"),
            Some(EmbedErrorKind::Unsupported)
        );
    }

    #[test]
    fn test_forbidden() {
        assert_eq!(
            classify_tool_stderr("ERROR: unable to download webpage: HTTP Error 403: Forbidden"),
            Some(EmbedErrorKind::Forbidden)
        );
    }

    #[test]
    fn test_url_unparsable() {
        assert_eq!(
            classify_tool_stderr("ERROR: Temporary failure in name resolution"),
            Some(EmbedErrorKind::UrlUnparsable)
        );
        assert_eq!(
            classify_tool_stderr("ERROR: Name or service not known"),
            Some(EmbedErrorKind::UrlUnparsable)
        );
    }

    #[test]
    fn test_invalid_file_type() {
        assert_eq!(
            classify_tool_stderr("failed to read the first frame of output.mp4"),
            Some(EmbedErrorKind::InvalidFileType)
        );
    }

    #[test]
    fn test_ip_blocked() {
        assert_eq!(
            classify_tool_stderr(
                "ERROR: [Instagram] It is highly likely that the IP address is blocked"
            ),
            Some(EmbedErrorKind::IpBlocked)
        );
    }

    #[test]
    fn test_unmatched_bubbles_up() {
        assert_eq!(classify_tool_stderr("ERROR: something exploded"), None);
        assert_eq!(classify_tool_stderr(""), None);
    }

    #[test]
    fn test_first_match_wins() {
        // 404 is listed before the broad "permission" needle.
        assert_eq!(
            classify_tool_stderr("HTTP Error 404: permission denied page"),
            Some(EmbedErrorKind::VideoUnavailable)
        );
    }

    #[test]
    fn test_last_stderr_line() {
        assert_eq!(
            last_stderr_line("WARNING: a\nERROR: the real reason\n\n"),
            "ERROR: the real reason"
        );
        assert_eq!(last_stderr_line(""), "unknown error");
    }
}
