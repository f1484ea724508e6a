//! Cookie sources for authenticated yt-dlp calls.
//!
//! Some hosts (Twitter, YouTube, Dailymotion, Kick) gate their media
//! behind a login. The bot mounts a Firefox profile directory into the
//! container; the adapter locates the `*.default-release` profile under
//! it and hands it to yt-dlp. A plain Netscape cookies file is also
//! accepted when one is configured instead.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Minimum size for a plausible Netscape cookies file.
const MIN_COOKIES_FILE_SIZE: u64 = 50;

/// Where yt-dlp takes cookies from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieSource {
    /// Firefox profile directory; passed as `--cookies-from-browser firefox:<dir>`.
    FirefoxProfile(PathBuf),
    /// Validated Netscape-format cookies file; passed as `--cookies <file>`.
    NetscapeFile(PathBuf),
}

impl CookieSource {
    /// The yt-dlp argument pair selecting this source.
    pub fn to_args(&self) -> [String; 2] {
        match self {
            CookieSource::FirefoxProfile(dir) => [
                "--cookies-from-browser".to_string(),
                format!("firefox:{}", dir.display()),
            ],
            CookieSource::NetscapeFile(file) => {
                ["--cookies".to_string(), file.display().to_string()]
            }
        }
    }
}

/// Locate the `*.default-release` Firefox profile under `root`.
///
/// Returns `None` when the root is missing or holds no such profile;
/// downloads then proceed without cookies.
pub async fn discover_firefox_profile(root: impl AsRef<Path>) -> Option<CookieSource> {
    let root = root.as_ref();

    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(root = %root.display(), error = %e, "cookie profile root unreadable");
            return None;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(".default-release") {
            debug!(profile = %path.display(), "found firefox cookie profile");
            return Some(CookieSource::FirefoxProfile(path));
        }
    }

    debug!(root = %root.display(), "no default-release profile under cookie root");
    None
}

/// Validate and wrap a Netscape cookies file.
///
/// Rejects missing, tiny, or malformed files so yt-dlp never sees a
/// cookies argument it would fail on.
pub async fn netscape_file(path: impl AsRef<Path>) -> Option<CookieSource> {
    let path = path.as_ref();

    match fs::metadata(path).await {
        Ok(meta) if meta.len() >= MIN_COOKIES_FILE_SIZE => {}
        Ok(meta) => {
            debug!(
                path = %path.display(),
                size = meta.len(),
                "cookies file too small, skipping"
            );
            return None;
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cookies file unreadable");
            return None;
        }
    }

    match fs::read_to_string(path).await {
        Ok(content) if is_netscape_cookie_file(&content) => {
            Some(CookieSource::NetscapeFile(path.to_path_buf()))
        }
        Ok(_) => {
            warn!(path = %path.display(), "cookies file is not Netscape format, skipping");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read cookies file");
            None
        }
    }
}

/// Whether `content` looks like a Netscape cookies file: either the
/// standard header, or at least one tab-separated cookie line.
pub fn is_netscape_cookie_file(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File")
        || content.starts_with("# HTTP Cookie File")
    {
        return true;
    }

    content.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && line.split('\t').count() >= 6
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_discover_finds_default_release_profile() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("x9q2ab.default"))
            .await
            .unwrap();
        fs::create_dir(root.path().join("k3j7fz.default-release"))
            .await
            .unwrap();

        let source = discover_firefox_profile(root.path()).await.unwrap();
        match source {
            CookieSource::FirefoxProfile(dir) => {
                assert!(dir.ends_with("k3j7fz.default-release"));
            }
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_discover_none_without_profile() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("plain.default"))
            .await
            .unwrap();
        assert!(discover_firefox_profile(root.path()).await.is_none());
        assert!(discover_firefox_profile("/nonexistent/cookie/root")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_netscape_file_validation() {
        let dir = TempDir::new().unwrap();

        let good = dir.path().join("cookies.txt");
        let mut content = String::from("# Netscape HTTP Cookie File\n");
        content.push_str(".example.com\tTRUE\t/\tFALSE\t0\tsession\tabc123\n");
        fs::write(&good, &content).await.unwrap();
        assert!(netscape_file(&good).await.is_some());

        let tiny = dir.path().join("tiny.txt");
        fs::write(&tiny, "# x\n").await.unwrap();
        assert!(netscape_file(&tiny).await.is_none());

        let garbage = dir.path().join("garbage.txt");
        fs::write(&garbage, "a".repeat(200)).await.unwrap();
        assert!(netscape_file(&garbage).await.is_none());
    }

    #[test]
    fn test_is_netscape_cookie_file() {
        assert!(is_netscape_cookie_file("# Netscape HTTP Cookie File\n"));
        assert!(is_netscape_cookie_file("# HTTP Cookie File\n"));
        assert!(is_netscape_cookie_file(
            ".example.com\tTRUE\t/\tFALSE\t0\tname\tvalue"
        ));
        assert!(!is_netscape_cookie_file("just some text"));
        assert!(!is_netscape_cookie_file("# comment only\n# another\n"));
        assert!(!is_netscape_cookie_file(""));
    }

    #[test]
    fn test_to_args() {
        let profile = CookieSource::FirefoxProfile(PathBuf::from("/data/ff/p.default-release"));
        assert_eq!(
            profile.to_args(),
            [
                "--cookies-from-browser".to_string(),
                "firefox:/data/ff/p.default-release".to_string()
            ]
        );

        let file = CookieSource::NetscapeFile(PathBuf::from("/data/cookies.txt"));
        assert_eq!(
            file.to_args(),
            ["--cookies".to_string(), "/data/cookies.txt".to_string()]
        );
    }
}
