//! yt-dlp subprocess adapter: remote metadata probe and full download.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use clyppy_models::limits::MEDIA_TOOL_TIMEOUT;

use crate::classify::{classify_tool_stderr, last_stderr_line};
use crate::cookies::CookieSource;
use crate::error::{MediaError, MediaResult};

/// User-agent sent with every tool invocation.
const TOOL_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// mp4-preferring format chain used for downloads.
const MP4_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// Options for a metadata probe.
#[derive(Debug, Clone, Default)]
pub struct ProbeOptions {
    /// Cookie source for login-walled hosts.
    pub cookies: Option<CookieSource>,
}

impl ProbeOptions {
    pub fn with_cookies(mut self, cookies: Option<CookieSource>) -> Self {
        self.cookies = cookies;
        self
    }
}

/// Options for a full download.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Format chain; defaults to the mp4-preferring chain.
    pub format: String,
    /// Skip files larger than this many bytes.
    pub max_filesize: Option<u64>,
    /// Cookie source for login-walled hosts.
    pub cookies: Option<CookieSource>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            format: MP4_FORMAT.to_string(),
            max_filesize: None,
            cookies: None,
        }
    }
}

impl DownloadOptions {
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_max_filesize(mut self, bytes: u64) -> Self {
        self.max_filesize = Some(bytes);
        self
    }

    pub fn with_cookies(mut self, cookies: Option<CookieSource>) -> Self {
        self.cookies = cookies;
        self
    }
}

/// Metadata returned by a probe.
#[derive(Debug, Clone, Default)]
pub struct ProbedMedia {
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub filesize: Option<u64>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    /// Direct URL of the selected format, when the extractor exposes one.
    pub format_url: Option<String>,
    pub thumbnail: Option<String>,
    pub extractor: Option<String>,
}

impl ProbedMedia {
    /// Usable duration, treating zero and negatives as absent.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.filter(|d| *d > 0.0)
    }

    /// Usable size hint, treating zero as absent.
    pub fn size_hint(&self) -> Option<u64> {
        self.filesize.filter(|s| *s > 0)
    }

    /// Whether the selected format is an HLS playlist rather than a file.
    pub fn is_hls(&self) -> bool {
        self.format_url
            .as_deref()
            .is_some_and(|url| url.contains(".m3u8"))
    }
}

/// Raw shape of the `--dump-single-json` document. Only the fields the
/// pipeline reads; everything else is ignored.
#[derive(Debug, Deserialize)]
struct RawProbe {
    duration: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
    title: Option<String>,
    uploader: Option<String>,
    url: Option<String>,
    thumbnail: Option<String>,
    extractor: Option<String>,
}

impl From<RawProbe> for ProbedMedia {
    fn from(raw: RawProbe) -> Self {
        // filesize is exact when present; filesize_approx is the fallback.
        let filesize = raw
            .filesize
            .or_else(|| raw.filesize_approx.map(|s| s as u64));
        Self {
            duration: raw.duration,
            width: raw.width.map(|w| w as u32),
            height: raw.height.map(|h| h as u32),
            filesize,
            title: raw.title,
            uploader: raw.uploader,
            format_url: raw.url,
            thumbnail: raw.thumbnail,
            extractor: raw.extractor,
        }
    }
}

/// Handle to the yt-dlp binary.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    timeout: Duration,
}

impl YtDlp {
    /// Create the adapter, verifying the binary is on PATH.
    pub fn new() -> MediaResult<Self> {
        let program = which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)?;
        Ok(Self {
            program,
            timeout: MEDIA_TOOL_TIMEOUT,
        })
    }

    /// Use an explicit binary path, skipping the PATH lookup.
    pub fn at(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: MEDIA_TOOL_TIMEOUT,
        }
    }

    /// Override the subprocess hard timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe a URL for metadata without fetching any media bytes.
    pub async fn probe(&self, url: &str, opts: &ProbeOptions) -> MediaResult<ProbedMedia> {
        let args = probe_args(url, opts);
        let output = self.run(&args).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            debug!(url = %url, stderr = %stderr, "yt-dlp probe failed");
            if let Some(kind) = classify_tool_stderr(&stderr) {
                return Err(MediaError::probe(kind, last_stderr_line(&stderr)));
            }
            return Err(MediaError::tool_failed(
                format!("probe exited with {}", output.status),
                Some(stderr.into_owned()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let doc = stdout.trim();
        if doc.is_empty() || doc == "null" {
            // --ignore-errors can exit zero with nothing extracted.
            if let Some(kind) = classify_tool_stderr(&stderr) {
                return Err(MediaError::probe(kind, last_stderr_line(&stderr)));
            }
            return Err(MediaError::tool_failed(
                "probe produced no metadata",
                Some(stderr.into_owned()),
            ));
        }

        let media = parse_probe_output(doc)?;
        debug!(
            url = %url,
            duration = ?media.duration,
            filesize = ?media.filesize,
            extractor = ?media.extractor,
            "probed media"
        );
        Ok(media)
    }

    /// Download a URL to `dest`.
    ///
    /// The destination is removed on a translated `InvalidFileType`
    /// failure so a broken partial file never reaches the uploader.
    pub async fn download(
        &self,
        url: &str,
        dest: impl AsRef<Path>,
        opts: &DownloadOptions,
    ) -> MediaResult<PathBuf> {
        let dest = dest.as_ref();
        let args = download_args(url, dest, opts);

        info!(url = %url, dest = %dest.display(), "downloading media");
        let output = self.run(&args).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            debug!(url = %url, stderr = %stderr, "yt-dlp download failed");
            if let Some(kind) = classify_tool_stderr(&stderr) {
                if kind == clyppy_models::EmbedErrorKind::InvalidFileType {
                    crate::fs_utils::remove_quiet(dest).await;
                }
                return Err(MediaError::download(kind, last_stderr_line(&stderr)));
            }
            return Err(MediaError::tool_failed(
                format!("download exited with {}", output.status),
                Some(stderr.into_owned()),
            ));
        }

        if !dest.exists() {
            // A max-filesize skip exits zero without writing anything.
            warn!(url = %url, dest = %dest.display(), "download produced no file");
            return Err(MediaError::tool_failed(
                "download produced no file",
                Some(stderr.into_owned()),
            ));
        }

        let size = tokio::fs::metadata(dest).await?.len();
        info!(
            dest = %dest.display(),
            size_mb = size as f64 / (1024.0 * 1024.0),
            "download complete"
        );
        Ok(dest.to_path_buf())
    }

    async fn run(&self, args: &[String]) -> MediaResult<std::process::Output> {
        debug!(args = ?args, "running yt-dlp");
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "yt-dlp timed out");
                Err(MediaError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

fn probe_args(url: &str, opts: &ProbeOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "--dump-single-json",
        "--skip-download",
        "--no-warnings",
        "--no-playlist",
        "--ignore-errors",
        "--user-agent",
        TOOL_USER_AGENT,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(cookies) = &opts.cookies {
        args.extend(cookies.to_args());
    }
    args.push(url.to_string());
    args
}

fn download_args(url: &str, dest: &Path, opts: &DownloadOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "--no-warnings",
        "--no-playlist",
        "--no-progress",
        "--user-agent",
        TOOL_USER_AGENT,
        "-f",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(opts.format.clone());

    if let Some(cap) = opts.max_filesize {
        args.push("--max-filesize".to_string());
        args.push(cap.to_string());
    }
    if let Some(cookies) = &opts.cookies {
        args.extend(cookies.to_args());
    }

    args.push("-o".to_string());
    args.push(dest.to_string_lossy().to_string());
    args.push(url.to_string());
    args
}

fn parse_probe_output(doc: &str) -> MediaResult<ProbedMedia> {
    let raw: RawProbe = serde_json::from_str(doc)?;
    Ok(raw.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clyppy_models::limits::DOWNLOAD_MAX_FILESIZE_BYTES;

    #[test]
    fn test_probe_args_shape() {
        let args = probe_args("https://youtu.be/abc", &ProbeOptions::default());
        assert!(args.contains(&"--dump-single-json".to_string()));
        assert!(args.contains(&"--skip-download".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--ignore-errors".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }

    #[test]
    fn test_probe_args_with_cookies() {
        let opts = ProbeOptions::default().with_cookies(Some(CookieSource::FirefoxProfile(
            PathBuf::from("/data/ff/x.default-release"),
        )));
        let args = probe_args("https://x.com/u/status/1", &opts);
        let pos = args
            .iter()
            .position(|a| a == "--cookies-from-browser")
            .unwrap();
        assert_eq!(args[pos + 1], "firefox:/data/ff/x.default-release");
    }

    #[test]
    fn test_download_args_shape() {
        let opts = DownloadOptions::default().with_max_filesize(DOWNLOAD_MAX_FILESIZE_BYTES);
        let args = download_args(
            "https://vimeo.com/123",
            Path::new("/tmp/work/vimeo_abc123.mp4"),
            &opts,
        );

        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], MP4_FORMAT);

        let cap = args.iter().position(|a| a == "--max-filesize").unwrap();
        assert_eq!(args[cap + 1], DOWNLOAD_MAX_FILESIZE_BYTES.to_string());

        let o = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o + 1], "/tmp/work/vimeo_abc123.mp4");
        assert_eq!(args.last().map(String::as_str), Some("https://vimeo.com/123"));
    }

    #[test]
    fn test_parse_probe_output_full() {
        let doc = r#"{
            "id": "abc",
            "title": "A clip",
            "duration": 42.5,
            "width": 1920,
            "height": 1080,
            "filesize": 123456,
            "url": "https://cdn.example.com/v.mp4",
            "thumbnail": "https://cdn.example.com/t.jpg",
            "extractor": "twitch:clips"
        }"#;
        let media = parse_probe_output(doc).unwrap();
        assert_eq!(media.duration_secs(), Some(42.5));
        assert_eq!(media.width, Some(1920));
        assert_eq!(media.height, Some(1080));
        assert_eq!(media.size_hint(), Some(123456));
        assert_eq!(media.title.as_deref(), Some("A clip"));
        assert!(!media.is_hls());
    }

    #[test]
    fn test_parse_probe_output_approx_and_float_dims() {
        let doc = r#"{
            "duration": 10,
            "width": 576.0,
            "height": 1024.0,
            "filesize_approx": 9999.9,
            "url": "https://cdn.example.com/master.m3u8?tok=1"
        }"#;
        let media = parse_probe_output(doc).unwrap();
        assert_eq!(media.duration_secs(), Some(10.0));
        assert_eq!(media.width, Some(576));
        assert_eq!(media.filesize, Some(9999));
        assert!(media.is_hls());
    }

    #[test]
    fn test_parse_probe_output_sparse() {
        let media = parse_probe_output(r#"{"id": "x"}"#).unwrap();
        assert_eq!(media.duration_secs(), None);
        assert_eq!(media.size_hint(), None);
        assert!(!media.is_hls());
    }

    #[test]
    fn test_zero_values_are_absent() {
        let media = parse_probe_output(r#"{"duration": 0, "filesize": 0}"#).unwrap();
        assert_eq!(media.duration_secs(), None);
        assert_eq!(media.size_hint(), None);
    }

    #[test]
    fn test_parse_probe_output_rejects_garbage() {
        assert!(parse_probe_output("not json").is_err());
    }
}
