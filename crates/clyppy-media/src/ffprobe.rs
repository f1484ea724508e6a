//! FFprobe inspection of downloaded files.
//!
//! Used as the duration fallback: when the remote probe reports no
//! usable duration the pipeline downloads a capped copy and reads the
//! real duration from the local file.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// What the pipeline reads off a local file.
#[derive(Debug, Clone)]
pub struct LocalProbe {
    /// Duration in seconds.
    pub duration: f64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// File size in bytes.
    pub size_bytes: u64,
}

impl LocalProbe {
    /// Usable duration, treating zero as absent.
    pub fn duration_secs(&self) -> Option<f64> {
        (self.duration > 0.0).then_some(self.duration)
    }
}

/// FFprobe JSON output shape.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe a local file.
pub async fn probe_file(path: impl AsRef<Path>) -> MediaResult<LocalProbe> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("ffprobe exited with {}", output.status),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    parse_probe(probe, path)
}

fn parse_probe(probe: FfprobeOutput, path: &Path) -> MediaResult<LocalProbe> {
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::NoVideoStream(path.to_path_buf()))?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size_bytes = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(LocalProbe {
        duration,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> FfprobeOutput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_probe() {
        let probe = doc(
            r#"{
                "format": {"duration": "12.480000", "size": "345678"},
                "streams": [
                    {"codec_type": "audio"},
                    {"codec_type": "video", "width": 1280, "height": 720}
                ]
            }"#,
        );
        let info = parse_probe(probe, Path::new("clip.mp4")).unwrap();
        assert!((info.duration - 12.48).abs() < 0.001);
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.size_bytes, 345678);
        assert_eq!(info.duration_secs(), Some(12.48));
    }

    #[test]
    fn test_parse_probe_no_video_stream() {
        let probe = doc(r#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#);
        let err = parse_probe(probe, Path::new("audio.m4a")).unwrap_err();
        assert!(matches!(err, MediaError::NoVideoStream(_)));
    }

    #[test]
    fn test_parse_probe_missing_duration() {
        let probe = doc(r#"{"format": {}, "streams": [{"codec_type": "video"}]}"#);
        let info = parse_probe(probe, Path::new("clip.mp4")).unwrap();
        assert_eq!(info.duration_secs(), None);
        assert_eq!(info.size_bytes, 0);
    }

    #[tokio::test]
    async fn test_probe_file_missing() {
        let err = probe_file("/nonexistent/clip.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
