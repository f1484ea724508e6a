//! Delivery strategy hints and resolver output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a platform prefers its clips delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStrategy {
    /// Serve the third-party CDN URL behind a 302 redirect; no bytes pass
    /// through this host.
    Redirect,
    /// Download, attach when the file fits the chat limit, otherwise rehost
    /// on our CDN.
    AttachOrReupload,
    /// Attachment is the only acceptable delivery.
    AttachOnly,
    /// Download and rehost unconditionally; the platform's own URLs are
    /// unusable in chat embeds.
    AlwaysReupload,
}

/// Where the resolved artifact lives. Exactly one of the two by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    /// Deliverable by URL, either a third-party CDN or our own.
    Remote { url: String },
    /// Downloaded bytes in the working directory.
    Local { path: PathBuf },
}

/// Output of the delivery-path selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// Resolved artifact location.
    pub source: MediaSource,

    /// Duration in seconds, when known.
    #[serde(default)]
    pub duration_secs: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize_bytes: Option<u64>,

    /// Title reported by the source, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_name: Option<String>,

    /// Uploader handle reported by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,

    /// True iff the file fits the chat limit and the caller may attach.
    #[serde(default)]
    pub can_be_attached: bool,

    /// True when `source` is a third-party CDN URL served via 302.
    /// Implies `Remote`.
    #[serde(default)]
    pub is_redirect: bool,

    /// For ephemeral remote URLs, when the URL is expected to die.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl DownloadResponse {
    /// A response delivering a remote URL (CDN reupload or platform URL).
    pub fn remote(url: impl Into<String>) -> Self {
        Self::from_source(MediaSource::Remote { url: url.into() })
    }

    /// A response delivering a third-party URL behind a 302 redirect.
    pub fn redirect(url: impl Into<String>) -> Self {
        let mut resp = Self::remote(url);
        resp.is_redirect = true;
        resp
    }

    /// A response delivering a local file.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::from_source(MediaSource::Local { path: path.into() })
    }

    fn from_source(source: MediaSource) -> Self {
        Self {
            source,
            duration_secs: 0,
            width: None,
            height: None,
            filesize_bytes: None,
            video_name: None,
            uploader: None,
            can_be_attached: false,
            is_redirect: false,
            expires_at: None,
        }
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_filesize(mut self, bytes: Option<u64>) -> Self {
        self.filesize_bytes = bytes;
        self
    }

    pub fn with_video_name(mut self, name: Option<String>) -> Self {
        self.video_name = name;
        self
    }

    pub fn with_uploader(mut self, uploader: Option<String>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn with_can_be_attached(mut self, can: bool) -> Self {
        self.can_be_attached = can;
        self
    }

    /// Remote URL, when delivery is remote.
    pub fn remote_url(&self) -> Option<&str> {
        match &self.source {
            MediaSource::Remote { url } => Some(url),
            MediaSource::Local { .. } => None,
        }
    }

    /// Local path, when delivery is a downloaded file.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.source {
            MediaSource::Remote { .. } => None,
            MediaSource::Local { path } => Some(path),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.source, MediaSource::Local { .. })
    }
}
