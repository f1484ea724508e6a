//! Canonical clip handle.

use serde::{Deserialize, Serialize};

use crate::limits::{MAX_FILENAME_STEM_LEN, PUBLIC_URL_BASE};
use crate::service::Service;
use crate::utils::short_hash;

/// Length of the standard public clip identifier.
pub const CLYPPY_ID_LEN: usize = 8;

/// Longer identifier used for AI-extended derivatives, where clashing with an
/// existing clip id would overwrite the original on the CDN.
pub const CLYPPY_ID_LOW_COLLISION_LEN: usize = 12;

/// A canonical handle for one source video.
///
/// Created per recognized URL. Admission fills in `tokens_used` and
/// `duration_secs`; the delivery selector flips `uses_redirect`. The handle is
/// dropped when the request completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    /// Owning platform.
    pub service: Service,

    /// Platform-native slug or id, unique per service.
    pub source_id: String,

    /// Normalized URL the media tool will probe.
    pub source_url: String,

    /// Content-addressed public identifier.
    pub clyppy_id: String,

    /// Tokens charged at admission, refunded on downstream failure.
    #[serde(default)]
    pub tokens_used: u32,

    /// Duration in seconds, set at admission.
    #[serde(default)]
    pub duration_secs: u32,

    /// Platform-declared adult-content flag.
    #[serde(default)]
    pub is_nsfw: bool,

    /// Set by the selector when delivery is a 302 redirect.
    #[serde(default)]
    pub uses_redirect: bool,

    /// Optional override for the "view on platform" button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
}

impl Clip {
    /// Create a clip handle and derive its public identifier.
    pub fn new(service: Service, source_id: impl Into<String>, source_url: impl Into<String>) -> Self {
        let source_id = source_id.into();
        let clyppy_id = derive_clyppy_id(service, &source_id, CLYPPY_ID_LEN);
        Self {
            service,
            source_id,
            source_url: source_url.into(),
            clyppy_id,
            tokens_used: 0,
            duration_secs: 0,
            is_nsfw: service.is_nsfw(),
            uses_redirect: false,
            share_url: None,
        }
    }

    /// Set the NSFW flag (builder-style).
    pub fn with_nsfw(mut self, is_nsfw: bool) -> Self {
        self.is_nsfw = is_nsfw;
        self
    }

    /// Set the share-URL override (builder-style).
    pub fn with_share_url(mut self, share_url: impl Into<String>) -> Self {
        self.share_url = Some(share_url.into());
        self
    }

    /// Swap the identifier for the longer low-collision variant.
    ///
    /// Used before registering an AI-extended derivative so it never collides
    /// with the untouched source clip.
    pub fn regenerate_low_collision_id(&mut self) {
        self.clyppy_id = derive_clyppy_id(self.service, &self.source_id, CLYPPY_ID_LOW_COLLISION_LEN);
    }

    /// Public page URL. Redirect-delivered clips live under `/e/` so the
    /// frontend knows the embed is a 302 proxy.
    pub fn public_url(&self) -> String {
        if self.uses_redirect {
            format!("{PUBLIC_URL_BASE}/e/{}", self.clyppy_id)
        } else {
            format!("{PUBLIC_URL_BASE}/{}", self.clyppy_id)
        }
    }

    /// URL for the "View On {platform}" button.
    pub fn view_url(&self) -> &str {
        self.share_url.as_deref().unwrap_or(&self.source_url)
    }

    /// Working filename for downloaded bytes, `{service}_{clyppy_id}.mp4`
    /// (`{clyppy_id}.mp4` for the base fallback), stem clamped to 200 chars.
    pub fn working_filename(&self) -> String {
        let mut stem = if self.service == Service::Base {
            self.clyppy_id.clone()
        } else {
            format!("{}_{}", self.service.as_str(), self.clyppy_id)
        };
        stem.truncate(MAX_FILENAME_STEM_LEN);
        format!("{stem}.mp4")
    }

    /// Thumbnail filename alongside the working file.
    pub fn thumbnail_filename(&self) -> String {
        let mut stem = if self.service == Service::Base {
            self.clyppy_id.clone()
        } else {
            format!("{}_{}", self.service.as_str(), self.clyppy_id)
        };
        stem.truncate(MAX_FILENAME_STEM_LEN);
        format!("{stem}.webp")
    }
}

/// Derive the content-addressed identifier for `(service, source_id)`.
pub fn derive_clyppy_id(service: Service, source_id: &str, len: usize) -> String {
    short_hash(&format!("{}{}", service.as_str(), source_id), len)
}
