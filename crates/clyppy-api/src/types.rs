//! Response payload shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `GET /api/clips/get-status/` response.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub exists: bool,
}

/// Stored clip metadata from `GET /api/clips/get/{clyppy_id}`.
///
/// Everything except the id is optional; older rows predate several
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipRecord {
    pub clip_id: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub is_redirect: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_nsfw: bool,
}

impl ClipRecord {
    /// Whether the stored remote URL has passed its expiry hint.
    /// Expired rows are treated as absent and the clip re-resolved.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t <= Utc::now())
    }
}

/// `POST /api/clips/publish/` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    #[serde(default)]
    pub id: Option<i64>,
    /// Server-chosen public id; overrides the locally derived one when set.
    #[serde(default)]
    pub video_page_id: Option<String>,
}

/// Per-chunk (and one-shot) `POST /api/addclip/` response. The last
/// chunk's `success` is authoritative.
#[derive(Debug, Clone, Deserialize)]
pub struct AddClipResponse {
    pub success: bool,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub finished: bool,
}

/// Bare `{success}` acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

/// `GET /api/tokens/get/` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenBalance {
    pub tokens: i64,
}

/// `POST /api/tokens/subtract/` response. `success` means the call was
/// processed; `user_success` means the balance covered it.
#[derive(Debug, Clone, Deserialize)]
pub struct SubtractResponse {
    pub success: bool,
    pub user_success: bool,
    #[serde(default)]
    pub tokens: Option<i64>,
}
