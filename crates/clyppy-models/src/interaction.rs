//! Interaction records published to the backing API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::delivery::DownloadResponse;
use crate::guild::GuildContext;

/// Immutable event row created after a successful embed.
///
/// The server may answer with a different public id (cache busting); the
/// orchestrator must accept the override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionPublish {
    pub video_url: String,
    pub platform: String,
    pub clip_id: String,
    pub original_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    pub duration: u32,
    pub is_redirect: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    /// CDN or platform thumbnail, absent for non-Twitch redirect clips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub is_nsfw: bool,
    pub user_id: u64,
    pub username: String,
    pub channel_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<u64>,
    pub guild_name: String,
    pub response_time_seconds: f64,
}

impl InteractionPublish {
    /// Assemble the row from the pipeline artifacts.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        clip: &Clip,
        response: &DownloadResponse,
        user_id: u64,
        username: impl Into<String>,
        channel_id: u64,
        guild: &GuildContext,
        response_time_seconds: f64,
    ) -> Self {
        Self {
            video_url: clip.source_url.clone(),
            platform: clip.service.as_str().to_string(),
            clip_id: clip.clyppy_id.clone(),
            original_id: clip.source_id.clone(),
            remote_url: response.remote_url().map(str::to_string),
            width: response.width,
            height: response.height,
            filesize: response.filesize_bytes,
            duration: response.duration_secs,
            is_redirect: response.is_redirect,
            expires_at: response.expires_at,
            uploader: response.uploader.clone(),
            thumbnail_url: None,
            is_nsfw: clip.is_nsfw,
            user_id,
            username: username.into(),
            channel_id,
            guild_id: guild.api_id(),
            guild_name: guild.name.clone(),
            response_time_seconds,
        }
    }

    pub fn with_thumbnail_url(mut self, url: Option<String>) -> Self {
        self.thumbnail_url = url;
        self
    }
}

/// Edit variant, sent once to patch the measured response time and the id of
/// the reply message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEdit {
    pub edit: bool,
    pub id: i64,
    pub response_time_seconds: f64,
    pub msg_id: u64,
}

impl InteractionEdit {
    pub fn new(id: i64, response_time_seconds: f64, msg_id: u64) -> Self {
        Self {
            edit: true,
            id,
            response_time_seconds,
            msg_id,
        }
    }
}

/// Structured error event for `/api/clips/publish/error/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error_type: String,
    pub error_message: String,
    pub video_url: String,
    pub video_platform: String,
    pub username: String,
    pub user_id: u64,
    /// False when the failure escaped the fixed message table.
    pub handled: bool,
}
