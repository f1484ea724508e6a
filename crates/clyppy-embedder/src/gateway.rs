//! Chat-gateway boundary.
//!
//! The pipeline never talks the gateway protocol itself. The hosting binary
//! adapts whatever client library it uses to [`Gateway`], and the
//! orchestrator stays testable against a mock.

use async_trait::async_trait;
use std::path::PathBuf;

use clyppy_models::limits::PUBLIC_URL_BASE;
use clyppy_models::Clip;

use crate::error::EmbedResult;

/// Permissions the bot holds in one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelPermissions {
    pub send_messages: bool,
    pub embed_links: bool,
    pub read_history: bool,
    pub send_in_threads: bool,
    pub attach_files: bool,
}

impl ChannelPermissions {
    pub fn all() -> Self {
        Self {
            send_messages: true,
            embed_links: true,
            read_history: true,
            send_in_threads: true,
            attach_files: true,
        }
    }

    /// Whether a quickembed reply can go out at all. Thread posts
    /// additionally need the thread-send bit.
    pub fn can_reply(&self, in_thread: bool) -> bool {
        self.send_messages
            && self.embed_links
            && self.read_history
            && (!in_thread || self.send_in_threads)
    }
}

/// A link button under the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonLink {
    pub label: String,
    pub url: String,
}

impl ButtonLink {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// One outgoing reply: text or an attached file, plus the button row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub text: String,
    pub file: Option<PathBuf>,
    pub buttons: Vec<ButtonLink>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<ButtonLink>) -> Self {
        self.buttons = buttons;
        self
    }
}

/// The slice of the chat platform the pipeline consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Permissions the bot holds in `channel_id`.
    async fn channel_permissions(&self, channel_id: u64) -> EmbedResult<ChannelPermissions>;

    /// Whether the channel is marked age-restricted.
    async fn is_nsfw_channel(&self, channel_id: u64) -> EmbedResult<bool>;

    /// Reply to a message. Returns the id of the new message.
    async fn reply(&self, channel_id: u64, message_id: u64, reply: Reply) -> EmbedResult<u64>;

    /// Plain channel send, used when the reply target is gone.
    async fn send(&self, channel_id: u64, reply: Reply) -> EmbedResult<u64>;

    /// Edit the deferred response of a slash interaction.
    async fn edit_deferred(
        &self,
        application_id: u64,
        interaction_token: &str,
        reply: Reply,
    ) -> EmbedResult<u64>;
}

/// Standard button row: the clip page, the platform source, and a direct
/// download link when the clip was rehosted on our CDN.
pub fn standard_buttons(clip: &Clip, cdn_url: Option<&str>) -> Vec<ButtonLink> {
    let mut buttons = vec![
        ButtonLink::new("Info", format!("{PUBLIC_URL_BASE}/{}", clip.clyppy_id)),
        ButtonLink::new(
            format!("View On {}", clip.service.display_name()),
            clip.view_url(),
        ),
    ];
    if let Some(url) = cdn_url {
        buttons.push(ButtonLink::new("Download", url));
    }
    buttons
}
