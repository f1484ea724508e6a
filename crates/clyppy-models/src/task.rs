//! Pending tasks persisted across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::guild::GuildContext;
use crate::limits::PENDING_TASK_TTL;

/// Generative model the AI extension subprocess should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtendModel {
    Sora,
    Veo,
}

impl ExtendModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtendModel::Sora => "sora",
            ExtendModel::Veo => "veo",
        }
    }
}

/// A quickembed request captured before shutdown, replayable any time.
///
/// Carries everything needed to re-address the reply without the original
/// gateway event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickembedTask {
    pub url: String,
    pub channel_id: u64,
    /// Message to reply to.
    pub message_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub guild: GuildContext,
    pub created_at: DateTime<Utc>,
}

impl QuickembedTask {
    pub fn new(
        url: impl Into<String>,
        channel_id: u64,
        message_id: u64,
        author_id: u64,
        author_name: impl Into<String>,
        guild: GuildContext,
    ) -> Self {
        Self {
            url: url.into(),
            channel_id,
            message_id,
            author_id,
            author_name: author_name.into(),
            guild,
            created_at: Utc::now(),
        }
    }
}

/// A deferred slash-command request. The interaction token it carries expires
/// 15 minutes after creation; stale tasks are dropped on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlashCommandTask {
    pub url: String,
    pub application_id: u64,
    /// Token for editing the deferred response via the webhook endpoint.
    pub interaction_token: String,
    pub channel_id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub guild: GuildContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extend_with: Option<ExtendModel>,
    pub created_at: DateTime<Utc>,
}

impl SlashCommandTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        url: impl Into<String>,
        application_id: u64,
        interaction_token: impl Into<String>,
        channel_id: u64,
        user_id: u64,
        user_name: impl Into<String>,
        guild: GuildContext,
    ) -> Self {
        Self {
            url: url.into(),
            application_id,
            interaction_token: interaction_token.into(),
            channel_id,
            user_id,
            user_name: user_name.into(),
            guild,
            extend_with: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_extend(mut self, model: ExtendModel) -> Self {
        self.extend_with = Some(model);
        self
    }

    /// Whether the interaction token has outlived its TTL at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_seconds() >= PENDING_TASK_TTL.as_secs() as i64
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Tagged union stored in the pending-task file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingTask {
    Quickembed(QuickembedTask),
    Slash(SlashCommandTask),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn slash_task() -> SlashCommandTask {
        SlashCommandTask::new(
            "https://youtu.be/abc",
            111,
            "tok_abc",
            222,
            333,
            "caller",
            GuildContext::guild(444, "G"),
        )
    }

    #[test]
    fn test_slash_task_expiry_boundary() {
        let task = slash_task();
        let now = task.created_at;
        assert!(!task.is_expired_at(now));
        assert!(!task.is_expired_at(now + Duration::seconds(14 * 60)));
        assert!(task.is_expired_at(now + Duration::seconds(15 * 60)));
        assert!(task.is_expired_at(now + Duration::hours(2)));
    }

    #[test]
    fn test_quickembed_task_never_expires() {
        let task = QuickembedTask::new("https://kick.com/u/clips/clip_1", 1, 2, 3, "a", GuildContext::dm());
        // Quickembeds carry no token; only the serde shape matters.
        let json = serde_json::to_string(&PendingTask::Quickembed(task.clone())).unwrap();
        let back: PendingTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PendingTask::Quickembed(task));
    }

    #[test]
    fn test_extend_model_wire_names() {
        assert_eq!(ExtendModel::Sora.as_str(), "sora");
        assert_eq!(ExtendModel::Veo.as_str(), "veo");
        let task = slash_task().with_extend(ExtendModel::Veo);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["extend_with"], serde_json::json!("veo"));
    }
}
