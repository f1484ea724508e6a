//! Per-guild feature toggles.

use async_trait::async_trait;

use crate::error::EmbedResult;

/// Read side of the guild-settings store.
///
/// Guild admins can switch quickembeds off per platform or per channel; the
/// store itself lives outside this crate and only this check is consumed
/// here. Slash commands bypass it: an explicit `/embed` is always honored.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuildSettings: Send + Sync {
    async fn is_platform_quickembed_enabled(
        &self,
        guild_id: Option<u64>,
        channel_id: u64,
        platform: &str,
    ) -> EmbedResult<bool>;
}

/// Settings source with everything switched on. Used for DMs and as the
/// default when no store is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllEnabled;

#[async_trait]
impl GuildSettings for AllEnabled {
    async fn is_platform_quickembed_enabled(
        &self,
        _guild_id: Option<u64>,
        _channel_id: u64,
        _platform: &str,
    ) -> EmbedResult<bool> {
        Ok(true)
    }
}
