//! The platform capability trait.

use async_trait::async_trait;
use std::time::Duration;

use clyppy_models::limits::DEFAULT_DOWNLOAD_TIMEOUT;
use clyppy_models::{DeliveryStrategy, Service};

use crate::error::PlatformResult;

/// User-agent presented when resolving share links and mirror redirects.
/// Some hosts only hand out embeddable responses to chat-bot crawlers.
pub const DISCORDBOT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Discordbot/2.0; +https://discordapp.com)";

/// Shared HTTP context for canonicalization fetches.
#[derive(Clone)]
pub struct ResolveContext {
    pub http: reqwest::Client,
}

impl ResolveContext {
    pub fn new() -> PlatformResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(DISCORDBOT_USER_AGENT)
            .build()
            .map_err(crate::error::PlatformError::Http)?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// One supported video platform.
///
/// `matches` is a cheap prefilter; `parse` is authoritative and returns the
/// platform-native id. `canonicalize` builds the URL the media tool will
/// probe, fetching over HTTP where the input is an opaque share link.
#[async_trait]
pub trait Platform: Send + Sync {
    fn service(&self) -> Service;

    /// Cheap recognition test.
    fn matches(&self, url: &str) -> bool;

    /// Extract the platform-native id; `None` when the URL is not ours.
    fn parse(&self, url: &str) -> Option<String>;

    /// Build the normalized URL for the extractor. Default implementations
    /// are pure; share-link platforms override with an HTTP fetch.
    async fn canonicalize(
        &self,
        ctx: &ResolveContext,
        url: &str,
        source_id: &str,
    ) -> PlatformResult<String>;

    /// How this platform prefers its clips delivered.
    fn strategy(&self) -> DeliveryStrategy;

    /// Adult-content flag; the base fallback overrides this with a host scan.
    fn is_nsfw(&self, _url: &str) -> bool {
        self.service().is_nsfw()
    }

    /// Upper bound on a download from this platform.
    fn download_timeout(&self) -> Duration {
        DEFAULT_DOWNLOAD_TIMEOUT
    }

    /// Whether the media tool should be handed browser cookies.
    fn needs_cookies(&self) -> bool {
        false
    }

    /// Optional override for the "view on platform" button.
    fn share_url(&self, _url: &str, _source_id: &str) -> Option<String> {
        None
    }
}
