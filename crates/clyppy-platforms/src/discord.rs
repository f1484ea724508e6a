//! Discord attachment CDN recognition.
//!
//! Attachment URLs are signed; the query string must be preserved verbatim
//! for the download to succeed, so canonicalization keeps the URL as-is.

use async_trait::async_trait;
use regex::Regex;

use clyppy_models::{DeliveryStrategy, Service};

use crate::error::PlatformResult;
use crate::platform::{Platform, ResolveContext};

pub struct DiscordCdnPlatform {
    attachment: Regex,
}

impl DiscordCdnPlatform {
    pub fn new() -> Self {
        Self {
            attachment: Regex::new(
                r"^https?://(?:cdn|media)\.discordapp\.(?:com|net)/attachments/(?P<channel>\d+)/(?P<message>\d+)/(?P<file>[^\s?]+)",
            )
            .unwrap(),
        }
    }
}

impl Default for DiscordCdnPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for DiscordCdnPlatform {
    fn service(&self) -> Service {
        Service::DiscordCdn
    }

    fn matches(&self, url: &str) -> bool {
        self.attachment.is_match(url)
    }

    fn parse(&self, url: &str) -> Option<String> {
        self.attachment.captures(url).map(|caps| {
            format!("{}/{}/{}", &caps["channel"], &caps["message"], &caps["file"])
        })
    }

    async fn canonicalize(
        &self,
        _ctx: &ResolveContext,
        url: &str,
        _source_id: &str,
    ) -> PlatformResult<String> {
        Ok(url.trim().to_string())
    }

    fn strategy(&self) -> DeliveryStrategy {
        DeliveryStrategy::AttachOrReupload
    }
}
