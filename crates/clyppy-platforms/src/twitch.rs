//! Twitch clip recognition.

use async_trait::async_trait;
use regex::Regex;

use clyppy_models::{DeliveryStrategy, Service};

use crate::error::PlatformResult;
use crate::platform::{Platform, ResolveContext};

/// Host whose clip URLs never expire; probed thumbnails on this CDN yield a
/// permanent MP4 URL by suffix substitution.
pub const PERMANENT_ASSET_HOST: &str = "clips-media-assets2.twitch.tv";

pub struct TwitchPlatform {
    clips_subdomain: Regex,
    channel_clip: Regex,
    clyppy_mirror: Regex,
}

impl TwitchPlatform {
    pub fn new() -> Self {
        Self {
            clips_subdomain: Regex::new(r"^https?://(?:www\.)?clips\.twitch\.tv/(?P<id>[A-Za-z0-9][\w-]*)")
                .unwrap(),
            channel_clip: Regex::new(
                r"^https?://(?:www\.|m\.)?twitch\.tv/[\w]+/clip/(?P<id>[A-Za-z0-9][\w-]*)",
            )
            .unwrap(),
            clyppy_mirror: Regex::new(r"^https?://(?:www\.)?clyppy\.io/clips/(?P<id>[A-Za-z0-9][\w-]*)")
                .unwrap(),
        }
    }

    fn capture_id(&self, url: &str) -> Option<String> {
        for re in [&self.clips_subdomain, &self.channel_clip, &self.clyppy_mirror] {
            if let Some(caps) = re.captures(url) {
                return Some(caps["id"].to_string());
            }
        }
        None
    }
}

impl Default for TwitchPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for TwitchPlatform {
    fn service(&self) -> Service {
        Service::Twitch
    }

    fn matches(&self, url: &str) -> bool {
        self.capture_id(url).is_some()
    }

    fn parse(&self, url: &str) -> Option<String> {
        self.capture_id(url)
    }

    async fn canonicalize(
        &self,
        _ctx: &ResolveContext,
        _url: &str,
        source_id: &str,
    ) -> PlatformResult<String> {
        Ok(format!("https://clips.twitch.tv/{source_id}"))
    }

    fn strategy(&self) -> DeliveryStrategy {
        DeliveryStrategy::Redirect
    }
}
