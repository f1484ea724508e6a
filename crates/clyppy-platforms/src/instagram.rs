//! Instagram reel recognition.

use async_trait::async_trait;
use regex::Regex;

use clyppy_models::{DeliveryStrategy, Service};

use crate::error::PlatformResult;
use crate::platform::{Platform, ResolveContext};

/// Public mirror host used for redirect delivery.
pub const INSTAGRAM_MIRROR_HOST: &str = "www.kkinstagram.com";

/// Mirror URL for a reel shortcode.
pub fn instagram_mirror_url(shortcode: &str) -> String {
    format!("https://{INSTAGRAM_MIRROR_HOST}/reel/{shortcode}")
}

pub struct InstagramPlatform {
    reel: Regex,
}

impl InstagramPlatform {
    pub fn new() -> Self {
        Self {
            reel: Regex::new(
                r"^https?://(?:www\.)?instagram\.com/(?:reel|reels)/(?P<id>[A-Za-z0-9_-]+)",
            )
            .unwrap(),
        }
    }
}

impl Default for InstagramPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn service(&self) -> Service {
        Service::Instagram
    }

    fn matches(&self, url: &str) -> bool {
        self.reel.is_match(url)
    }

    fn parse(&self, url: &str) -> Option<String> {
        self.reel.captures(url).map(|caps| caps["id"].to_string())
    }

    async fn canonicalize(
        &self,
        _ctx: &ResolveContext,
        _url: &str,
        source_id: &str,
    ) -> PlatformResult<String> {
        Ok(format!("https://www.instagram.com/reel/{source_id}/"))
    }

    fn strategy(&self) -> DeliveryStrategy {
        DeliveryStrategy::Redirect
    }
}
