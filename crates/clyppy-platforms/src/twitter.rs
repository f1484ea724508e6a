//! X/Twitter status recognition.

use async_trait::async_trait;
use regex::Regex;

use clyppy_models::{DeliveryStrategy, Service};

use crate::error::PlatformResult;
use crate::platform::{Platform, ResolveContext};

pub struct TwitterPlatform {
    status: Regex,
}

impl TwitterPlatform {
    pub fn new() -> Self {
        Self {
            // Covers twitter.com, x.com and the fixup mirrors people paste.
            status: Regex::new(
                r"^https?://(?:www\.|mobile\.)?(?:twitter|x|fxtwitter|fixupx|vxtwitter)\.com/(?P<user>\w+)/status/(?P<id>\d+)",
            )
            .unwrap(),
        }
    }

    fn capture(&self, url: &str) -> Option<(String, String)> {
        self.status
            .captures(url)
            .map(|caps| (caps["user"].to_string(), caps["id"].to_string()))
    }
}

impl Default for TwitterPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for TwitterPlatform {
    fn service(&self) -> Service {
        Service::Twitter
    }

    fn matches(&self, url: &str) -> bool {
        self.capture(url).is_some()
    }

    fn parse(&self, url: &str) -> Option<String> {
        self.capture(url).map(|(_, id)| id)
    }

    async fn canonicalize(
        &self,
        _ctx: &ResolveContext,
        url: &str,
        source_id: &str,
    ) -> PlatformResult<String> {
        let user = self
            .capture(url)
            .map(|(user, _)| user)
            .unwrap_or_else(|| "i".to_string());
        Ok(format!("https://x.com/{user}/status/{source_id}"))
    }

    // X serves video as segmented streams behind auth walls; embeds only
    // work from a rehosted MP4.
    fn strategy(&self) -> DeliveryStrategy {
        DeliveryStrategy::AlwaysReupload
    }

    fn needs_cookies(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> TwitterPlatform {
        TwitterPlatform::new()
    }

    #[test]
    fn test_status_hosts() {
        let p = platform();
        for url in [
            "https://twitter.com/jack/status/20",
            "https://x.com/jack/status/20",
            "https://fxtwitter.com/jack/status/20",
            "https://fixupx.com/jack/status/20",
            "https://mobile.twitter.com/jack/status/20",
        ] {
            assert_eq!(p.parse(url), Some("20".to_string()), "url {url}");
        }
    }

    #[test]
    fn test_i_status_form() {
        let p = platform();
        assert_eq!(
            p.parse("https://x.com/i/status/1790000000000000000"),
            Some("1790000000000000000".to_string())
        );
    }

    #[test]
    fn test_rejects_profiles() {
        let p = platform();
        assert_eq!(p.parse("https://x.com/jack"), None);
        assert_eq!(p.parse("https://x.com/jack/likes"), None);
    }

    #[tokio::test]
    async fn test_canonicalizes_to_x_host() {
        let p = platform();
        let ctx = ResolveContext::new().unwrap();
        let canonical = p
            .canonicalize(&ctx, "https://fxtwitter.com/jack/status/20", "20")
            .await
            .unwrap();
        assert_eq!(canonical, "https://x.com/jack/status/20");
        assert_eq!(p.parse(&canonical), Some("20".to_string()));
    }
}
