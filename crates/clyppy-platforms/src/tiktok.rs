//! TikTok URL recognition, including vm/vt short links.

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use clyppy_models::{DeliveryStrategy, Service};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{Platform, ResolveContext};

/// Public mirror host used for redirect delivery; TikTok's own URLs refuse to
/// play inside chat embeds.
pub const TIKTOK_MIRROR_HOST: &str = "www.kktiktok.com";

/// Swap a canonical TikTok URL onto the embeddable mirror host.
pub fn tiktok_mirror_url(canonical_url: &str) -> String {
    canonical_url
        .replacen("www.tiktok.com", TIKTOK_MIRROR_HOST, 1)
        .replacen("://tiktok.com", &format!("://{TIKTOK_MIRROR_HOST}"), 1)
}

pub struct TikTokPlatform {
    long_form: Regex,
    short_form: Regex,
    t_form: Regex,
    canonical_field: Regex,
}

impl TikTokPlatform {
    pub fn new() -> Self {
        Self {
            long_form: Regex::new(
                r"^https?://(?:www\.|m\.)?tiktok\.com/@(?P<user>[\w.-]+)/video/(?P<id>\d+)",
            )
            .unwrap(),
            short_form: Regex::new(r"^https?://(?:vt|vm)\.tiktok\.com/(?P<id>[A-Za-z0-9]+)").unwrap(),
            t_form: Regex::new(r"^https?://(?:www\.)?tiktok\.com/t/(?P<id>[A-Za-z0-9]+)").unwrap(),
            // The page embeds its resolved long-form URL in a JSON blob.
            canonical_field: Regex::new(r#""canonical":"(?P<url>https:[^"]+)""#).unwrap(),
        }
    }

    fn capture_long(&self, url: &str) -> Option<(String, String)> {
        self.long_form
            .captures(url)
            .map(|caps| (caps["user"].to_string(), caps["id"].to_string()))
    }

    fn capture_short(&self, url: &str) -> Option<String> {
        for re in [&self.short_form, &self.t_form] {
            if let Some(caps) = re.captures(url) {
                return Some(caps["id"].to_string());
            }
        }
        None
    }

    /// Follow a vm/vt short link to the long form. Prefers the final URL
    /// after redirects, falling back to the embedded `canonical` field.
    pub async fn resolve_short_link(
        &self,
        ctx: &ResolveContext,
        url: &str,
    ) -> PlatformResult<String> {
        let response = ctx.http.get(url).send().await?;
        let final_url = response.url().to_string();
        if self.long_form.is_match(&final_url) {
            debug!(short_url = %url, canonical = %final_url, "resolved tiktok short link");
            return Ok(final_url);
        }

        let body = response.text().await?;
        let canonical = self
            .canonical_field
            .captures(&body)
            .map(|caps| caps["url"].replace("\\u002F", "/").replace("\\/", "/"))
            .ok_or_else(|| PlatformError::share_link_unresolved(url))?;
        debug!(short_url = %url, canonical = %canonical, "resolved tiktok short link from body");
        Ok(canonical)
    }
}

impl Default for TikTokPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for TikTokPlatform {
    fn service(&self) -> Service {
        Service::TikTok
    }

    fn matches(&self, url: &str) -> bool {
        self.capture_long(url).is_some() || self.capture_short(url).is_some()
    }

    fn parse(&self, url: &str) -> Option<String> {
        if let Some((_, id)) = self.capture_long(url) {
            return Some(id);
        }
        self.capture_short(url)
    }

    async fn canonicalize(
        &self,
        ctx: &ResolveContext,
        url: &str,
        _source_id: &str,
    ) -> PlatformResult<String> {
        if let Some((user, id)) = self.capture_long(url) {
            return Ok(format!("https://www.tiktok.com/@{user}/video/{id}"));
        }
        self.resolve_short_link(ctx, url).await
    }

    fn strategy(&self) -> DeliveryStrategy {
        DeliveryStrategy::Redirect
    }
}
