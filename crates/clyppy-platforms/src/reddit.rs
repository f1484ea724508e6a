//! Reddit post recognition, including opaque share links.

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use clyppy_models::{DeliveryStrategy, Service};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{Platform, ResolveContext};

pub struct RedditPlatform {
    comments: Regex,
    user_post: Regex,
    bare_comments: Regex,
    short: Regex,
    gallery: Regex,
    share: Regex,
    video_host: Regex,
    canonical_updater: Regex,
    canonical_link: Regex,
}

impl RedditPlatform {
    pub fn new() -> Self {
        Self {
            comments: Regex::new(
                r"^https?://(?:www\.|old\.|new\.|m\.)?reddit\.com/r/\w+/comments/(?P<id>[a-z0-9]+)",
            )
            .unwrap(),
            user_post: Regex::new(
                r"^https?://(?:www\.)?reddit\.com/user/[\w-]+/comments/(?P<id>[a-z0-9]+)",
            )
            .unwrap(),
            bare_comments: Regex::new(r"^https?://(?:www\.)?reddit\.com/comments/(?P<id>[a-z0-9]+)")
                .unwrap(),
            short: Regex::new(r"^https?://(?:www\.)?redd\.it/(?P<id>[a-z0-9]+)").unwrap(),
            gallery: Regex::new(r"^https?://(?:www\.)?reddit\.com/gallery/(?P<id>[a-z0-9]+)").unwrap(),
            share: Regex::new(r"^https?://(?:www\.)?reddit\.com/r/\w+/s/(?P<id>[A-Za-z0-9]+)").unwrap(),
            video_host: Regex::new(r"^https?://v\.redd\.it/(?P<id>[a-z0-9]+)").unwrap(),
            // New reddit embeds the resolved post URL in a custom element;
            // older pages still carry the plain canonical link tag.
            canonical_updater: Regex::new(
                r#"shreddit-canonical-url-updater[^>]*\svalue="(?P<url>[^"]+)""#,
            )
            .unwrap(),
            canonical_link: Regex::new(r#"<link\s+rel="canonical"\s+href="(?P<url>[^"]+)""#).unwrap(),
        }
    }

    fn capture_id(&self, url: &str) -> Option<String> {
        for re in [
            &self.comments,
            &self.user_post,
            &self.bare_comments,
            &self.short,
            &self.gallery,
            &self.share,
            &self.video_host,
        ] {
            if let Some(caps) = re.captures(url) {
                return Some(caps["id"].to_string());
            }
        }
        None
    }

    fn is_share_link(&self, url: &str) -> bool {
        self.share.is_match(url)
    }

    fn is_video_host(&self, url: &str) -> bool {
        self.video_host.is_match(url)
    }

    /// Fetch a share link and extract the canonical post URL from the HTML.
    pub async fn resolve_share_link(
        &self,
        ctx: &ResolveContext,
        url: &str,
    ) -> PlatformResult<String> {
        let body = ctx.http.get(url).send().await?.text().await?;
        let canonical = self
            .canonical_updater
            .captures(&body)
            .or_else(|| self.canonical_link.captures(&body))
            .map(|caps| caps["url"].to_string())
            .ok_or_else(|| PlatformError::share_link_unresolved(url))?;
        debug!(share_url = %url, canonical = %canonical, "resolved reddit share link");
        Ok(canonical)
    }
}

impl Default for RedditPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for RedditPlatform {
    fn service(&self) -> Service {
        Service::Reddit
    }

    fn matches(&self, url: &str) -> bool {
        self.capture_id(url).is_some()
    }

    fn parse(&self, url: &str) -> Option<String> {
        self.capture_id(url)
    }

    async fn canonicalize(
        &self,
        ctx: &ResolveContext,
        url: &str,
        source_id: &str,
    ) -> PlatformResult<String> {
        if self.is_share_link(url) {
            return self.resolve_share_link(ctx, url).await;
        }
        if self.is_video_host(url) {
            return Ok(format!("https://v.redd.it/{source_id}"));
        }
        Ok(format!("https://www.reddit.com/comments/{source_id}/"))
    }

    fn strategy(&self) -> DeliveryStrategy {
        DeliveryStrategy::AttachOrReupload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn platform() -> RedditPlatform {
        RedditPlatform::new()
    }

    #[test]
    fn test_standard_comments_form() {
        let p = platform();
        assert_eq!(
            p.parse("https://www.reddit.com/r/videos/comments/abc123/some_title/"),
            Some("abc123".to_string())
        );
        assert_eq!(
            p.parse("https://old.reddit.com/r/aww/comments/xyz789"),
            Some("xyz789".to_string())
        );
    }

    #[test]
    fn test_user_post_and_bare_forms() {
        let p = platform();
        assert_eq!(
            p.parse("https://www.reddit.com/user/some-user/comments/q1w2e3/t/"),
            Some("q1w2e3".to_string())
        );
        assert_eq!(
            p.parse("https://www.reddit.com/comments/q1w2e3/"),
            Some("q1w2e3".to_string())
        );
    }

    #[test]
    fn test_short_gallery_and_video_forms() {
        let p = platform();
        assert_eq!(p.parse("https://redd.it/abc123"), Some("abc123".to_string()));
        assert_eq!(
            p.parse("https://www.reddit.com/gallery/abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(p.parse("https://v.redd.it/k9j8h7g6"), Some("k9j8h7g6".to_string()));
    }

    #[test]
    fn test_share_form_detected() {
        let p = platform();
        let url = "https://www.reddit.com/r/videos/s/AbCdEf123";
        assert!(p.is_share_link(url));
        assert_eq!(p.parse(url), Some("AbCdEf123".to_string()));
    }

    #[test]
    fn test_rejects_non_post_urls() {
        let p = platform();
        assert_eq!(p.parse("https://www.reddit.com/r/videos/"), None);
        assert_eq!(p.parse("https://www.reddit.com/user/some-user/"), None);
    }

    #[tokio::test]
    async fn test_plain_canonicalization() {
        let p = platform();
        let ctx = ResolveContext::new().unwrap();
        let canonical = p
            .canonicalize(&ctx, "https://redd.it/abc123", "abc123")
            .await
            .unwrap();
        assert_eq!(canonical, "https://www.reddit.com/comments/abc123/");
        assert_eq!(p.parse(&canonical), Some("abc123".to_string()));
    }

    #[tokio::test]
    async fn test_video_host_canonicalization() {
        let p = platform();
        let ctx = ResolveContext::new().unwrap();
        let canonical = p
            .canonicalize(&ctx, "https://v.redd.it/k9j8h7g6", "k9j8h7g6")
            .await
            .unwrap();
        assert_eq!(canonical, "https://v.redd.it/k9j8h7g6");
    }

    #[tokio::test]
    async fn test_share_link_resolution_via_updater_tag() {
        let server = MockServer::start().await;
        let html = concat!(
            "<html><head></head><body>",
            r#"<shreddit-canonical-url-updater value="https://www.reddit.com/r/videos/comments/abc123/a_title/"></shreddit-canonical-url-updater>"#,
            "</body></html>"
        );
        Mock::given(method("GET"))
            .and(path("/r/videos/s/XyZ987"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let p = platform();
        let ctx = ResolveContext::new().unwrap();
        let resolved = p
            .resolve_share_link(&ctx, &format!("{}/r/videos/s/XyZ987", server.uri()))
            .await
            .unwrap();
        assert_eq!(resolved, "https://www.reddit.com/r/videos/comments/abc123/a_title/");
        assert_eq!(p.parse(&resolved), Some("abc123".to_string()));
    }

    #[tokio::test]
    async fn test_share_link_resolution_via_link_tag() {
        let server = MockServer::start().await;
        let html = r#"<html><head><link rel="canonical" href="https://www.reddit.com/r/aww/comments/zz9900/cat/"></head></html>"#;
        Mock::given(method("GET"))
            .and(path("/r/aww/s/Share1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let p = platform();
        let ctx = ResolveContext::new().unwrap();
        let resolved = p
            .resolve_share_link(&ctx, &format!("{}/r/aww/s/Share1", server.uri()))
            .await
            .unwrap();
        assert_eq!(p.parse(&resolved), Some("zz9900".to_string()));
    }

    #[tokio::test]
    async fn test_share_link_without_canonical_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/r/x/s/Nope"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let p = platform();
        let ctx = ResolveContext::new().unwrap();
        let err = p
            .resolve_share_link(&ctx, &format!("{}/r/x/s/Nope", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::ShareLinkUnresolved { .. }));
    }
}
