//! Generic fallback platform and the NSFW host tables.

use async_trait::async_trait;
use regex::Regex;
use url::Url;

use clyppy_models::{DeliveryStrategy, Service};

use crate::error::PlatformResult;
use crate::platform::{Platform, ResolveContext};

/// Hostname substrings that mark a URL as adult content.
pub const NSFW_KEYWORDS: &[&str] = &[
    "porn", "xxx", "hentai", "nsfw", "nude", "fetish", "milf", "bdsm", "camgirl", "escort",
];

/// Known adult hosts that the keyword scan alone would miss.
pub const NSFW_DOMAINS: &[&str] = &[
    "xvideos.com",
    "xnxx.com",
    "redtube.com",
    "xhamster.com",
    "spankbang.com",
    "rule34video.com",
    "rule34.xxx",
    "e621.net",
    "motherless.com",
    "chaturbate.com",
    "onlyfans.com",
    "fansly.com",
    "erome.com",
    "fapello.com",
    "redgifs.com",
];

/// Whether a URL's host looks like an adult site.
pub fn is_nsfw_host(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    if NSFW_KEYWORDS.iter().any(|kw| host.contains(kw)) {
        return true;
    }
    NSFW_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// Matches any http(s) URL that no dedicated platform claimed.
///
/// The whole trimmed URL doubles as the source id, so generic links still get
/// stable content-addressed filenames.
pub struct BasePlatform {
    any_http: Regex,
}

impl BasePlatform {
    pub fn new() -> Self {
        Self {
            any_http: Regex::new(r"^https?://\S+$").unwrap(),
        }
    }
}

impl Default for BasePlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for BasePlatform {
    fn service(&self) -> Service {
        Service::Base
    }

    fn matches(&self, url: &str) -> bool {
        self.any_http.is_match(url.trim())
    }

    fn parse(&self, url: &str) -> Option<String> {
        let trimmed = url.trim();
        if self.any_http.is_match(trimmed) {
            Some(trimmed.to_string())
        } else {
            None
        }
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
        DeliveryStrategy::Redirect
    }

    fn is_nsfw(&self, url: &str) -> bool {
        is_nsfw_host(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_any_http_url() {
        let p = BasePlatform::new();
        assert!(p.matches("https://bsky.app/profile/u/post/3k"));
        assert!(p.matches("http://example.com/v.mp4"));
        assert!(!p.matches("ftp://example.com/v.mp4"));
        assert!(!p.matches("just some words"));
    }

    #[test]
    fn test_source_id_is_the_url() {
        let p = BasePlatform::new();
        assert_eq!(
            p.parse(" https://example.com/v.mp4 "),
            Some("https://example.com/v.mp4".to_string())
        );
    }

    #[test]
    fn test_nsfw_keyword_scan() {
        assert!(is_nsfw_host("https://some-porn-site.example/v/1"));
        assert!(is_nsfw_host("https://best.xxx/v/1"));
        assert!(!is_nsfw_host("https://example.com/v/1"));
    }

    #[test]
    fn test_nsfw_domain_list() {
        assert!(is_nsfw_host("https://www.redgifs.com/watch/abc"));
        assert!(is_nsfw_host("https://e621.net/posts/1"));
        assert!(is_nsfw_host("https://cdn.redgifs.com/x.mp4"));
        // Similar-looking but different registrable domain must not match.
        assert!(!is_nsfw_host("https://note621.net/posts/1"));
    }

    #[test]
    fn test_unparsable_urls_are_not_flagged() {
        assert!(!is_nsfw_host("not a url"));
    }
}
