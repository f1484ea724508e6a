//! YouTube URL recognition.

use async_trait::async_trait;
use regex::Regex;

use clyppy_models::{DeliveryStrategy, Service};

use crate::error::PlatformResult;
use crate::platform::{Platform, ResolveContext};

pub struct YouTubePlatform {
    watch: Regex,
    short: Regex,
    shorts: Regex,
}

impl YouTubePlatform {
    pub fn new() -> Self {
        Self {
            // v= may be preceded by other query params; playlist params are
            // dropped by rebuilding the canonical watch URL.
            watch: Regex::new(
                r"^https?://(?:www\.|m\.|music\.)?youtube\.com/watch\?(?:[^#\s]*&)?v=(?P<id>[A-Za-z0-9_-]{11})",
            )
            .unwrap(),
            short: Regex::new(r"^https?://(?:www\.)?youtu\.be/(?P<id>[A-Za-z0-9_-]{11})").unwrap(),
            shorts: Regex::new(
                r"^https?://(?:www\.|m\.)?youtube\.com/shorts/(?P<id>[A-Za-z0-9_-]{11})",
            )
            .unwrap(),
        }
    }

    fn capture_id(&self, url: &str) -> Option<String> {
        for re in [&self.watch, &self.short, &self.shorts] {
            if let Some(caps) = re.captures(url) {
                return Some(caps["id"].to_string());
            }
        }
        None
    }
}

impl Default for YouTubePlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for YouTubePlatform {
    fn service(&self) -> Service {
        Service::YouTube
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
        Ok(format!("https://www.youtube.com/watch?v={source_id}"))
    }

    fn strategy(&self) -> DeliveryStrategy {
        DeliveryStrategy::AttachOrReupload
    }

    fn needs_cookies(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> YouTubePlatform {
        YouTubePlatform::new()
    }

    #[test]
    fn test_watch_form() {
        let p = platform();
        assert_eq!(
            p.parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            p.parse("https://m.youtube.com/watch?v=jNQXAC9IVRw"),
            Some("jNQXAC9IVRw".to_string())
        );
    }

    #[test]
    fn test_watch_form_with_leading_params() {
        let p = platform();
        assert_eq!(
            p.parse("https://www.youtube.com/watch?feature=shared&v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_playlist_param_is_stripped_by_canonical_rebuild() {
        let p = platform();
        let id = p
            .parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLx0sYbCqOb8TBPRdmBHs5Iftvv9TPboYG")
            .unwrap();
        assert_eq!(id, "dQw4w9WgXcQ");
    }

    #[test]
    fn test_short_and_shorts_forms() {
        let p = platform();
        assert_eq!(
            p.parse("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            p.parse("https://youtu.be/dQw4w9WgXcQ?t=42"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            p.parse("https://www.youtube.com/shorts/abcDEF12345"),
            Some("abcDEF12345".to_string())
        );
    }

    #[test]
    fn test_rejects_non_video_urls() {
        let p = platform();
        assert_eq!(p.parse("https://www.youtube.com/@SomeChannel"), None);
        assert_eq!(p.parse("https://www.youtube.com/playlist?list=PLabc"), None);
        assert_eq!(p.parse("https://youtu.be/short"), None); // id must be 11 chars
    }

    #[tokio::test]
    async fn test_canonical_round_trip() {
        let p = platform();
        let ctx = ResolveContext::new().unwrap();
        let canonical = p
            .canonicalize(&ctx, "https://youtu.be/dQw4w9WgXcQ", "dQw4w9WgXcQ")
            .await
            .unwrap();
        assert_eq!(canonical, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(p.parse(&canonical), Some("dQw4w9WgXcQ".to_string()));
    }
}
