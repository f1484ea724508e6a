//! Kick clip recognition.

use async_trait::async_trait;
use regex::Regex;

use clyppy_models::{DeliveryStrategy, Service};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{Platform, ResolveContext};

pub struct KickPlatform {
    path_form: Regex,
    query_form: Regex,
}

impl KickPlatform {
    pub fn new() -> Self {
        Self {
            path_form: Regex::new(
                r"^https?://(?:www\.)?kick\.com/(?P<user>[\w.-]+)/clips/(?P<id>clip_[\w]+)",
            )
            .unwrap(),
            query_form: Regex::new(
                r"^https?://(?:www\.)?kick\.com/(?P<user>[\w.-]+)\?(?:[^#\s]*&)?clip=(?P<id>clip_[\w]+)",
            )
            .unwrap(),
        }
    }

    fn capture(&self, url: &str) -> Option<(String, String)> {
        for re in [&self.path_form, &self.query_form] {
            if let Some(caps) = re.captures(url) {
                return Some((caps["user"].to_string(), caps["id"].to_string()));
            }
        }
        None
    }
}

impl Default for KickPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for KickPlatform {
    fn service(&self) -> Service {
        Service::Kick
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
        // The canonical path form needs the channel name, recovered from
        // whichever form matched.
        let (user, _) = self
            .capture(url)
            .ok_or_else(|| PlatformError::invalid_url(url))?;
        Ok(format!("https://kick.com/{user}/clips/{source_id}"))
    }

    // Kick probes resolve to HLS playlists; the direct URLs are unusable in
    // chat embeds, so clips are always rehosted.
    fn strategy(&self) -> DeliveryStrategy {
        DeliveryStrategy::AlwaysReupload
    }

    fn needs_cookies(&self) -> bool {
        true
    }
}
