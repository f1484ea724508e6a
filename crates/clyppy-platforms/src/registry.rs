//! Ordered first-match-wins platform registry.

use std::sync::Arc;
use tracing::debug;

use clyppy_models::{Clip, Service};

use crate::base::BasePlatform;
use crate::discord::DiscordCdnPlatform;
use crate::error::PlatformResult;
use crate::instagram::InstagramPlatform;
use crate::kick::KickPlatform;
use crate::platform::{Platform, ResolveContext};
use crate::reddit::RedditPlatform;
use crate::sites::SitePlatform;
use crate::tiktok::TikTokPlatform;
use crate::twitch::TwitchPlatform;
use crate::twitter::TwitterPlatform;
use crate::youtube::YouTubePlatform;

/// Ordered platform list: most specific first, the base fallback last.
///
/// `matches` is a prefilter; a platform only claims a URL when `parse` also
/// yields an id, otherwise the scan continues down the list.
pub struct PlatformRegistry {
    platforms: Vec<Arc<dyn Platform>>,
    ctx: ResolveContext,
}

impl PlatformRegistry {
    /// Registry with the full production roster.
    pub fn standard() -> PlatformResult<Self> {
        Ok(Self::with_context(ResolveContext::new()?))
    }

    pub fn with_context(ctx: ResolveContext) -> Self {
        let platforms: Vec<Arc<dyn Platform>> = vec![
            Arc::new(TwitchPlatform::new()),
            Arc::new(KickPlatform::new()),
            Arc::new(YouTubePlatform::new()),
            Arc::new(RedditPlatform::new()),
            Arc::new(TikTokPlatform::new()),
            Arc::new(InstagramPlatform::new()),
            Arc::new(TwitterPlatform::new()),
            Arc::new(DiscordCdnPlatform::new()),
            Arc::new(SitePlatform::medal()),
            Arc::new(SitePlatform::vimeo()),
            Arc::new(SitePlatform::dailymotion()),
            Arc::new(SitePlatform::gdrive()),
            Arc::new(SitePlatform::facebook()),
            Arc::new(SitePlatform::bilibili()),
            Arc::new(SitePlatform::canva()),
            Arc::new(SitePlatform::pornhub()),
            Arc::new(SitePlatform::xvideos()),
            Arc::new(SitePlatform::rule34()),
            Arc::new(SitePlatform::youporn()),
            Arc::new(BasePlatform::new()),
        ];
        Self { platforms, ctx }
    }

    pub fn platforms(&self) -> &[Arc<dyn Platform>] {
        &self.platforms
    }

    /// Platform registered for a service, if any.
    pub fn by_service(&self, service: Service) -> Option<Arc<dyn Platform>> {
        self.platforms
            .iter()
            .find(|p| p.service() == service)
            .cloned()
    }

    /// First platform whose `parse` claims this URL, with the provisional id.
    pub fn match_url(&self, url: &str) -> Option<(Arc<dyn Platform>, String)> {
        let url = url.trim();
        for platform in &self.platforms {
            if !platform.matches(url) {
                continue;
            }
            if let Some(id) = platform.parse(url) {
                return Some((platform.clone(), id));
            }
        }
        None
    }

    /// Resolve one whitespace-token into a clip handle.
    ///
    /// Canonicalization may fetch (share links); the canonical URL is then
    /// re-parsed so the id always reflects the resolved target.
    pub async fn resolve(&self, url: &str) -> PlatformResult<Option<Clip>> {
        let Some((platform, provisional_id)) = self.match_url(url) else {
            return Ok(None);
        };

        let canonical = platform.canonicalize(&self.ctx, url.trim(), &provisional_id).await?;
        let source_id = platform.parse(&canonical).unwrap_or(provisional_id);

        debug!(
            service = %platform.service(),
            source_id = %source_id,
            url = %canonical,
            "resolved clip"
        );

        let mut clip = Clip::new(platform.service(), source_id, canonical);
        clip.is_nsfw = platform.is_nsfw(&clip.source_url);
        if let Some(share) = platform.share_url(url, &clip.source_id) {
            clip.share_url = Some(share);
        }
        Ok(Some(clip))
    }
}
