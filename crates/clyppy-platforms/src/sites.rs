//! Single-pattern video hosts expressed as plain records.
//!
//! Hosts that need no bespoke logic share one [`SitePlatform`] shape: a set
//! of recognition regexes with a named `id` capture, a canonical template,
//! and delivery knobs. The constructors below are the full roster.

use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;

use clyppy_models::limits::{DEFAULT_DOWNLOAD_TIMEOUT, SLOW_HOST_DOWNLOAD_TIMEOUT};
use clyppy_models::{DeliveryStrategy, Service};

use crate::error::PlatformResult;
use crate::platform::{Platform, ResolveContext};

/// How a [`SitePlatform`] builds its canonical URL.
enum CanonicalRule {
    /// Substitute `{id}` into a fixed template.
    Template(&'static str),
    /// Keep the matched URL verbatim (hosts with several URL shapes).
    Original,
}

pub struct SitePlatform {
    service: Service,
    patterns: Vec<Regex>,
    canonical: CanonicalRule,
    strategy: DeliveryStrategy,
    timeout: Duration,
    needs_cookies: bool,
}

impl SitePlatform {
    fn new(
        service: Service,
        patterns: &[&str],
        canonical: CanonicalRule,
        strategy: DeliveryStrategy,
    ) -> Self {
        Self {
            service,
            patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            canonical,
            strategy,
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            needs_cookies: false,
        }
    }

    fn slow(mut self) -> Self {
        self.timeout = SLOW_HOST_DOWNLOAD_TIMEOUT;
        self
    }

    fn with_cookies(mut self) -> Self {
        self.needs_cookies = true;
        self
    }

    fn capture_id(&self, url: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(url).map(|caps| caps["id"].to_string()))
    }

    pub fn medal() -> Self {
        Self::new(
            Service::Medal,
            &[
                r"^https?://(?:www\.)?medal\.tv/games/[\w-]+/clips/(?P<id>[\w-]+)",
                r"^https?://(?:www\.)?medal\.tv/clips/(?P<id>[\w-]+)",
            ],
            CanonicalRule::Template("https://medal.tv/clips/{id}"),
            DeliveryStrategy::Redirect,
        )
    }

    pub fn pornhub() -> Self {
        Self::new(
            Service::PornHub,
            &[r"^https?://(?:www\.)?pornhub\.com/view_video\.php\?(?:[^#\s]*&)?viewkey=(?P<id>\w+)"],
            CanonicalRule::Template("https://www.pornhub.com/view_video.php?viewkey={id}"),
            DeliveryStrategy::Redirect,
        )
    }

    pub fn xvideos() -> Self {
        Self::new(
            Service::Xvideos,
            &[r"^https?://(?:www\.)?xvideos\.com/(?P<id>video[0-9a-z.]+)"],
            CanonicalRule::Template("https://www.xvideos.com/{id}/clip"),
            DeliveryStrategy::Redirect,
        )
    }

    pub fn rule34() -> Self {
        Self::new(
            Service::Rule34,
            &[r"^https?://(?:www\.)?rule34video\.com/videos?/(?P<id>\d+)"],
            CanonicalRule::Template("https://rule34video.com/video/{id}/"),
            DeliveryStrategy::Redirect,
        )
        .slow()
    }

    pub fn youporn() -> Self {
        Self::new(
            Service::YouPorn,
            &[r"^https?://(?:www\.)?youporn\.com/watch/(?P<id>\d+)"],
            CanonicalRule::Template("https://www.youporn.com/watch/{id}/"),
            DeliveryStrategy::Redirect,
        )
    }

    pub fn vimeo() -> Self {
        Self::new(
            Service::Vimeo,
            &[r"^https?://(?:www\.)?vimeo\.com/(?P<id>\d+)"],
            CanonicalRule::Template("https://vimeo.com/{id}"),
            DeliveryStrategy::AttachOrReupload,
        )
        .slow()
    }

    pub fn dailymotion() -> Self {
        Self::new(
            Service::Dailymotion,
            &[
                r"^https?://(?:www\.)?dailymotion\.com/video/(?P<id>[a-z0-9]+)",
                r"^https?://dai\.ly/(?P<id>[a-z0-9]+)",
            ],
            CanonicalRule::Template("https://www.dailymotion.com/video/{id}"),
            DeliveryStrategy::AttachOrReupload,
        )
        .slow()
        .with_cookies()
    }

    pub fn gdrive() -> Self {
        Self::new(
            Service::GoogleDrive,
            &[
                r"^https?://drive\.google\.com/file/d/(?P<id>[\w-]+)",
                r"^https?://drive\.google\.com/open\?(?:[^#\s]*&)?id=(?P<id>[\w-]+)",
            ],
            CanonicalRule::Template("https://drive.google.com/file/d/{id}/view"),
            DeliveryStrategy::AttachOrReupload,
        )
    }

    pub fn facebook() -> Self {
        Self::new(
            Service::Facebook,
            &[
                r"^https?://(?:www\.|m\.|web\.)?facebook\.com/[\w.]+/videos/(?P<id>\d+)",
                r"^https?://(?:www\.)?facebook\.com/watch/?\?(?:[^#\s]*&)?v=(?P<id>\d+)",
                r"^https?://fb\.watch/(?P<id>[\w-]+)",
            ],
            CanonicalRule::Original,
            DeliveryStrategy::AttachOrReupload,
        )
    }

    pub fn bilibili() -> Self {
        Self::new(
            Service::Bilibili,
            &[r"^https?://(?:www\.)?bilibili\.com/video/(?P<id>BV\w+|av\d+)"],
            CanonicalRule::Template("https://www.bilibili.com/video/{id}"),
            DeliveryStrategy::AttachOrReupload,
        )
    }

    pub fn canva() -> Self {
        Self::new(
            Service::Canva,
            &[r"^https?://(?:www\.)?canva\.com/design/(?P<id>[\w-]+)/watch"],
            CanonicalRule::Template("https://www.canva.com/design/{id}/watch"),
            DeliveryStrategy::AttachOrReupload,
        )
    }
}

#[async_trait]
impl Platform for SitePlatform {
    fn service(&self) -> Service {
        self.service
    }

    fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(url))
    }

    fn parse(&self, url: &str) -> Option<String> {
        self.capture_id(url)
    }

    async fn canonicalize(
        &self,
        _ctx: &ResolveContext,
        url: &str,
        source_id: &str,
    ) -> PlatformResult<String> {
        match &self.canonical {
            CanonicalRule::Template(template) => Ok(template.replace("{id}", source_id)),
            CanonicalRule::Original => Ok(url.trim().to_string()),
        }
    }

    fn strategy(&self) -> DeliveryStrategy {
        self.strategy
    }

    fn download_timeout(&self) -> Duration {
        self.timeout
    }

    fn needs_cookies(&self) -> bool {
        self.needs_cookies
    }
}
