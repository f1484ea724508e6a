//! Supported video platforms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A video platform the pipeline knows how to resolve.
///
/// `Base` is the generic fallback for any http(s) URL that no dedicated
/// platform claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Twitch,
    Kick,
    YouTube,
    Reddit,
    TikTok,
    Instagram,
    Twitter,
    /// Attachments re-served from the chat platform's own CDN.
    #[serde(rename = "discord")]
    DiscordCdn,
    Vimeo,
    Dailymotion,
    #[serde(rename = "gdrive")]
    GoogleDrive,
    Facebook,
    Bilibili,
    Canva,
    Medal,
    PornHub,
    Xvideos,
    Rule34,
    YouPorn,
    /// Generic fallback for any other http(s) URL.
    Base,
}

impl Service {
    /// Lowercase wire name, used in working filenames and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Twitch => "twitch",
            Service::Kick => "kick",
            Service::YouTube => "youtube",
            Service::Reddit => "reddit",
            Service::TikTok => "tiktok",
            Service::Instagram => "instagram",
            Service::Twitter => "twitter",
            Service::DiscordCdn => "discord",
            Service::Vimeo => "vimeo",
            Service::Dailymotion => "dailymotion",
            Service::GoogleDrive => "gdrive",
            Service::Facebook => "facebook",
            Service::Bilibili => "bilibili",
            Service::Canva => "canva",
            Service::Medal => "medal",
            Service::PornHub => "pornhub",
            Service::Xvideos => "xvideos",
            Service::Rule34 => "rule34",
            Service::YouPorn => "youporn",
            Service::Base => "base",
        }
    }

    /// Human-readable name used in button labels ("View On X").
    pub fn display_name(&self) -> &'static str {
        match self {
            Service::Twitch => "Twitch",
            Service::Kick => "Kick",
            Service::YouTube => "YouTube",
            Service::Reddit => "Reddit",
            Service::TikTok => "TikTok",
            Service::Instagram => "Instagram",
            Service::Twitter => "X",
            Service::DiscordCdn => "Discord",
            Service::Vimeo => "Vimeo",
            Service::Dailymotion => "Dailymotion",
            Service::GoogleDrive => "Google Drive",
            Service::Facebook => "Facebook",
            Service::Bilibili => "BiliBili",
            Service::Canva => "Canva",
            Service::Medal => "Medal",
            Service::PornHub => "Pornhub",
            Service::Xvideos => "Xvideos",
            Service::Rule34 => "Rule34",
            Service::YouPorn => "YouPorn",
            Service::Base => "Web",
        }
    }

    /// Platforms whose content is adult-only regardless of URL.
    pub fn is_nsfw(&self) -> bool {
        matches!(
            self,
            Service::PornHub | Service::Xvideos | Service::Rule34 | Service::YouPorn
        )
    }

    /// All known services, in no particular order.
    pub fn all() -> &'static [Service] {
        &[
            Service::Twitch,
            Service::Kick,
            Service::YouTube,
            Service::Reddit,
            Service::TikTok,
            Service::Instagram,
            Service::Twitter,
            Service::DiscordCdn,
            Service::Vimeo,
            Service::Dailymotion,
            Service::GoogleDrive,
            Service::Facebook,
            Service::Bilibili,
            Service::Canva,
            Service::Medal,
            Service::PornHub,
            Service::Xvideos,
            Service::Rule34,
            Service::YouPorn,
            Service::Base,
        ]
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a wire name does not match any known service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service: {0}")]
pub struct ParseServiceError(pub String);

impl FromStr for Service {
    type Err = ParseServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Service::all()
            .iter()
            .find(|svc| svc.as_str() == s)
            .copied()
            .ok_or_else(|| ParseServiceError(s.to_string()))
    }
}
