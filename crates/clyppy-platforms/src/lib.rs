//! Platform registry and URL recognition.
//!
//! Each supported video platform is a [`Platform`] implementation: a set of
//! compiled regexes for recognition, an id extractor, and a canonicalizer
//! (which for Reddit share links and TikTok short links performs an HTTP
//! fetch). The [`PlatformRegistry`] consults platforms in priority order,
//! first match wins, with the [`base::BasePlatform`] fallback last.

pub mod base;
pub mod discord;
pub mod error;
pub mod instagram;
pub mod kick;
pub mod platform;
pub mod reddit;
pub mod registry;
pub mod sites;
pub mod tiktok;
pub mod twitch;
pub mod twitter;
pub mod youtube;

pub use error::{PlatformError, PlatformResult};
pub use instagram::instagram_mirror_url;
pub use platform::{Platform, ResolveContext, DISCORDBOT_USER_AGENT};
pub use registry::PlatformRegistry;
pub use tiktok::tiktok_mirror_url;
