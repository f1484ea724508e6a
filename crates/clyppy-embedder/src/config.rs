//! Embedder configuration.

use std::path::PathBuf;

use clyppy_models::limits::{
    ATTACH_MAX_BYTES, FREE_MAX_SECS, HARD_MAX_SECS, MAX_RUNNING_AUTOEMBED_DOWNLOADS,
    PER_TOKEN_WINDOW_SECS, PUBLIC_URL_BASE, TOKEN_COST,
};

use crate::error::{EmbedError, EmbedResult};

/// Tunables for one embedder process.
///
/// Everything has a sane default; only the API key is mandatory. Values come
/// from the environment in production and from struct literals in tests.
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Longest duration embedded without charge.
    pub free_max_secs: u32,
    /// Seconds of paid video per token past the free ceiling.
    pub per_token_window_secs: u32,
    /// Durations at or past this are rejected outright.
    pub hard_max_secs: u32,
    /// Tokens charged per started paid window.
    pub token_cost: u32,
    /// Upper bound for direct chat attachments.
    pub attach_max_bytes: u64,
    /// Concurrent media fetches across the process.
    pub max_downloads: usize,
    /// Guild whose webhook posts are archived instead of embedded.
    pub dl_server_id: Option<u64>,
    /// Webhook poster id that triggers the archival branch.
    pub dl_webhook_id: Option<u64>,
    pub api_url: String,
    pub api_key: String,
    /// Scratch directory for downloaded media.
    pub work_dir: PathBuf,
    /// Pending-task file written on shutdown.
    pub queue_path: PathBuf,
    /// Cross-process download lock directory; `None` uses the library default.
    pub shard_lock_dir: Option<PathBuf>,
    /// Root holding browser profiles for cookie-walled hosts.
    pub cookies_root: Option<PathBuf>,
    /// Script invoked for AI video extension.
    pub extend_script: PathBuf,
    /// Diverts outbound webhook edits to a logging sink.
    pub test_mode: bool,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            free_max_secs: FREE_MAX_SECS,
            per_token_window_secs: PER_TOKEN_WINDOW_SECS,
            hard_max_secs: HARD_MAX_SECS,
            token_cost: TOKEN_COST,
            attach_max_bytes: ATTACH_MAX_BYTES,
            max_downloads: MAX_RUNNING_AUTOEMBED_DOWNLOADS,
            dl_server_id: None,
            dl_webhook_id: None,
            api_url: PUBLIC_URL_BASE.to_string(),
            api_key: String::new(),
            work_dir: std::env::temp_dir().join("clyppy_work"),
            queue_path: std::env::temp_dir().join("clyppy_pending.clyq"),
            shard_lock_dir: None,
            cookies_root: None,
            extend_script: PathBuf::from("extend_video.py"),
            test_mode: false,
        }
    }
}

impl EmbedderConfig {
    /// Load configuration from environment variables.
    ///
    /// `CLYPPY_API_KEY` is required; everything else falls back to the
    /// defaults above.
    pub fn from_env() -> EmbedResult<Self> {
        let api_key = std::env::var("CLYPPY_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| EmbedError::config_error("CLYPPY_API_KEY is not set"))?;

        let defaults = Self::default();
        Ok(Self {
            free_max_secs: env_parse("FREE_MAX_SEC", defaults.free_max_secs),
            per_token_window_secs: env_parse("PER_TOKEN_WINDOW_SEC", defaults.per_token_window_secs),
            hard_max_secs: env_parse("HARD_MAX_SEC", defaults.hard_max_secs),
            token_cost: env_parse("TOKEN_COST", defaults.token_cost),
            attach_max_bytes: env_parse("ATTACH_MAX", defaults.attach_max_bytes),
            max_downloads: env_parse(
                "MAX_RUNNING_AUTOEMBED_DOWNLOADS",
                defaults.max_downloads,
            ),
            dl_server_id: env_opt("DL_SERVER_ID"),
            dl_webhook_id: env_opt("DL_WEBHOOK_ID"),
            api_url: std::env::var("CLYPPY_API_URL").unwrap_or(defaults.api_url),
            api_key,
            work_dir: env_path("CLYPPY_WORK_DIR", defaults.work_dir),
            queue_path: env_path("CLYPPY_QUEUE_PATH", defaults.queue_path),
            shard_lock_dir: std::env::var("CLYPPY_SHARD_LOCK_DIR").ok().map(PathBuf::from),
            cookies_root: std::env::var("CLYPPY_COOKIES_DIR").ok().map(PathBuf::from),
            extend_script: env_path("CLYPPY_EXTEND_SCRIPT", defaults.extend_script),
            test_mode: std::env::var("TEST").is_ok(),
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_opt<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_path(name: &str, default: PathBuf) -> PathBuf {
    std::env::var(name).map(PathBuf::from).unwrap_or(default)
}
