//! Pipeline limits and fixed service constants.
//!
//! These are the compiled-in defaults; the embedder config can override the
//! tunable ones from the environment.

use std::time::Duration;

/// Public site base for clip pages and redirect embeds.
pub const PUBLIC_URL_BASE: &str = "https://clyppy.io";

/// Public CDN base for reuploaded artifacts.
pub const CDN_URL_BASE: &str = "https://cdn.clyppy.io";

/// Videos at or under this duration embed for free.
pub const FREE_MAX_SECS: u32 = 300;

/// Each token buys one additional window of this length past the free tier.
pub const PER_TOKEN_WINDOW_SECS: u32 = 1800;

/// Videos at or over this duration are rejected outright.
pub const HARD_MAX_SECS: u32 = 1800;

/// Tokens charged per overage window.
pub const TOKEN_COST: u32 = 1;

/// Fixed refund when the AI extension fails after charging.
pub const EXTEND_REFUND_TOKENS: u32 = 10;

/// Chat attachment ceiling.
pub const ATTACH_MAX_BYTES: u64 = 8 * 1024 * 1024;

/// Global ceiling on concurrent downloads.
pub const MAX_RUNNING_AUTOEMBED_DOWNLOADS: usize = 5;

/// Per-user cap on concurrent slash-command embeds.
pub const MAX_EMBEDS_PER_USER: usize = 2;

/// Cap applied when a full download is forced (duration fallback, dl-server).
pub const DOWNLOAD_MAX_FILESIZE_BYTES: u64 = 1_610_612_736; // 1.5 GiB

/// Chunk size for the backing API's chunked upload endpoint.
pub const UPLOAD_CHUNK_BYTES: usize = 70_000_000;

/// Working filename stem is clamped to this many chars before the extension.
pub const MAX_FILENAME_STEM_LEN: usize = 200;

/// Slash-command tasks older than this are dropped on queue load; the chat
/// platform's interaction token has expired by then.
pub const PENDING_TASK_TTL: Duration = Duration::from_secs(15 * 60);

/// Default per-platform download timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Extended timeout for slow hosts (Vimeo, Dailymotion, Rule34).
pub const SLOW_HOST_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound on a probe or download subprocess.
pub const MEDIA_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Backing API client timeout.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a second arrival waits for an in-flight duplicate to finish.
pub const INFLIGHT_WAIT_TIMEOUT: Duration = Duration::from_secs(180);

/// Poll interval while waiting on the in-flight set.
pub const INFLIGHT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ceiling on the shutdown drain loop.
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(180);

/// Progress-log cadence during the shutdown drain.
pub const SHUTDOWN_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Ephemeral Twitch CDN URLs expire roughly this long after probing.
pub const TWITCH_EPHEMERAL_URL_TTL: Duration = Duration::from_secs(10 * 3600);

/// Seconds the AI extension adds to a clip.
pub const EXTEND_DURATION_SECS: u32 = 8;

/// AI extension refuses inputs shorter than this.
pub const EXTEND_MIN_INPUT_SECS: u32 = 1;

/// AI extension refuses inputs longer than this.
pub const EXTEND_MAX_INPUT_SECS: u32 = 60;
