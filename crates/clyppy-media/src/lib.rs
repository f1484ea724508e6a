//! Media-tool adapters for the embed pipeline.
//!
//! Wraps the external binaries the pipeline shells out to: yt-dlp for
//! remote probe/download, ffprobe for local duration recovery, ffmpeg
//! for first-frame thumbnails. Also hosts the cross-process shard lock
//! that spaces downloads per platform across bot shards.

pub mod classify;
pub mod cookies;
pub mod error;
pub mod ffprobe;
pub mod fs_utils;
pub mod shard_lock;
pub mod thumbnail;
pub mod ytdlp;

pub use classify::classify_tool_stderr;
pub use cookies::CookieSource;
pub use error::{MediaError, MediaResult};
pub use ffprobe::{probe_file, LocalProbe};
pub use shard_lock::{ShardLock, ShardLockConfig, ShardLockGuard};
pub use ytdlp::{DownloadOptions, ProbeOptions, ProbedMedia, YtDlp};
