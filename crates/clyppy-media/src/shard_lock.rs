//! Cross-process per-platform download slots.
//!
//! Several hosts tolerate only a few concurrent fetches per IP, and the
//! bot runs one process per shard on the same box. The slots are
//! advisory lock files `{platform}_{slot}.lock` under a shared temp
//! directory: holding the file holds the slot, and `O_EXCL` creation
//! makes acquisition atomic across processes. Crashed holders are
//! reclaimed by mtime.

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Tuning for the slot directory.
#[derive(Debug, Clone)]
pub struct ShardLockConfig {
    /// Directory holding the lock files. Shared by every shard process.
    pub dir: PathBuf,
    /// Slots per platform.
    pub max_concurrent: u32,
    /// Sleep between sweeps when every slot is busy.
    pub retry_interval: Duration,
    /// Minimum time a slot stays held, spacing requests to the host.
    pub min_hold: Duration,
    /// Lock files older than this belong to a dead process.
    pub stale_after: Duration,
    /// Give up waiting after this long. `None` waits until cancelled.
    pub acquire_timeout: Option<Duration>,
}

impl Default for ShardLockConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("clyppy_shard_locks"),
            max_concurrent: 2,
            retry_interval: Duration::from_millis(500),
            min_hold: Duration::from_millis(500),
            stale_after: Duration::from_secs(30 * 60),
            acquire_timeout: None,
        }
    }
}

/// Advisory cross-process counting semaphore.
#[derive(Debug, Clone)]
pub struct ShardLock {
    config: ShardLockConfig,
}

impl ShardLock {
    pub fn new(mut config: ShardLockConfig) -> Self {
        if config.max_concurrent == 0 {
            warn!("shard lock configured with zero slots, using one");
            config.max_concurrent = 1;
        }
        Self { config }
    }

    /// Acquire a slot for `platform`, sweeping and retrying until one
    /// frees up (or the configured timeout passes).
    pub async fn acquire(&self, platform: &str) -> MediaResult<ShardLockGuard> {
        fs::create_dir_all(&self.config.dir).await?;
        let start = Instant::now();

        loop {
            for slot in 0..self.config.max_concurrent {
                if let Some(guard) = self.try_slot(platform, slot).await? {
                    return Ok(guard);
                }
            }

            if let Some(timeout) = self.config.acquire_timeout {
                if start.elapsed() >= timeout {
                    return Err(MediaError::ShardLockTimeout {
                        platform: platform.to_string(),
                        waited_secs: start.elapsed().as_secs(),
                    });
                }
            }

            debug!(platform = %platform, "all download slots busy, waiting");
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }

    /// Single sweep: a slot now or `None`.
    pub async fn try_acquire(&self, platform: &str) -> MediaResult<Option<ShardLockGuard>> {
        fs::create_dir_all(&self.config.dir).await?;
        for slot in 0..self.config.max_concurrent {
            if let Some(guard) = self.try_slot(platform, slot).await? {
                return Ok(Some(guard));
            }
        }
        Ok(None)
    }

    async fn try_slot(&self, platform: &str, slot: u32) -> MediaResult<Option<ShardLockGuard>> {
        let path = self.config.dir.join(format!("{platform}_{slot}.lock"));

        match self.create_lock_file(&path).await {
            Ok(true) => {
                debug!(platform = %platform, slot, "acquired download slot");
                Ok(Some(ShardLockGuard {
                    path,
                    platform: platform.to_string(),
                    slot,
                    acquired_at: Instant::now(),
                    min_hold: self.config.min_hold,
                    released: false,
                }))
            }
            Ok(false) => {
                if self.is_stale(&path).await {
                    warn!(
                        platform = %platform,
                        slot,
                        path = %path.display(),
                        "reclaiming stale download slot"
                    );
                    let _ = fs::remove_file(&path).await;
                    if self.create_lock_file(&path).await? {
                        return Ok(Some(ShardLockGuard {
                            path,
                            platform: platform.to_string(),
                            slot,
                            acquired_at: Instant::now(),
                            min_hold: self.config.min_hold,
                            released: false,
                        }));
                    }
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Atomic `O_EXCL` create. `Ok(false)` means another holder exists.
    async fn create_lock_file(&self, path: &PathBuf) -> MediaResult<bool> {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(_) => {
                let _ = fs::write(path, std::process::id().to_string()).await;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(MediaError::from(e)),
        }
    }

    async fn is_stale(&self, path: &PathBuf) -> bool {
        match fs::metadata(path).await {
            Ok(meta) => match meta.modified() {
                Ok(modified) => SystemTime::now()
                    .duration_since(modified)
                    .map(|age| age >= self.config.stale_after)
                    .unwrap_or(false),
                Err(_) => false,
            },
            // Vanished between the create attempt and here; the retry
            // create will settle it.
            Err(_) => true,
        }
    }
}

/// A held slot. Dropping releases it; prefer [`release`] so the
/// request-spacing delay happens before the caller moves on.
///
/// [`release`]: ShardLockGuard::release
#[derive(Debug)]
pub struct ShardLockGuard {
    path: PathBuf,
    platform: String,
    slot: u32,
    acquired_at: Instant,
    min_hold: Duration,
    released: bool,
}

impl ShardLockGuard {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Release the slot, holding it for the remainder of `min_hold`
    /// first so back-to-back requests to the host stay spaced.
    pub async fn release(mut self) {
        self.released = true;

        let elapsed = self.acquired_at.elapsed();
        if elapsed < self.min_hold {
            tokio::time::sleep(self.min_hold - elapsed).await;
        }

        if let Err(e) = fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to release download slot");
            }
        }
        debug!(platform = %self.platform, slot = self.slot, "released download slot");
    }
}

impl Drop for ShardLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let path = self.path.clone();
        let remaining = self.min_hold.saturating_sub(self.acquired_at.elapsed());

        // On early exits (errors, cancellation) there is no async scope
        // left; spawn the spaced removal when a runtime is available.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if !remaining.is_zero() {
                    tokio::time::sleep(remaining).await;
                }
                let _ = fs::remove_file(&path).await;
            });
        } else {
            let _ = std::fs::remove_file(&path);
        }
    }
}
