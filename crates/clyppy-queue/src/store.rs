//! The on-disk pending-task file.
//!
//! Format: magic `CLYQ`, one format-version byte, then frames of
//! `{u8 tag, u32 LE payload length, JSON payload}`. Quickembed and
//! slash tasks carry distinct tags so either list can evolve alone.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use clyppy_models::task::{QuickembedTask, SlashCommandTask};

use crate::error::{QueueError, QueueResult};

const MAGIC: &[u8; 4] = b"CLYQ";
const FORMAT_VERSION: u8 = 1;

const TAG_QUICKEMBED: u8 = 1;
const TAG_SLASH: u8 = 2;

/// The two FIFO lists the embedder defers work into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingTasks {
    pub quickembeds: VecDeque<QuickembedTask>,
    pub slash_commands: VecDeque<SlashCommandTask>,
}

impl PendingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.quickembeds.is_empty() && self.slash_commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.quickembeds.len() + self.slash_commands.len()
    }

    pub fn push_quickembed(&mut self, task: QuickembedTask) {
        self.quickembeds.push_back(task);
    }

    pub fn push_slash(&mut self, task: SlashCommandTask) {
        self.slash_commands.push_back(task);
    }
}

/// Reads and writes the pending-task file.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `tasks` atomically: temp file in the same directory,
    /// fsync, rename. An empty set still writes a valid (frameless)
    /// file so replay logic stays uniform.
    pub async fn save(&self, tasks: &PendingTasks) -> QueueResult<()> {
        let bytes = encode(tasks)?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &self.path).await?;

        info!(
            path = %self.path.display(),
            quickembeds = tasks.quickembeds.len(),
            slash_commands = tasks.slash_commands.len(),
            "saved pending tasks"
        );
        Ok(())
    }

    /// Load the file, dropping expired slash tasks, and delete it.
    ///
    /// A missing file is an empty queue. A malformed file is an error;
    /// startup logs and continues empty rather than refusing to boot.
    pub async fn load(&self) -> QueueResult<PendingTasks> {
        let tasks = self.peek().await?;

        // Loaded once, replayed once: remove the file so a crash during
        // replay cannot double-run the work.
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove pending-task file");
            }
        }

        info!(
            quickembeds = tasks.quickembeds.len(),
            slash_commands = tasks.slash_commands.len(),
            "loaded pending tasks"
        );
        Ok(tasks)
    }

    /// Read the file without consuming it. Expired slash tasks are filtered
    /// here too, so the listing matches what a restart would replay.
    pub async fn peek(&self) -> QueueResult<PendingTasks> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no pending-task file");
                return Ok(PendingTasks::new());
            }
            Err(e) => return Err(QueueError::from(e)),
        };

        let (tasks, dropped) = decode(&bytes)?;
        if dropped > 0 {
            info!(dropped, "dropped expired slash tasks on load");
        }
        Ok(tasks)
    }
}

fn encode(tasks: &PendingTasks) -> QueueResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(MAGIC);
    buf.push(FORMAT_VERSION);

    for task in &tasks.quickembeds {
        push_frame(&mut buf, TAG_QUICKEMBED, &serde_json::to_vec(task)?);
    }
    for task in &tasks.slash_commands {
        push_frame(&mut buf, TAG_SLASH, &serde_json::to_vec(task)?);
    }
    Ok(buf)
}

fn push_frame(buf: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    buf.push(tag);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
}

/// Decode the file body. Returns the tasks plus the number of expired
/// slash tasks that were dropped.
fn decode(bytes: &[u8]) -> QueueResult<(PendingTasks, usize)> {
    if bytes.len() < MAGIC.len() + 1 {
        return Err(QueueError::corrupt("file shorter than header"));
    }
    if &bytes[..4] != MAGIC {
        return Err(QueueError::BadMagic);
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(QueueError::UnsupportedVersion(bytes[4]));
    }

    let mut tasks = PendingTasks::new();
    let mut dropped = 0usize;
    let mut at = 5usize;

    while at < bytes.len() {
        if at + 5 > bytes.len() {
            return Err(QueueError::corrupt("truncated frame header"));
        }
        let tag = bytes[at];
        let len = u32::from_le_bytes([bytes[at + 1], bytes[at + 2], bytes[at + 3], bytes[at + 4]])
            as usize;
        at += 5;

        let end = at
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| QueueError::corrupt("frame length past end of file"))?;
        let payload = &bytes[at..end];
        at = end;

        match tag {
            TAG_QUICKEMBED => {
                tasks.push_quickembed(serde_json::from_slice(payload)?);
            }
            TAG_SLASH => {
                let task: SlashCommandTask = serde_json::from_slice(payload)?;
                if task.is_expired() {
                    dropped += 1;
                } else {
                    tasks.push_slash(task);
                }
            }
            other => {
                // Unknown tags are skippable thanks to the length
                // prefix; a newer writer may have added one.
                warn!(tag = other, "skipping unknown pending-task frame");
            }
        }
    }

    Ok((tasks, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use clyppy_models::GuildContext;
    use tempfile::TempDir;

    fn quickembed(url: &str) -> QuickembedTask {
        QuickembedTask::new(url, 100, 200, 300, "author", GuildContext::guild(400, "G"))
    }

    fn slash(url: &str) -> SlashCommandTask {
        SlashCommandTask::new(url, 1, "tok", 2, 3, "caller", GuildContext::dm())
    }

    #[tokio::test]
    async fn test_save_load_round_trip_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("pending.clyq"));

        let mut tasks = PendingTasks::new();
        tasks.push_quickembed(quickembed("https://clips.twitch.tv/One"));
        tasks.push_quickembed(quickembed("https://clips.twitch.tv/Two"));
        tasks.push_slash(slash("https://youtu.be/abc"));

        store.save(&tasks).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, tasks);
        assert_eq!(
            loaded.quickembeds[0].url,
            "https://clips.twitch.tv/One"
        );
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("pending.clyq"));
        let loaded = store.load().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_peek_leaves_the_file_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.clyq");
        let store = TaskStore::new(&path);

        let mut tasks = PendingTasks::new();
        tasks.push_quickembed(quickembed("https://clips.twitch.tv/One"));
        store.save(&tasks).await.unwrap();

        let peeked = store.peek().await.unwrap();
        assert_eq!(peeked, tasks);
        assert!(path.exists());
        assert_eq!(store.peek().await.unwrap(), tasks);
    }

    #[tokio::test]
    async fn test_load_deletes_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.clyq");
        let store = TaskStore::new(&path);

        let mut tasks = PendingTasks::new();
        tasks.push_quickembed(quickembed("https://kick.com/u/clips/clip_1"));
        store.save(&tasks).await.unwrap();
        assert!(path.exists());

        store.load().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_expired_slash_tasks_dropped_on_load() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("pending.clyq"));

        let mut stale = slash("https://youtu.be/old");
        stale.created_at = Utc::now() - Duration::minutes(16);
        let fresh = slash("https://youtu.be/new");

        let mut tasks = PendingTasks::new();
        tasks.push_slash(stale);
        tasks.push_slash(fresh.clone());
        store.save(&tasks).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.slash_commands.len(), 1);
        assert_eq!(loaded.slash_commands[0].url, fresh.url);
    }

    #[tokio::test]
    async fn test_bad_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.clyq");
        fs::write(&path, b"NOPE\x01").await.unwrap();

        let err = TaskStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, QueueError::BadMagic));
    }

    #[tokio::test]
    async fn test_unknown_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.clyq");
        fs::write(&path, b"CLYQ\x63").await.unwrap();

        let err = TaskStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, QueueError::UnsupportedVersion(0x63)));
    }

    #[tokio::test]
    async fn test_truncated_frame_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.clyq");
        // Header + tag + length claiming 100 bytes, then nothing.
        let mut bytes = b"CLYQ\x01\x01".to_vec();
        bytes.extend_from_slice(&100u32.to_le_bytes());
        fs::write(&path, &bytes).await.unwrap();

        let err = TaskStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, QueueError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_unknown_tag_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.clyq");

        let mut bytes = b"CLYQ\x01".to_vec();
        push_frame(&mut bytes, 0x7f, b"{}");
        push_frame(
            &mut bytes,
            TAG_QUICKEMBED,
            &serde_json::to_vec(&quickembed("https://youtu.be/x")).unwrap(),
        );
        fs::write(&path, &bytes).await.unwrap();

        let loaded = TaskStore::new(&path).load().await.unwrap();
        assert_eq!(loaded.quickembeds.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = TaskStore::new(dir.path().join("pending.clyq"));
        store.save(&PendingTasks::new()).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }
}
