//! Working-file utilities.
//!
//! The work dir and the final storage mount are often different
//! filesystems, so plain renames can fail with EXDEV; `move_file`
//! falls back to copy-then-delete in that case.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Move a file, surviving cross-device boundaries.
///
/// Tries a rename first. On EXDEV the file is copied to a temp name
/// next to `dst` and renamed into place, so the destination never
/// holds a half-written file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "cross-device rename, copying instead"
            );
            copy_then_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV is errno 18 on Linux and macOS.
fn is_cross_device(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_then_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let staging = dst.with_extension("part");

    fs::copy(src, &staging).await?;

    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(MediaError::from(e));
    }

    // Source removal is best effort; the move itself already succeeded.
    if let Err(e) = fs::remove_file(src).await {
        warn!(src = %src.display(), error = %e, "failed to remove moved source file");
    }
    Ok(())
}

/// Best-effort file removal for cleanup paths.
pub async fn remove_quiet(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed working file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove working file"),
    }
}
