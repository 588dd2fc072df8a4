//! Filesystem helpers for render outputs.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_LINK: i32 = 18;

/// Size of `path` if it exists as a non-empty regular file.
pub async fn non_empty_file_size(path: &Path) -> Option<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}

/// Move `src` to `dst`, creating the parent directory.
///
/// Falls back to copy-then-rename when the two paths are on different
/// filesystems, so `dst` never appears half-written.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_LINK) => {
            debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_then_rename(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

async fn copy_then_rename(src: &Path, dst: &Path) -> MediaResult<()> {
    let staging = dst.with_extension("partial");
    fs::copy(src, &staging).await?;

    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!("Failed to remove {} after copy: {}", src.display(), e);
    }
    Ok(())
}

/// Remove a file, ignoring a missing one.
pub async fn remove_file_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Recursively remove a directory, logging instead of failing.
pub async fn remove_dir_best_effort(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed work directory {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove directory {}: {}", path.display(), e),
    }
}
