//! Local handling of downloaded photos and voice notes

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One resolution of a Telegram photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    /// Telegram file id used to download this size
    pub file_id: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// File size in bytes, as reported by Telegram
    pub file_size: u32,
}

impl PhotoRef {
    fn resolution(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Pick the highest-resolution photo; ties go to the bigger file.
///
/// The slice is left untouched. Returns `None` for an empty slice.
#[must_use]
pub fn select_largest_photo(photos: &[PhotoRef]) -> Option<&PhotoRef> {
    photos
        .iter()
        .max_by_key(|p| (p.resolution(), p.file_size))
}

/// Write downloaded bytes to `{dir}/{file_id}.{extension}`, creating `dir` if needed.
///
/// # Errors
///
/// Returns an I/O error if the directory or file cannot be written.
pub async fn save_download(
    dir: &Path,
    file_id: &str,
    extension: &str,
    bytes: &[u8],
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{file_id}.{extension}"));
    tokio::fs::write(&path, bytes).await?;
    debug!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

/// Delete a downloaded file. Failures are logged, never returned.
pub async fn remove_download(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Deleted {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("File {} was already gone", path.display());
        }
        Err(e) => warn!("Failed to delete {}: {e}", path.display()),
    }
}
