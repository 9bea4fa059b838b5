//! Crash-safe file replacement.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes `data` to a temporary file next to `path`, fsyncs it and renames
/// it over `path`. Readers see either the old or the new content.
///
/// # Errors
/// Returns an error if the parent directory is missing or any write,
/// sync or rename fails.
pub async fn write_atomic(path: PathBuf, data: Vec<u8>) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &data))
        .await
        .map_err(|e| std::io::Error::other(format!("write task panicked: {e}")))?
}

/// Blocking variant of [`write_atomic`].
///
/// # Errors
/// Same as [`write_atomic`].
pub fn write_atomic_blocking(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("Invalid path"))?;
    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(data)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Removes a file, treating "not found" as success.
///
/// # Errors
/// Returns any other I/O error.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
