//! Atomic file replacement for reports written by the CLI.
//!
//! The content goes to a temporary file next to the target, is synced, and
//! then renamed over the target. Readers see either the old or the new file.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Write `content` to `path` atomically, creating parent directories.
///
/// Returns the number of rename retries that were needed (Windows only;
/// always 0 elsewhere).
pub fn write_file_atomic(path: &Path, content: &str) -> Result<u32> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create parent directory: {}", dir.display()))?;

    let mut temp_file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in: {}", dir.display()))?;
    temp_file
        .write_all(content.as_bytes())
        .context("Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    persist(temp_file, path)
        .with_context(|| format!("Failed to atomically write file: {}", path.display()))
}

#[cfg(not(windows))]
fn persist(temp_file: NamedTempFile, target: &Path) -> Result<u32> {
    temp_file
        .persist(target)
        .map(|_| 0)
        .map_err(|e| anyhow::anyhow!(e.error))
}

/// Windows can refuse the rename while a scanner or indexer holds the target
/// open; retry with exponential backoff, at most 250ms in total.
#[cfg(windows)]
fn persist(mut temp_file: NamedTempFile, target: &Path) -> Result<u32> {
    use std::io::ErrorKind;
    use std::thread;
    use std::time::Duration;

    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 10;
    const MAX_TOTAL_DELAY_MS: u64 = 250;

    let mut retries = 0;
    let mut slept_ms = 0;
    loop {
        match temp_file.persist(target) {
            Ok(_) => return Ok(retries),
            Err(e) => {
                let retryable = matches!(e.error.kind(), ErrorKind::PermissionDenied);
                let delay_ms = INITIAL_DELAY_MS * 2_u64.pow(retries);
                if !retryable || retries >= MAX_RETRIES || slept_ms + delay_ms > MAX_TOTAL_DELAY_MS {
                    return Err(anyhow::anyhow!(e.error));
                }
                thread::sleep(Duration::from_millis(delay_ms));
                slept_ms += delay_ms;
                retries += 1;
                temp_file = e.file;
            }
        }
    }
}
