//! Failure dumps: persisting a process's I/O history for later diagnosis.
//!
//! Every failure report carries the recent lines of the log. When the dump
//! files could be written the report also points at them. When they could
//! not, the report says why and the recent lines are all that survives.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::io_log::{DumpFiles, IoLog};

/// File name prefix of every dump.
pub const DUMP_PREFIX: &str = "shepherd.dump.";

/// File name suffix of the plain dump.
pub const DUMP_SUFFIX: &str = ".log";

/// Number of trailing lines quoted in a report by default.
pub const DEFAULT_RECENT_LINES: usize = 10;

/// Where dumps go and how much of them is quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpSettings {
    pub dir: PathBuf,
    pub recent_lines: usize,
}

impl DumpSettings {
    /// `<system temp>/shepherd`
    #[must_use]
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("shepherd")
    }
}

impl Default for DumpSettings {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            recent_lines: DEFAULT_RECENT_LINES,
        }
    }
}

/// A written (or attempted) dump together with its human-readable report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dump {
    /// Escape-free report: message, dump location (if any) and recent lines.
    pub report: String,
    /// Set when both dump files were written.
    pub files: Option<DumpFiles>,
    /// Set when writing the dump failed.
    pub write_error: Option<String>,
}

impl Dump {
    /// Persist `log` into a fresh uniquely named file pair and build the report.
    ///
    /// Never fails: a write failure is folded into the report.
    #[must_use]
    pub fn capture(log: &IoLog, message: &str, pid: u32, settings: &DumpSettings) -> Self {
        let recent: Vec<String> = log
            .recent(settings.recent_lines)
            .iter()
            .map(|record| record.plain_text())
            .collect();
        let headline = capitalize(message);

        match write_pair(log, pid, &settings.dir) {
            Ok(files) => {
                debug!(
                    pid = pid,
                    plain = %files.plain.display(),
                    formatted = %files.formatted.display(),
                    "Wrote process dump"
                );
                let report = format!(
                    "{headline}\n\
                     ➜ A dump has been written to:\n\
                     \x20 - {} (unformatted)\n\
                     \x20 - {} (formatted)\n\
                     {}",
                    files.plain.display(),
                    files.formatted.display(),
                    recent_section(&recent),
                );
                Self {
                    report,
                    files: Some(files),
                    write_error: None,
                }
            }
            Err(err) => {
                let error = err.to_string();
                warn!(pid = pid, error = %error, "Failed to write process dump");
                let report = format!(
                    "{headline}\n\
                     In the attempt to persist the corresponding dump the following error occurred:\n\
                     {error}\n\
                     \n\
                     {}",
                    recent_section(&recent),
                );
                Self {
                    report,
                    files: None,
                    write_error: Some(error),
                }
            }
        }
    }

    /// True if the dump files exist on disk.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.files.is_some()
    }

    /// One-line note on where the dump went, for the process's meta narrative.
    #[must_use]
    pub fn location(&self) -> String {
        match (&self.files, &self.write_error) {
            (Some(files), _) => format!(
                "A dump has been written to {} (unformatted) and {} (formatted).",
                files.plain.display(),
                files.formatted.display()
            ),
            (None, Some(error)) => format!("The dump could not be written: {error}"),
            (None, None) => "No dump was written.".to_string(),
        }
    }
}

impl fmt::Display for Dump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report)
    }
}

fn write_pair(log: &IoLog, pid: u32, dir: &Path) -> Result<DumpFiles, RunnerError> {
    let dump_write = |path: &Path, source: io::Error| RunnerError::DumpWrite {
        path: path.to_path_buf(),
        source: source.into(),
    };

    fs::create_dir_all(dir).map_err(|e| dump_write(dir, e))?;
    let target = tempfile::Builder::new()
        .prefix(&format!("{DUMP_PREFIX}{pid}."))
        .suffix(DUMP_SUFFIX)
        .tempfile_in(dir)
        .and_then(|file| file.keep().map_err(|e| e.error))
        .map_err(|e| dump_write(dir, e))?
        .1;
    log.persist_dump(&target).map_err(|e| dump_write(&target, e))
}

fn recent_section(lines: &[String]) -> String {
    let mut section = format!("➜ The last {} lines are:", lines.len());
    for line in lines {
        section.push_str("\n  ");
        section.push_str(line);
    }
    section
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Remove files in `dir` whose names start with `prefix` and that are older
/// than `max_age`, then trim the survivors to the `max_files` newest.
///
/// Returns the number of files removed. A missing `dir` is not an error.
pub fn cleanup_stale(
    dir: &Path,
    prefix: &str,
    max_age: Duration,
    max_files: usize,
) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            candidates.push((metadata.modified()?, entry.path()));
        }
    }
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (index, (modified, path)) in candidates.into_iter().enumerate() {
        let age = now.duration_since(modified).unwrap_or_default();
        if index >= max_files || age > max_age {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    if removed > 0 {
        debug!(dir = %dir.display(), removed = removed, "Removed stale files");
    }
    Ok(removed)
}
