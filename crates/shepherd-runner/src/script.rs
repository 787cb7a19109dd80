//! Materializing shell lines into temporary executable scripts.
//!
//! Scripts are kept on disk after use; removing them is up to the caller
//! (see [`crate::dump::cleanup_stale`] with [`SCRIPT_PREFIX`]).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::RunnerError;

/// File name prefix of every materialized script.
pub const SCRIPT_PREFIX: &str = "shepherd.process.";

/// Interpreter used when none is configured.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Write `lines` to a fresh executable script in `dir` and return its path.
///
/// With `cwd` set the script first changes into it and exits with status 1
/// if that fails.
///
/// # Errors
///
/// [`RunnerError::Script`] if the script cannot be written.
pub fn write_script<S: AsRef<str>>(
    dir: &Path,
    lines: &[S],
    cwd: Option<&Path>,
    shell: &str,
) -> Result<PathBuf, RunnerError> {
    let script_error = |path: &Path, source: io::Error| RunnerError::Script {
        path: path.to_path_buf(),
        source: source.into(),
    };

    fs::create_dir_all(dir).map_err(|e| script_error(dir, e))?;
    let mut file = tempfile::Builder::new()
        .prefix(SCRIPT_PREFIX)
        .suffix(".sh")
        .tempfile_in(dir)
        .map_err(|e| script_error(dir, e))?;
    let path = file.path().to_path_buf();

    file.write_all(render_script(lines, cwd, shell).as_bytes())
        .and_then(|()| file.flush())
        .and_then(|()| make_executable(&path))
        .map_err(|e| script_error(&path, e))?;
    // Close the handle before anyone tries to execute the file
    let (_, path) = file.keep().map_err(|e| script_error(&path, e.error))?;

    debug!(script = %path.display(), lines = lines.len(), "Materialized script");
    Ok(path)
}

/// Text of a script running `lines`.
#[must_use]
pub fn render_script<S: AsRef<str>>(lines: &[S], cwd: Option<&Path>, shell: &str) -> String {
    let mut script = format!("#!{shell}\n");
    if let Some(cwd) = cwd {
        let cwd = cwd.to_string_lossy();
        script.push_str(&format!("cd {} || exit 1\n", shell_words::quote(&cwd)));
    }
    for line in lines {
        script.push_str(line.as_ref());
        script.push('\n');
    }
    script
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
