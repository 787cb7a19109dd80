//! Helpers for tests that spawn real processes.

use std::path::PathBuf;

/// Check whether tests that need a POSIX shell should run.
///
/// `SHEPHERD_SKIP_PROCESS_TESTS=1` always disables them.
#[must_use]
pub fn process_tests_enabled() -> bool {
    let skip = std::env::var("SHEPHERD_SKIP_PROCESS_TESTS")
        .ok()
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    !skip && shell_path().is_some()
}

/// Absolute path of `sh`, if one is on `PATH`.
#[must_use]
pub fn shell_path() -> Option<PathBuf> {
    which::which("sh").ok()
}

/// `sh -c <script>` as program and arguments.
#[must_use]
pub fn sh(script: &str) -> (String, Vec<String>) {
    ("sh".to_string(), vec!["-c".to_string(), script.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_unix_has_a_shell() {
        assert!(shell_path().is_some());
    }

    #[test]
    fn test_sh_wraps_script() {
        let (program, args) = sh("exit 3");
        assert_eq!(program, "sh");
        assert_eq!(args, vec!["-c", "exit 3"]);
    }
}
