//! Exit code constants for the shepherd binary.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | The process exited with the expected code |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `EXIT_CODE_MISMATCH` | The process exited with an unexpected code |
//! | 4 | `IO_FAILURE` | Pumping a stream or waiting for the exit failed |
//! | 10 | `TIMEOUT` | The timed wait elapsed |
//! | 127 | `SPAWN_FAILURE` | The process could not be started |

/// Exit codes matching the documented exit code table.
///
/// # Example
///
/// ```rust
/// use shepherd_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SPAWN_FAILURE.as_i32(), 127);
/// assert_eq!(ExitCode::SUCCESS, ExitCode::from_i32(0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);

    pub const INTERNAL: ExitCode = ExitCode(1);

    pub const CLI_ARGS: ExitCode = ExitCode(2);

    pub const EXIT_CODE_MISMATCH: ExitCode = ExitCode(3);

    pub const IO_FAILURE: ExitCode = ExitCode(4);

    pub const TIMEOUT: ExitCode = ExitCode(10);

    pub const SPAWN_FAILURE: ExitCode = ExitCode(127);

    /// Numeric value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
