//! Error types for process execution

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::dump::Dump;

/// Everything that can go wrong while running a managed process.
///
/// Completion results are shared by every waiter of a process, so the enum is
/// `Clone` and keeps I/O causes behind an [`Arc`]. Variants that describe a
/// failed process carry a [`Dump`] whose report is also their display text.
#[derive(Error, Debug, Clone)]
pub enum RunnerError {
    #[error("{dump}")]
    Spawn {
        command: String,
        reason: String,
        hint: Option<String>,
        dump: Dump,
    },

    #[error("{dump}")]
    ExitCodeMismatch {
        pid: u32,
        command: String,
        actual: i32,
        expected: i32,
        dump: Dump,
    },

    #[error("{dump}")]
    Pump {
        pid: u32,
        command: String,
        channel: &'static str,
        #[source]
        source: Arc<io::Error>,
        dump: Dump,
    },

    #[error("{dump}")]
    Wait {
        pid: u32,
        command: String,
        #[source]
        source: Arc<io::Error>,
        dump: Dump,
    },

    #[error("Process {pid} did not terminate within {timeout:?}")]
    Timeout { pid: u32, timeout: Duration },

    #[error("Failed to write dump to {}: {source}", path.display())]
    DumpWrite {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("Failed to write script {}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl RunnerError {
    /// The dump attached to this failure, if it describes a failed process.
    #[must_use]
    pub fn dump(&self) -> Option<&Dump> {
        match self {
            RunnerError::Spawn { dump, .. }
            | RunnerError::ExitCodeMismatch { dump, .. }
            | RunnerError::Pump { dump, .. }
            | RunnerError::Wait { dump, .. } => Some(dump),
            RunnerError::Timeout { .. }
            | RunnerError::DumpWrite { .. }
            | RunnerError::Script { .. } => None,
        }
    }

    /// Pid of the process this error is about, when one was spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match self {
            RunnerError::ExitCodeMismatch { pid, .. }
            | RunnerError::Pump { pid, .. }
            | RunnerError::Wait { pid, .. }
            | RunnerError::Timeout { pid, .. } => Some(*pid),
            RunnerError::Spawn { .. }
            | RunnerError::DumpWrite { .. }
            | RunnerError::Script { .. } => None,
        }
    }

    /// Short one-line summary without the dump report.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            RunnerError::Spawn {
                command, reason, ..
            } => format!("Failed to start {command}: {reason}"),
            RunnerError::ExitCodeMismatch {
                pid,
                actual,
                expected,
                ..
            } => format!("Process {pid} terminated with exit code {actual}. Expected {expected}."),
            RunnerError::Pump {
                pid,
                channel,
                source,
                ..
            } => format!("An error occurred while processing {channel} of process {pid}: {source}"),
            RunnerError::Wait { pid, source, .. } => {
                format!("Failed to wait for process {pid}: {source}")
            }
            other => other.to_string(),
        }
    }
}
