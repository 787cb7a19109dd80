use std::fmt;

use serde::Serialize;

use crate::completion::Completion;
use crate::io_record::{Channel, IoRecord};
use crate::process::Process;

/// Immutable snapshot of a process taken when it completed.
///
/// The per-channel aggregates are derived from `all` and join the plain text
/// of that channel's lines with `\n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedProcess {
    pub pid: u32,
    pub exit_code: i32,
    /// Rendered command line
    pub command: String,
    /// Every logged line across all channels, in arrival order
    pub all: Vec<IoRecord>,
}

/// A completed process whose full I/O log is attached.
pub type LoggedProcess = CompletedProcess;

impl CompletedProcess {
    /// Plain text of all records on `channel`.
    #[must_use]
    pub fn channel_text(&self, channel: Channel) -> String {
        self.all
            .iter()
            .filter(|record| record.channel == channel)
            .map(IoRecord::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[must_use]
    pub fn meta(&self) -> String {
        self.channel_text(Channel::Meta)
    }

    #[must_use]
    pub fn input(&self) -> String {
        self.channel_text(Channel::Input)
    }

    #[must_use]
    pub fn output(&self) -> String {
        self.channel_text(Channel::Output)
    }

    #[must_use]
    pub fn error(&self) -> String {
        self.channel_text(Channel::Error)
    }

    /// Whether any line, escapes removed, contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.all.iter().any(|record| record.plain_text().contains(needle))
    }
}

impl fmt::Display for CompletedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.all.iter().map(IoRecord::formatted).collect();
        f.write_str(&lines.join("\n"))
    }
}

impl Process for CompletedProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&self) -> bool {
        false
    }

    fn exit_code(&self) -> Option<i32> {
        Some(self.exit_code)
    }

    fn expected_exit_code(&self) -> i32 {
        self.exit_code
    }

    fn on_completion(&self) -> Completion {
        let completion = Completion::new();
        completion.resolve(Ok(self.clone()));
        completion
    }

    fn stop(&self) {}

    fn kill(&self) {}
}
