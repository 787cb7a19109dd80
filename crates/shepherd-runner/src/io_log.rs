//! Thread-safe, line-oriented log of everything a process said and heard.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use strum::IntoEnumIterator;

use crate::io_record::{Channel, IoRecord};
use crate::line_buffer::LineBuffer;

/// Paths of a persisted dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpFiles {
    /// Escape-free rendering (`<stem>.log`).
    pub plain: PathBuf,
    /// Rendering with per-channel styling (`<stem>.ansi.log`).
    pub formatted: PathBuf,
}

impl DumpFiles {
    /// Derive both dump paths from `target`, dropping a `.log` suffix if present.
    #[must_use]
    pub fn for_target(target: &Path) -> Self {
        let raw = target.as_os_str().to_string_lossy();
        let stem = raw.strip_suffix(".log").unwrap_or(&raw);
        Self {
            plain: PathBuf::from(format!("{stem}.log")),
            formatted: PathBuf::from(format!("{stem}.ansi.log")),
        }
    }
}

#[derive(Debug, Default)]
struct LogState {
    history: Vec<IoRecord>,
    pending: [LineBuffer; 4],
}

fn slot(channel: Channel) -> usize {
    match channel {
        Channel::Meta => 0,
        Channel::Input => 1,
        Channel::Output => 2,
        Channel::Error => 3,
    }
}

/// Interleaved history of complete lines across all channels.
///
/// Writers on different channels may call [`IoLog::add`] concurrently. Each
/// channel has its own pending buffer, so a chunk on one channel never
/// splits or reorders lines on another. The history only ever grows.
#[derive(Debug, Default)]
pub struct IoLog {
    state: Mutex<LogState>,
}

impl IoLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes received on `channel`.
    ///
    /// Every line completed by `bytes` is appended to the history, in order.
    /// Empty input is ignored.
    pub fn add(&self, channel: Channel, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut state = self.lock();
        let lines = state.pending[slot(channel)].push(bytes);
        state
            .history
            .extend(lines.iter().map(|line| IoRecord::from_bytes(channel, line)));
    }

    /// Append `message` as one or more complete lines on `channel`.
    pub fn add_message(&self, channel: Channel, message: &str) {
        let mut bytes = Vec::with_capacity(message.len() + 1);
        bytes.extend_from_slice(message.as_bytes());
        bytes.push(b'\n');
        self.add(channel, &bytes);
    }

    /// Turn unterminated trailing content of every channel into final records.
    ///
    /// Called once a process has fully drained, so that output such as
    /// `printf done` without a newline is not lost.
    pub fn flush(&self) {
        let mut state = self.lock();
        for channel in Channel::iter() {
            if let Some(rest) = state.pending[slot(channel)].finish() {
                state.history.push(IoRecord::from_bytes(channel, &rest));
            }
        }
    }

    /// Snapshot of the history at the time of the call.
    #[must_use]
    pub fn history(&self) -> Vec<IoRecord> {
        self.lock().history.clone()
    }

    /// Number of complete lines logged so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The last `n` complete lines, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<IoRecord> {
        let state = self.lock();
        let start = state.history.len().saturating_sub(n);
        state.history[start..].to_vec()
    }

    /// Whether `channel` holds an unterminated partial line.
    #[must_use]
    pub fn has_pending(&self, channel: Channel) -> bool {
        !self.lock().pending[slot(channel)].is_empty()
    }

    /// All lines with escapes removed, joined by `\n`.
    #[must_use]
    pub fn dump_plain(&self) -> String {
        render(&self.lock().history, IoRecord::plain_text)
    }

    /// All lines styled for their channel, joined by `\n`.
    #[must_use]
    pub fn dump_formatted(&self) -> String {
        render(&self.lock().history, IoRecord::formatted)
    }

    /// Write the plain and formatted renderings next to each other.
    ///
    /// See [`DumpFiles::for_target`] for naming. Missing parent directories
    /// are not created.
    pub fn persist_dump(&self, target: &Path) -> io::Result<DumpFiles> {
        let files = DumpFiles::for_target(target);
        let (plain, formatted) = {
            let state = self.lock();
            (
                render(&state.history, IoRecord::plain_text),
                render(&state.history, IoRecord::formatted),
            )
        };
        fs::write(&files.plain, plain)?;
        fs::write(&files.formatted, formatted)?;
        Ok(files)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn render(history: &[IoRecord], line: impl Fn(&IoRecord) -> String) -> String {
    history.iter().map(line).collect::<Vec<_>>().join("\n")
}

impl fmt::Display for IoLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        let partial = state.pending.iter().filter(|b| !b.is_empty()).count();
        write!(f, "IoLog({} ✔; {} …)", state.history.len(), partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn texts(log: &IoLog, channel: Channel) -> Vec<String> {
        log.history()
            .into_iter()
            .filter(|r| r.channel == channel)
            .map(|r| r.text)
            .collect()
    }

    #[test]
    fn lines_complete_across_adds() {
        let log = IoLog::new();
        log.add(Channel::Output, b"hel");
        assert!(log.is_empty());
        assert!(log.has_pending(Channel::Output));
        log.add(Channel::Output, b"lo\nwor");
        log.add(Channel::Output, b"ld\n");
        assert_eq!(texts(&log, Channel::Output), vec!["hello", "world"]);
        assert!(!log.has_pending(Channel::Output));
    }

    #[test]
    fn channels_do_not_interfere() {
        let log = IoLog::new();
        log.add(Channel::Output, b"out-");
        log.add(Channel::Error, b"err\n");
        log.add(Channel::Output, b"done\n");
        let history = log.history();
        assert_eq!(history[0], IoRecord::error("err"));
        assert_eq!(history[1], IoRecord::output("out-done"));
    }

    #[test]
    fn empty_add_yields_nothing() {
        let log = IoLog::new();
        log.add(Channel::Output, b"");
        log.flush();
        assert!(log.is_empty());
    }

    #[test]
    fn flush_emits_unterminated_rest_once() {
        let log = IoLog::new();
        log.add(Channel::Output, b"no newline");
        log.flush();
        log.flush();
        assert_eq!(texts(&log, Channel::Output), vec!["no newline"]);
    }

    #[test]
    fn add_message_splits_multiline_text() {
        let log = IoLog::new();
        log.add_message(Channel::Meta, "first\nsecond");
        assert_eq!(texts(&log, Channel::Meta), vec!["first", "second"]);
    }

    #[test]
    fn recent_returns_tail() {
        let log = IoLog::new();
        for i in 0..20 {
            log.add_message(Channel::Output, &i.to_string());
        }
        let tail: Vec<_> = log.recent(3).into_iter().map(|r| r.text).collect();
        assert_eq!(tail, vec!["17", "18", "19"]);
        assert_eq!(log.recent(100).len(), 20);
    }

    #[test]
    fn dumps_render_plain_and_formatted() {
        let log = IoLog::new();
        log.add(Channel::Output, b"\x1b[1mbold\x1b[0m\n");
        log.add(Channel::Error, b"oops\n");
        assert_eq!(log.dump_plain(), "bold\noops");
        let formatted = log.dump_formatted();
        assert!(formatted.contains('\x1b'));
        assert_eq!(crate::ansi::strip_escape_sequences(&formatted), "bold\noops");
    }

    #[test]
    fn persist_dump_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = IoLog::new();
        log.add_message(Channel::Output, "captured");
        let files = log.persist_dump(&dir.path().join("run.log")).unwrap();
        assert_eq!(files.plain, dir.path().join("run.log"));
        assert_eq!(files.formatted, dir.path().join("run.ansi.log"));
        assert_eq!(fs::read_to_string(&files.plain).unwrap(), "captured");
        assert!(fs::read_to_string(&files.formatted).unwrap().contains("captured"));
    }

    #[test]
    fn persist_dump_does_not_create_parents() {
        let dir = tempfile::tempdir().unwrap();
        let log = IoLog::new();
        let err = log
            .persist_dump(&dir.path().join("missing").join("run"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn concurrent_writers_keep_per_channel_order() {
        let log = Arc::new(IoLog::new());
        let handles: Vec<_> = [Channel::Output, Channel::Error]
            .into_iter()
            .map(|channel| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..200 {
                        // Split every line over two writes
                        log.add(channel, format!("{channel}-").as_bytes());
                        log.add(channel, format!("{i}\n").as_bytes());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for channel in [Channel::Output, Channel::Error] {
            let expected: Vec<_> = (0..200).map(|i| format!("{channel}-{i}")).collect();
            assert_eq!(texts(&log, channel), expected);
        }
    }

    #[test]
    fn display_summarizes_state() {
        let log = IoLog::new();
        log.add(Channel::Output, b"a\nb");
        assert_eq!(log.to_string(), "IoLog(1 ✔; 1 …)");
    }
}
