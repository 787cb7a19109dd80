//! A single captured line and the channel it was captured on.

use std::fmt;

use serde::Serialize;
use strum::{EnumIter, IntoStaticStr};

use crate::ansi;

/// The stream a record belongs to.
///
/// `Meta` carries the engine's own narration (what was executed, how it
/// ended) and is interleaved with the child's streams in the log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    Meta,
    Input,
    Output,
    Error,
}

impl Channel {
    /// Name of the standard stream backing this channel, used in failure messages.
    #[must_use]
    pub const fn stream_label(self) -> &'static str {
        match self {
            Channel::Meta => "meta",
            Channel::Input => "stdin",
            Channel::Output => "stdout",
            Channel::Error => "stderr",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

/// One complete line of captured I/O.
///
/// `text` is stored exactly as received (escape sequences included) minus
/// the line terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IoRecord {
    pub channel: Channel,
    pub text: String,
}

impl IoRecord {
    #[must_use]
    pub fn new(channel: Channel, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn meta(text: impl Into<String>) -> Self {
        Self::new(Channel::Meta, text)
    }

    #[must_use]
    pub fn output(text: impl Into<String>) -> Self {
        Self::new(Channel::Output, text)
    }

    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Channel::Error, text)
    }

    /// Decode a line of raw bytes, replacing invalid UTF-8.
    #[must_use]
    pub fn from_bytes(channel: Channel, bytes: &[u8]) -> Self {
        Self::new(channel, String::from_utf8_lossy(bytes))
    }

    /// The text with all ANSI escape sequences removed.
    #[must_use]
    pub fn plain_text(&self) -> String {
        ansi::strip_escape_sequences(&self.text)
    }

    /// The text styled for its channel.
    #[must_use]
    pub fn formatted(&self) -> String {
        ansi::style_for_channel(self.channel, &self.text)
    }

    /// True if the line holds nothing but whitespace once escapes are removed.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.plain_text().trim().is_empty()
    }
}

impl fmt::Display for IoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_strips_escapes() {
        let record = IoRecord::output("\x1b[33mwarn\x1b[0m: disk almost full");
        assert_eq!(record.plain_text(), "warn: disk almost full");
    }

    #[test]
    fn blank_detection_ignores_escapes() {
        assert!(IoRecord::output("  \x1b[0m ").is_blank());
        assert!(IoRecord::meta("").is_blank());
        assert!(!IoRecord::error("x").is_blank());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let record = IoRecord::from_bytes(Channel::Output, b"ok \xff end");
        assert_eq!(record.text, "ok \u{FFFD} end");
    }

    #[test]
    fn channel_names() {
        assert_eq!(Channel::Output.to_string(), "output");
        assert_eq!(Channel::Error.stream_label(), "stderr");
        assert_eq!(Channel::Input.stream_label(), "stdin");
    }

    #[test]
    fn serializes_with_lowercase_channel() {
        let json = serde_json::to_string(&IoRecord::error("boom")).unwrap();
        assert_eq!(json, r#"{"channel":"error","text":"boom"}"#);
    }
}
