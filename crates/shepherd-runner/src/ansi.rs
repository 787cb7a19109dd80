//! ANSI escape handling for captured output.

use crossterm::style::Stylize;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::io_record::Channel;

/// CSI sequences, OSC sequences (BEL or ST terminated) and two-byte escapes.
static ESCAPE_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]").unwrap()
});

/// Remove all ANSI escape sequences from `text`.
#[must_use]
pub fn strip_escape_sequences(text: &str) -> String {
    if !text.contains('\x1b') {
        return text.to_string();
    }
    ESCAPE_SEQUENCE.replace_all(text, "").into_owned()
}

/// Style `text` the way records of `channel` are shown on a terminal.
///
/// Error text is stripped first so that the child's own colors cannot
/// override the error styling.
#[must_use]
pub fn style_for_channel(channel: Channel, text: &str) -> String {
    match channel {
        Channel::Meta => text.dark_grey().italic().to_string(),
        Channel::Input => text.blue().dim().italic().to_string(),
        Channel::Output => text.yellow().to_string(),
        Channel::Error => strip_escape_sequences(text).red().bold().to_string(),
    }
}
