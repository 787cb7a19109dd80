//! Byte-level line reassembly.
//!
//! Producers hand over bytes in whatever chunks the OS delivers them. A
//! [`LineBuffer`] turns those chunks back into complete lines without ever
//! splitting a multi-byte terminator or a multi-byte character, no matter
//! where the chunk boundaries fall.
//!
//! Recognized terminators (longest match wins):
//!
//! | Terminator | Bytes |
//! |------------|-------|
//! | CRLF | `0D 0A` |
//! | LF | `0A` |
//! | CR | `0D` |
//! | LINE SEPARATOR (U+2028) | `E2 80 A8` |
//! | PARAGRAPH SEPARATOR (U+2029) | `E2 80 A9` |
//! | NEXT LINE (U+0085) | `C2 85` |
//!
//! A trailing CR is held back until the next byte arrives, since it may be
//! the first half of a CRLF.

/// Accumulates bytes of a single stream and yields complete lines.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Offset up to which `pending` has been scanned without finding a terminator.
    scanned: usize,
}

/// Outcome of inspecting the bytes at one position of the buffer.
enum Terminator {
    /// No terminator starts here.
    None,
    /// A terminator of the given byte length starts here.
    Found(usize),
    /// A terminator may start here but more bytes are needed to decide.
    Incomplete,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every line completed by them, terminators removed.
    ///
    /// Lines are returned in order. An empty line between two terminators is
    /// returned as an empty vector.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        if bytes.is_empty() {
            return Vec::new();
        }
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut line_start = 0;
        let mut i = self.scanned;
        while i < self.pending.len() {
            match terminator_at(&self.pending, i) {
                Terminator::None => i += 1,
                Terminator::Found(len) => {
                    lines.push(self.pending[line_start..i].to_vec());
                    i += len;
                    line_start = i;
                }
                Terminator::Incomplete => break,
            }
        }

        self.pending.drain(..line_start);
        self.scanned = i - line_start;
        lines
    }

    /// Take whatever unterminated content remains, if any.
    ///
    /// A held-back trailing CR counts as a terminator at this point.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.scanned = 0;
        if self.pending.is_empty() {
            return None;
        }
        let mut rest = std::mem::take(&mut self.pending);
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        Some(rest)
    }

    /// Bytes received since the last complete line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Content of the current partial line that is safe to show right now.
    ///
    /// Excludes a held-back CR and any incomplete UTF-8 sequence at the end.
    #[must_use]
    pub fn displayable_prefix(&self) -> &[u8] {
        let mut end = self.pending.len();
        if self.pending.last() == Some(&b'\r') {
            end -= 1;
        }
        let candidate = &self.pending[..end];
        match std::str::from_utf8(candidate) {
            Ok(_) => candidate,
            Err(e) if e.error_len().is_none() => &candidate[..e.valid_up_to()],
            Err(_) => candidate,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn terminator_at(buf: &[u8], i: usize) -> Terminator {
    let next = |offset: usize| buf.get(i + offset).copied();
    match buf[i] {
        b'\n' => Terminator::Found(1),
        b'\r' => match next(1) {
            Some(b'\n') => Terminator::Found(2),
            Some(_) => Terminator::Found(1),
            None => Terminator::Incomplete,
        },
        0xC2 => match next(1) {
            Some(0x85) => Terminator::Found(2),
            Some(_) => Terminator::None,
            None => Terminator::Incomplete,
        },
        0xE2 => match (next(1), next(2)) {
            (Some(0x80), Some(0xA8 | 0xA9)) => Terminator::Found(3),
            (Some(0x80), None) | (None, _) => Terminator::Incomplete,
            _ => Terminator::None,
        },
        _ => Terminator::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(buf: &mut LineBuffer, input: &str) -> Vec<String> {
        buf.push(input.as_bytes())
            .into_iter()
            .map(|l| String::from_utf8(l).unwrap())
            .collect()
    }

    #[test]
    fn splits_on_every_separator() {
        let mut buf = LineBuffer::new();
        let got = lines(&mut buf, "a\r\nb\nc\rd\u{2028}e\u{2029}f\u{0085}g\n");
        assert_eq!(got, vec!["a", "b", "c", "d", "e", "f", "g"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn keeps_empty_lines() {
        let mut buf = LineBuffer::new();
        assert_eq!(lines(&mut buf, "\n\nx\n"), vec!["", "", "x"]);
    }

    #[test]
    fn crlf_split_across_pushes_is_one_terminator() {
        let mut buf = LineBuffer::new();
        assert!(lines(&mut buf, "abc\r").is_empty());
        assert_eq!(lines(&mut buf, "\ndef\n"), vec!["abc", "def"]);
    }

    #[test]
    fn lone_cr_is_resolved_by_next_byte() {
        let mut buf = LineBuffer::new();
        assert!(lines(&mut buf, "abc\r").is_empty());
        assert_eq!(lines(&mut buf, "x"), vec!["abc"]);
        assert_eq!(buf.pending(), b"x");
    }

    #[test]
    fn multibyte_separator_split_byte_by_byte() {
        let mut buf = LineBuffer::new();
        let mut got = Vec::new();
        for b in "one\u{2028}two\u{0085}".as_bytes() {
            got.extend(buf.push(std::slice::from_ref(b)));
        }
        assert_eq!(got, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn multibyte_characters_are_not_mistaken_for_separators() {
        let mut buf = LineBuffer::new();
        // U+2026 and U+00A0 share lead bytes with the separators
        assert_eq!(lines(&mut buf, "wait\u{2026}\u{00A0}ok\n"), vec!["wait\u{2026}\u{00A0}ok"]);
    }

    #[test]
    fn finish_returns_unterminated_rest() {
        let mut buf = LineBuffer::new();
        assert!(lines(&mut buf, "hello").is_empty());
        assert_eq!(buf.finish(), Some(b"hello".to_vec()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn finish_treats_trailing_cr_as_terminator() {
        let mut buf = LineBuffer::new();
        buf.push(b"last\r");
        assert_eq!(buf.finish(), Some(b"last".to_vec()));
    }

    #[test]
    fn displayable_prefix_stops_before_partial_character() {
        let mut buf = LineBuffer::new();
        let snowman = "\u{2603}".as_bytes();
        buf.push(b"abc");
        buf.push(&snowman[..2]);
        assert_eq!(buf.displayable_prefix(), b"abc");
        buf.push(&snowman[2..]);
        assert_eq!(buf.displayable_prefix(), "abc\u{2603}".as_bytes());
    }

    #[test]
    fn long_line_is_buffered_in_full() {
        let mut buf = LineBuffer::new();
        let chunk = "x".repeat(4096);
        for _ in 0..64 {
            assert!(buf.push(chunk.as_bytes()).is_empty());
        }
        let got = buf.push(b"\n");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].len(), 4096 * 64);
    }
}
