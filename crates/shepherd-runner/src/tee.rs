//! Stdin decorator that copies every byte written into an [`IoLog`].

use std::io::{self, Write};
use std::sync::Arc;

use crate::io_log::IoLog;
use crate::io_record::Channel;

/// Writer that records everything the inner writer accepted.
#[derive(Debug)]
pub struct TeeWriter<W> {
    inner: W,
    log: Arc<IoLog>,
    channel: Channel,
}

impl<W: Write> TeeWriter<W> {
    pub fn new(inner: W, log: Arc<IoLog>, channel: Channel) -> Self {
        Self {
            inner,
            log,
            channel,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TeeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.log.add(self.channel, &buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_logs_what_it_writes() {
        let log = Arc::new(IoLog::new());
        let mut writer = TeeWriter::new(Vec::new(), Arc::clone(&log), Channel::Input);
        writer.write_all(b"typed\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.into_inner(), b"typed\n");
        assert_eq!(log.history()[0].channel, Channel::Input);
    }
}
