//! Ready-made line processors.
//!
//! A processor is called by the output and error pumps once per line, on the
//! pump's thread. It must not block for long: while it runs, that stream is
//! not drained.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use crate::io_record::{Channel, IoRecord};
use crate::managed::ManagedProcess;

/// Callback invoked for each output or error line of a process.
pub type Processor = Arc<dyn Fn(&ManagedProcess, &IoRecord) + Send + Sync>;

/// Ignores every line. The lines are still logged.
#[must_use]
pub fn noop() -> Processor {
    Arc::new(|_, _| {})
}

/// Echoes formatted lines to the terminal: errors to stderr, everything else to stdout.
#[must_use]
pub fn printing() -> Processor {
    Arc::new(|_, record| {
        let line = record.formatted();
        if record.channel == Channel::Error {
            let _ = writeln!(std::io::stderr().lock(), "{line}");
        } else {
            let _ = writeln!(std::io::stdout().lock(), "{line}");
        }
    })
}

/// Forwards lines to `tracing` at debug level.
#[must_use]
pub fn tracing() -> Processor {
    Arc::new(|process, record| {
        ::tracing::debug!(
            target: "shepherd::process",
            pid = process.pid().unwrap_or_default(),
            channel = %record.channel,
            "{}",
            record.plain_text()
        );
    })
}

/// Collects lines into a shared vector, e.g. for an interactive driver that
/// inspects what a process printed so far.
#[must_use]
pub fn collecting() -> (Processor, Arc<Mutex<Vec<IoRecord>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let processor: Processor = Arc::new(move |_, record| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    });
    (processor, lines)
}
