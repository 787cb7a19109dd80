//! Managed external processes.
//!
//! A [`ManagedProcess`] wraps one native process: it is spawned lazily, its
//! stdin, stdout and stderr are pumped concurrently into an [`IoLog`], its
//! exit code is checked against the expected one, and a single [`Completion`]
//! signal resolves once the exit has been observed and every stream drained.
//! Failures carry a [`Dump`] of the complete interaction.
//!
//! # Security Model
//!
//! Processes are spawned argv-style from a [`CommandSpec`]. Only specs with
//! redirects go through a shell, by way of a temporary script.

pub mod ansi;
pub mod command_spec;
pub mod completed;
pub mod completion;
pub mod dump;
pub mod error;
pub mod io_log;
pub mod io_record;
pub mod launcher;
pub mod line_buffer;
pub mod managed;
pub mod native;
pub mod pool;
pub mod process;
pub mod processors;
pub mod pump;
pub mod script;
pub mod shutdown;
pub mod tee;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use command_spec::CommandSpec;
pub use completed::{CompletedProcess, LoggedProcess};
pub use completion::{Completion, ProcessResult};
pub use dump::{Dump, DumpSettings, cleanup_stale};
pub use error::RunnerError;
pub use io_log::{DumpFiles, IoLog};
pub use io_record::{Channel, IoRecord};
pub use launcher::{ExecOptions, Launcher, TerminationCallback, wait_with_timeout};
pub use line_buffer::LineBuffer;
pub use managed::{ManagedProcess, ProcessState};
pub use native::{NativeSpawner, Signaller, SpawnedProcess, Spawner};
pub use process::Process;
pub use processors::Processor;
pub use pump::{InputSource, ReaderMode};
pub use shutdown::ShutdownRegistry;
