//! Process-wide worker pool for pumps and exit waiters.
//!
//! Pumps spend their lives blocked in `read`, so they run on the blocking
//! pool of a dedicated Tokio runtime: idle threads are cached and reused and
//! new ones are added on demand. The runtime is created on first use and
//! shared by every managed process.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;

/// Upper bound on concurrently blocked pool threads.
const MAX_BLOCKING_THREADS: usize = 1024;

/// How long an idle pool thread is kept before it exits.
const THREAD_KEEP_ALIVE: Duration = Duration::from_secs(60);

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn runtime() -> io::Result<&'static Runtime> {
    RUNTIME.get_or_try_init(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(MAX_BLOCKING_THREADS)
            .thread_keep_alive(THREAD_KEEP_ALIVE)
            .thread_name("shepherd-worker")
            .enable_all()
            .build()
    })
}

/// Result of a task submitted with [`spawn`].
#[derive(Debug)]
pub struct PoolTask<T> {
    rx: oneshot::Receiver<thread::Result<T>>,
}

/// Run `f` on the shared pool.
///
/// # Errors
///
/// Fails only if the pool runtime cannot be created.
pub fn spawn<F, T>(f: F) -> io::Result<PoolTask<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    runtime()?.spawn_blocking(move || {
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        let _ = tx.send(outcome);
    });
    Ok(PoolTask { rx })
}

impl<T> PoolTask<T> {
    /// Block until the task has finished.
    ///
    /// A panic inside the task is reported as an error.
    pub fn join(self) -> io::Result<T> {
        flatten(self.rx.blocking_recv())
    }

    /// Wait at most `grace` for the task to finish.
    ///
    /// Returns `None` if it is still running; the task is then abandoned.
    pub fn join_within(mut self, grace: Duration) -> Option<io::Result<T>> {
        let deadline = Instant::now() + grace;
        loop {
            match self.rx.try_recv() {
                Ok(outcome) => return Some(flatten(Ok(outcome))),
                Err(oneshot::error::TryRecvError::Closed) => {
                    return Some(Err(io::Error::other("worker task was dropped")));
                }
                Err(oneshot::error::TryRecvError::Empty) if Instant::now() >= deadline => {
                    return None;
                }
                Err(oneshot::error::TryRecvError::Empty) => thread::sleep(Duration::from_millis(2)),
            }
        }
    }
}

fn flatten<T>(
    received: Result<thread::Result<T>, oneshot::error::RecvError>,
) -> io::Result<T> {
    match received {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(payload)) => Err(io::Error::other(format!(
            "worker task panicked: {}",
            panic_message(payload.as_ref())
        ))),
        Err(_) => Err(io::Error::other("worker task was dropped")),
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
