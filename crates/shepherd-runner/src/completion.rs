//! The single completion signal of a managed process.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::completed::CompletedProcess;
use crate::error::RunnerError;

/// What a process completes with.
pub type ProcessResult = Result<CompletedProcess, RunnerError>;

/// Shared handle to a result that is set exactly once.
///
/// Cloning is cheap and every clone observes the same value. Resolving a
/// second time is rejected, so concurrent completers cannot race.
#[derive(Clone, Default)]
pub struct Completion {
    cell: Arc<OnceCell<ProcessResult>>,
}

impl Completion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve with `result`. Returns `false` if already resolved.
    pub(crate) fn resolve(&self, result: ProcessResult) -> bool {
        self.cell.set(result).is_ok()
    }

    /// Block the current thread until resolved.
    pub fn wait(&self) -> ProcessResult {
        self.cell.wait().clone()
    }

    /// Wait without blocking the async runtime.
    pub async fn wait_async(&self) -> ProcessResult {
        if let Some(result) = self.cell.get() {
            return result.clone();
        }
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.wait()).await {
            Ok(result) => result,
            // Cancelled by runtime shutdown
            Err(_) => self.wait(),
        }
    }

    /// The result if already resolved.
    #[must_use]
    pub fn try_get(&self) -> Option<ProcessResult> {
        self.cell.get().cloned()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.cell.get() {
            None => "pending",
            Some(Ok(_)) => "succeeded",
            Some(Err(_)) => "failed",
        };
        f.debug_tuple("Completion").field(&state).finish()
    }
}
