//! Registry of processes to destroy when the host program exits.
//!
//! Managed processes register their [`Signaller`] once running and
//! deregister on completion. The global registry installs an exit handler
//! with the first registration (Unix `atexit`); from then on, a normal exit of
//! the host kills every child that is still registered. Once the hooks have
//! run, further registrations are rejected with [`HookError::ShuttingDown`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::{debug, warn};

use crate::native::Signaller;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    #[error("Shutdown in progress, hook rejected")]
    ShuttingDown,
}

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookId(u64);

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    hooks: BTreeMap<HookId, Arc<dyn Signaller>>,
    shutting_down: bool,
    exit_handler_installed: bool,
}

#[derive(Debug)]
pub struct ShutdownRegistry {
    state: Mutex<RegistryState>,
    install_exit_handler: bool,
}

static GLOBAL: Lazy<ShutdownRegistry> = Lazy::new(|| ShutdownRegistry {
    state: Mutex::default(),
    install_exit_handler: true,
});

impl ShutdownRegistry {
    /// A standalone registry that never installs an exit handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            install_exit_handler: false,
        }
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static ShutdownRegistry {
        &GLOBAL
    }

    /// Register `signaller` to be killed at shutdown.
    ///
    /// # Errors
    ///
    /// [`HookError::ShuttingDown`] once the hooks have run.
    pub fn register(&self, signaller: Arc<dyn Signaller>) -> Result<HookId, HookError> {
        let mut state = self.lock();
        if state.shutting_down {
            return Err(HookError::ShuttingDown);
        }
        if self.install_exit_handler && !state.exit_handler_installed {
            state.exit_handler_installed = install_exit_handler();
        }
        state.next_id += 1;
        let id = HookId(state.next_id);
        state.hooks.insert(id, signaller);
        debug!(hook = id.0, registered = state.hooks.len(), "Registered shutdown hook");
        Ok(id)
    }

    /// Remove a registration. Returns `false` if it was not registered.
    pub fn deregister(&self, id: HookId) -> bool {
        let removed = self.lock().hooks.remove(&id).is_some();
        if removed {
            debug!(hook = id.0, "Deregistered shutdown hook");
        }
        removed
    }

    /// Kill every registered process and reject further registrations.
    ///
    /// Returns the number of hooks that ran.
    pub fn run_hooks(&self) -> usize {
        let hooks = {
            let mut state = self.lock();
            state.shutting_down = true;
            std::mem::take(&mut state.hooks)
        };
        for (id, signaller) in &hooks {
            if let Err(e) = signaller.kill() {
                warn!(hook = id.0, error = %e, "Failed to kill process at shutdown");
            }
        }
        hooks.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ShutdownRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn install_exit_handler() -> bool {
    extern "C" fn run_global_hooks() {
        ShutdownRegistry::global().run_hooks();
    }

    // SAFETY: `run_global_hooks` is a plain function that lives for the whole
    // program and does not unwind across the FFI boundary (killing a child
    // cannot panic).
    let rc = unsafe { libc::atexit(run_global_hooks) };
    if rc != 0 {
        warn!("Failed to install shutdown handler; children will outlive this process");
    }
    rc == 0
}

#[cfg(not(unix))]
fn install_exit_handler() -> bool {
    debug!("No exit handler on this platform; children are only cleaned up on completion");
    true
}
