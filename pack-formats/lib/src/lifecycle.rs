//! Flush-on-exit hooks.
//!
//! Once armed, an interrupt (Ctrl-C, SIGTERM, Ctrl-Break) or a panic flushes
//! the watched mapping store and exits: 130 for interrupts, 1 for faults.
//! In-flight resolutions are not waited for; their keys are simply absent
//! on disk and get planned again by the next run. Dropping the
//! [`Supervisor`] performs a final flush if no hook fired.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::LifecycleError;
use crate::store::{FlushOutcome, MappingStore};

static ARMED: AtomicBool = AtomicBool::new(false);

/// Why the process is being shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// User or runner asked the process to stop.
    Interrupt,
    /// A panic or unrecoverable error.
    Fault,
}

impl TerminationCause {
    /// Process exit status for this cause.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            TerminationCause::Interrupt => 130,
            TerminationCause::Fault => 1,
        }
    }
}

/// State shared by every hook.
#[derive(Debug, Clone, Default)]
struct Hooks {
    store: Arc<OnceLock<Arc<MappingStore>>>,
    interrupted: Arc<AtomicBool>,
    faulted: Arc<AtomicBool>,
}

impl Hooks {
    fn latch(&self, cause: TerminationCause) -> &AtomicBool {
        match cause {
            TerminationCause::Interrupt => &self.interrupted,
            TerminationCause::Fault => &self.faulted,
        }
    }

    fn any_fired(&self) -> bool {
        self.interrupted.load(Ordering::Acquire) || self.faulted.load(Ordering::Acquire)
    }

    /// Flushes once per cause and returns the exit status. Never panics.
    fn on_termination(&self, cause: TerminationCause, blocking: bool) -> i32 {
        if !self.latch(cause).swap(true, Ordering::AcqRel) {
            self.flush(blocking);
        }
        cause.exit_code()
    }

    fn flush(&self, blocking: bool) {
        let Some(store) = self.store.get() else {
            return;
        };
        let result = if blocking {
            store.flush()
        } else {
            store.try_flush()
        };
        match result {
            Ok(FlushOutcome::Written) => info!("Saved progress to {}", store.path().display()),
            Ok(FlushOutcome::Clean) => {}
            Ok(FlushOutcome::InProgress) => warn!("Flush already in progress during shutdown"),
            Err(e) => error!("Failed to save progress: {e}"),
        }
    }
}

/// Owner of the process-level shutdown hooks.
#[derive(Debug, Default)]
pub struct Supervisor {
    hooks: Hooks,
    signal_task: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Creates a supervisor without installing any process hooks.
    ///
    /// Its [`shutdown`](Self::shutdown) and drop behaviour still work, which
    /// is what tests and embedders use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the signal listener and panic hook. Must run inside a tokio
    /// runtime, before any store mutation.
    ///
    /// ## Errors
    ///
    /// Returns [`LifecycleError::AlreadyArmed`] if called twice in one process.
    pub fn arm() -> Result<Self, LifecycleError> {
        if ARMED.swap(true, Ordering::AcqRel) {
            return Err(LifecycleError::AlreadyArmed);
        }

        let mut supervisor = Self::new();

        let hooks = supervisor.hooks.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            previous(panic_info);
            // The panicking thread may hold the mapping lock.
            let code = hooks.on_termination(TerminationCause::Fault, false);
            std::process::exit(code);
        }));

        let hooks = supervisor.hooks.clone();
        supervisor.signal_task = Some(tokio::spawn(async move {
            wait_for_interrupt().await;
            warn!("Interrupted, saving progress");
            let code = hooks.on_termination(TerminationCause::Interrupt, true);
            std::process::exit(code);
        }));

        Ok(supervisor)
    }

    /// Attaches the store the hooks should flush. Only the first call wins.
    pub fn watch(&self, store: Arc<MappingStore>) {
        if self.hooks.store.set(store).is_err() {
            warn!("Supervisor is already watching a store");
        }
    }

    /// Runs the shutdown action for `cause` without exiting and returns the
    /// exit status to use.
    pub fn shutdown(&self, cause: TerminationCause) -> i32 {
        self.hooks.on_termination(cause, true)
    }

    /// Runs the shutdown action for `cause` and exits the process.
    pub fn terminate(&self, cause: TerminationCause) -> ! {
        let code = self.shutdown(cause);
        std::process::exit(code)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(task) = self.signal_task.take() {
            task.abort();
        }
        if !self.hooks.any_fired() {
            self.hooks.flush(true);
        }
    }
}

/// Resolves on the first interrupt-class signal for this platform.
async fn wait_for_interrupt() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {e}");
                ctrl_c().await;
            }
        }
    }

    #[cfg(windows)]
    {
        use tokio::signal::windows::ctrl_break;

        match ctrl_break() {
            Ok(mut brk) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    _ = brk.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for Ctrl-Break: {e}");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    ctrl_c().await;
}

/// Ctrl-C, or never if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
