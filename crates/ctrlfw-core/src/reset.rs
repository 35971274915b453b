//! Factory reset: wipe persistent storage and restart.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use crate::platform::System;

/// What a call to [`FactoryReset::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Storage wiped and restart issued.
    Restarted,
    /// Storage could not be wiped; restart issued anyway.
    RestartedAfterFormatError,
    /// A reset was already running.
    AlreadyRunning,
}

/// Idempotent factory reset.
///
/// Clones share the running and requested flags, so other parts of the
/// controller can hold a handle to [`FactoryReset::request`] a reset.
#[derive(Debug, Clone, Default)]
pub struct FactoryReset {
    running: Arc<AtomicBool>,
    requested: Arc<AtomicBool>,
}

impl FactoryReset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the control loop to reset on its next [`FactoryReset::poll`].
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Run a pending request, if any.
    pub fn poll(&self, system: &mut dyn System) -> Option<ResetOutcome> {
        if self.requested.swap(false, Ordering::SeqCst) {
            Some(self.run(system))
        } else {
            None
        }
    }

    /// Wipe and restart. On hardware the restart does not return; a second
    /// call while the first is in progress is a no-op.
    pub fn run(&self, system: &mut dyn System) -> ResetOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Factory reset already running");
            return ResetOutcome::AlreadyRunning;
        }

        info!("Factory reset");
        system.start_status_led();

        let outcome = match system.format_storage() {
            Ok(()) => ResetOutcome::Restarted,
            Err(e) => {
                error!("Failed to format storage: {}", e);
                ResetOutcome::RestartedAfterFormatError
            }
        };
        system.restart();
        outcome
    }
}
