//! Process-wide lock for tests that touch environment variables.
//!
//! `KEELSON_MAKE`, `PATH`, and the orchestrator markers are process globals;
//! tests mutating them hold an [`EnvLock`] for their whole duration.

use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Held while a test mutates the process environment.
#[derive(Debug)]
pub struct EnvLock {
    _guard: MutexGuard<'static, ()>,
}

impl EnvLock {
    /// Block until no other test holds the lock. A poisoned lock is
    /// recovered, since a panicking test has already restored its guards.
    #[must_use]
    pub fn acquire() -> Self {
        let guard = ENV_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self { _guard: guard }
    }
}
