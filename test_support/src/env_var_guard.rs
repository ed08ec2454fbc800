//! Scoped environment variable changes.
//!
//! `std::env::set_var` and `remove_var` are `unsafe` in Rust 2024. Hold an
//! [`EnvLock`](crate::env_lock::EnvLock) while any guard is alive.
//!
//! ```rust,ignore
//! use test_support::{EnvLock, EnvVarGuard};
//!
//! let _lock = EnvLock::acquire();
//! let _make = EnvVarGuard::set("KEELSON_MAKE", "/tmp/fake/make");
//! ```

use std::ffi::{OsStr, OsString};

/// Restores the previous value of one variable on drop.
#[derive(Debug)]
pub struct EnvVarGuard {
    name: String,
    previous: Option<OsString>,
}

impl EnvVarGuard {
    /// Set `name` to `value` until the guard drops.
    #[must_use]
    pub fn set(name: &str, value: impl AsRef<OsStr>) -> Self {
        let previous = std::env::var_os(name);
        // SAFETY: callers hold `EnvLock`, serialising environment mutation.
        unsafe { std::env::set_var(name, value) };
        Self {
            name: name.to_owned(),
            previous,
        }
    }

    /// Unset `name` until the guard drops.
    #[must_use]
    pub fn remove(name: &str) -> Self {
        let previous = std::env::var_os(name);
        // SAFETY: callers hold `EnvLock`, serialising environment mutation.
        unsafe { std::env::remove_var(name) };
        Self {
            name: name.to_owned(),
            previous,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        // SAFETY: the guard is dropped while `EnvLock` is still held.
        unsafe {
            match &self.previous {
                Some(value) => std::env::set_var(&self.name, value),
                None => std::env::remove_var(&self.name),
            }
        }
    }
}
