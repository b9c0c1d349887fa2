//! Scoped process-environment overrides for configuration tests.

use std::env;
use std::ffi::OsString;
use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

/// Holds the environment lock and restores every touched variable on drop.
pub struct ScopedEnv {
    restore: Vec<(String, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    /// Locks the process environment without changing it.
    pub fn lock() -> Self {
        Self {
            restore: Vec::new(),
            _lock: ENV_MUTEX
                .get_or_init(|| Mutex::new(()))
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        }
    }

    /// Sets `key` to `value` until the guard drops.
    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.remember(key);
        // SAFETY: the global mutex serializes environment mutations in tests.
        unsafe { env::set_var(key, value) };
        self
    }

    /// Removes `key` until the guard drops.
    pub fn unset(mut self, key: &str) -> Self {
        self.remember(key);
        // SAFETY: the global mutex serializes environment mutations in tests.
        unsafe { env::remove_var(key) };
        self
    }

    fn remember(&mut self, key: &str) {
        if self.restore.iter().all(|(seen, _)| seen != key) {
            self.restore.push((key.to_owned(), env::var_os(key)));
        }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, previous) in self.restore.drain(..).rev() {
            // SAFETY: the global mutex serializes environment mutations in tests.
            unsafe {
                match previous {
                    Some(value) => env::set_var(&key, value),
                    None => env::remove_var(&key),
                }
            }
        }
    }
}
