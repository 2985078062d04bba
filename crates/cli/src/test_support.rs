use std::sync::{Mutex, MutexGuard, OnceLock};

/// Serializes tests that touch `LLM_GATEWAY_*` or provider key variables.
fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    // A failed assertion inside one test must not wedge the others.
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs `run` while holding the process-environment lock.
pub(crate) fn with_locked_env<R>(run: impl FnOnce() -> R) -> R {
    let _guard = env_lock();
    run()
}

/// Sets an environment variable. Only call inside `with_locked_env`.
pub(crate) fn set_env_var(key: &str, value: &str) {
    // SAFETY: every caller holds the env lock, so no other test thread
    // reads or writes the environment concurrently.
    unsafe {
        std::env::set_var(key, value);
    }
}

/// Removes an environment variable. Only call inside `with_locked_env`.
pub(crate) fn remove_env_var(key: &str) {
    // SAFETY: see `set_env_var`.
    unsafe {
        std::env::remove_var(key);
    }
}
