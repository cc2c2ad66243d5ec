//! Diagnostic logging setup.
//!
//! The pool never installs a subscriber on its own: it only emits `tracing`
//! events into the span it was given. Binaries call [`init`] once at startup;
//! tests can use [`scoped`] and drop the guard to tear the subscriber down.

use std::sync::OnceLock;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceLock<bool> = OnceLock::new();


fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Installs the process-wide subscriber. `RUST_LOG` wins over `default_directive`.
///
/// Only the first call does anything; the return value tells whether this
/// crate's subscriber is the active global one.
pub fn init(default_directive: &str) -> bool {
    *INIT.get_or_init(|| {
        fmt()
            .with_env_filter(filter(default_directive))
            .with_thread_ids(true)
            .with_thread_names(true)
            .try_init()
            .is_ok()
    })
}

/// Subscriber for the current thread only, removed when the guard is dropped
pub fn scoped(default_directive: &str) -> DefaultGuard {
    let subscriber = fmt()
        .with_env_filter(filter(default_directive))
        .with_thread_names(true)
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(subscriber)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let first = init("warn");
        assert_eq!(init("debug"), first);
    }

    #[test]
    fn scoped_guard_can_be_dropped() {
        let guard = scoped("debug");
        tracing::debug!("visible while the guard lives");
        drop(guard);
    }
}
