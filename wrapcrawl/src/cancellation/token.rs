//! Halt token for cooperative cancellation.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// A callback invoked once when the token halts.
pub type HaltCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A token polled between network calls and paging iterations.
///
/// Halting is idempotent; only the first reason is kept.
#[derive(Default)]
pub struct HaltToken {
    halted: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: RwLock<Vec<HaltCallback>>,
}

impl HaltToken {
    /// Creates a new, running token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a halt with a reason.
    ///
    /// Callbacks run immediately; a panicking callback is logged and skipped.
    pub fn halt(&self, reason: impl Into<String>) {
        if self
            .halted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            *self.reason.write() = Some(reason.clone());

            let callbacks = self.callbacks.read();
            for callback in callbacks.iter() {
                Self::invoke(callback.as_ref(), &reason);
            }
        }
    }

    /// Registers a callback to be invoked on halt.
    ///
    /// If already halted, the callback is invoked immediately.
    pub fn on_halt<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        if let Some(reason) = self.reason() {
            Self::invoke(&callback, &reason);
        } else {
            self.callbacks.write().push(Box::new(callback));
        }
    }

    fn invoke(callback: &(dyn Fn(&str) + Send + Sync), reason: &str) {
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(reason);
        })) {
            warn!("Halt callback panicked: {:?}", e);
        }
    }

    /// Returns whether a halt has been requested.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Returns the halt reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }
}

impl std::fmt::Debug for HaltToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HaltToken")
            .field("halted", &self.is_halted())
            .field("reason", &self.reason())
            .finish()
    }
}
