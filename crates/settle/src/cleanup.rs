//! Cleanup handles
//!
//! Provides:
//! - [`CleanupHandle`] for detaching an operation's observers on demand
//! - [`CleanupGuard`] for detaching them automatically on drop (RAII)

use crate::registry::Registry;
use crate::state::CompletionState;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Detaches every observer a tracking operation attached.
///
/// Cheap to clone; all clones control the same operation. Calling
/// [`CleanupHandle::cleanup`] before the outcome is known cancels the
/// operation: its callback will never run. Calling it afterwards is a no-op.
#[derive(Clone)]
pub struct CleanupHandle {
    registry: Arc<Registry>,
    state: Arc<Mutex<CompletionState>>,
}

impl CleanupHandle {
    pub(crate) fn new(registry: Arc<Registry>, state: Arc<Mutex<CompletionState>>) -> Self {
        Self { registry, state }
    }

    /// Detach all observers. Idempotent.
    ///
    /// A trigger being applied on another thread finishes first; once this
    /// returns, no outcome is produced unless one already was.
    pub fn cleanup(&self) {
        if self.state.lock().cancel() {
            tracing::trace!("completion cancelled before settling");
        }
        let removed = self.registry.detach_all();
        if removed > 0 {
            tracing::debug!(removed, "detached completion observers");
        }
    }

    /// Whether cleanup has already run, manually or automatically.
    pub fn is_cleaned_up(&self) -> bool {
        self.registry.is_detached()
    }

    /// Whether the operation was cleaned up before producing an outcome.
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().is_cancelled()
    }

    /// Number of observers still recorded for this operation.
    pub fn bindings(&self) -> usize {
        self.registry.len()
    }

    /// Turn the handle into a guard that cleans up when dropped.
    pub fn into_guard(self) -> CleanupGuard {
        CleanupGuard { handle: Some(self) }
    }
}

impl fmt::Debug for CleanupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupHandle")
            .field("cleaned_up", &self.is_cleaned_up())
            .field("cancelled", &self.is_cancelled())
            .field("bindings", &self.bindings())
            .finish()
    }
}

/// RAII guard for automatic observer cleanup
///
/// Ensures the observers are detached when the guard goes out of scope,
/// even if the scope is left early.
#[derive(Debug)]
pub struct CleanupGuard {
    handle: Option<CleanupHandle>,
}

impl CleanupGuard {
    /// The handle this guard controls.
    pub fn handle(&self) -> Option<&CleanupHandle> {
        self.handle.as_ref()
    }

    /// Give up the guard without cleaning up.
    pub fn disarm(mut self) -> Option<CleanupHandle> {
        self.handle.take()
    }

    /// Clean up now and consume the guard.
    pub fn cleanup(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cleanup();
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cleanup();
        }
    }
}
