//! Shared lifecycle plumbing for adapters
//!
//! A [`Lifecycle`] pairs an [`Emitter`] with the [`StreamState`] it reports
//! on and makes each transition happen at most once: the readable side ends
//! once, the writable side finishes once, and `close` is emitted once.
//!
//! Every transition is recorded in the state before its event is emitted.
//! Adapters emit from background tasks, possibly on another worker thread,
//! and a tracker attaching after the fact catches up from the state.

use settle_core::{Emitter, Event, Fault, StreamState};
use std::io;

/// Emitter plus live state of one adapter.
///
/// Clones share the emitter and the state, which lets a resource hand its
/// lifecycle over to the stream it eventually produces.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    emitter: Emitter,
    state: StreamState,
}

impl Lifecycle {
    /// Create a lifecycle reporting on `state`.
    pub fn new(state: StreamState) -> Self {
        Self {
            emitter: Emitter::new(),
            state,
        }
    }

    /// The event surface.
    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// The live state.
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Whether `close` has been emitted.
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Mark the readable side ended and emit `end`.
    pub fn end_readable(&self) {
        if !self.is_closed() && self.state.end_readable() {
            tracing::trace!("readable side ended");
            self.emitter.emit(Event::End);
        }
    }

    /// Mark the writable side ended and emit `finish`.
    pub fn finish_writable(&self) {
        if !self.is_closed() && self.state.end_writable() {
            tracing::trace!("writable side finished");
            self.emitter.emit(Event::Finish);
        }
    }

    /// Emit `error` carrying a copy of `err`.
    pub fn fail(&self, err: &io::Error) {
        if !self.is_closed() {
            tracing::debug!(kind = ?err.kind(), "adapter failed: {}", err);
            self.raise(Fault::io(mirror(err)));
        }
    }

    /// Emit `error` carrying an arbitrary fault.
    pub fn fail_with(&self, fault: Fault) {
        if !self.is_closed() {
            tracing::debug!("adapter failed: {}", fault);
            self.raise(fault);
        }
    }

    fn raise(&self, fault: Fault) {
        self.state.record_fault(fault.clone());
        self.emitter.emit(Event::Error(fault));
    }

    /// Record a process exit and emit `exit`.
    pub fn exit(&self, code: Option<i32>, signal: Option<String>) {
        if !self.is_closed() {
            self.state.set_exit(code, signal.clone());
            self.emitter.emit(Event::Exit { code, signal });
        }
    }

    /// Emit `close` with the last known exit code.
    ///
    /// Returns `false` if the lifecycle was already closed.
    pub fn close(&self) -> bool {
        if !self.state.mark_closed() {
            return false;
        }
        let exit_code = self.state.exit_code();
        tracing::trace!(?exit_code, "closed");
        self.emitter.emit(Event::Close { exit_code });
        true
    }
}

/// Copy an I/O error, keeping its kind and OS code.
pub(crate) fn mirror(err: &io::Error) -> io::Error {
    match err.raw_os_error() {
        Some(code) => io::Error::from_raw_os_error(code),
        None => io::Error::new(err.kind(), err.to_string()),
    }
}
