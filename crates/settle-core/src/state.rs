//! Live stream state
//!
//! A [`StreamState`] is the small piece of bookkeeping a running resource
//! keeps about itself: whether each side is still readable/writable, whether
//! each side has internally reached its end, the last known exit code, and
//! whether the resource has exited, failed or closed. Observers read it at
//! registration time (as a [`Flags`] snapshot) and again when a close
//! arrives. Adapters record a transition here before emitting it, so an
//! observer that attaches late can still tell what it missed.

use crate::emitter::Fault;
use parking_lot::RwLock;
use std::sync::Arc;

/// Point-in-time copy of a [`StreamState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    /// The readable side may still deliver data
    pub readable: bool,
    /// The writable side still accepts data
    pub writable: bool,
    /// The readable side reached end-of-data internally
    pub readable_ended: bool,
    /// The writable side was ended internally
    pub writable_ended: bool,
    /// Last known exit code
    pub exit_code: Option<i32>,
    /// A process exit was recorded
    pub exited: bool,
    /// The resource emitted `close`
    pub closed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    flags: Flags,
    exit_signal: Option<String>,
    fault: Option<(Fault, Flags)>,
}

/// Shared, thread-safe live state of a resource.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    inner: Arc<RwLock<Inner>>,
}

impl StreamState {
    /// State of a resource with both sides open.
    pub fn duplex() -> Self {
        Self::with_flags(Flags {
            readable: true,
            writable: true,
            ..Flags::default()
        })
    }

    /// State of a read-only resource.
    pub fn readable() -> Self {
        Self::with_flags(Flags {
            readable: true,
            ..Flags::default()
        })
    }

    /// State of a write-only resource.
    pub fn writable() -> Self {
        Self::with_flags(Flags {
            writable: true,
            ..Flags::default()
        })
    }

    /// State with neither side open, as for process handles.
    pub fn detached() -> Self {
        Self::default()
    }

    /// State seeded from explicit flags.
    pub fn with_flags(flags: Flags) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                flags,
                ..Inner::default()
            })),
        }
    }

    /// Copy of the current flags.
    pub fn snapshot(&self) -> Flags {
        self.inner.read().flags
    }

    /// Whether the readable side is still open.
    pub fn is_readable(&self) -> bool {
        self.inner.read().flags.readable
    }

    /// Whether the writable side is still open.
    pub fn is_writable(&self) -> bool {
        self.inner.read().flags.writable
    }

    /// Whether `close` was recorded.
    pub fn is_closed(&self) -> bool {
        self.inner.read().flags.closed
    }

    /// Set the readable flag.
    pub fn set_readable(&self, readable: bool) {
        self.inner.write().flags.readable = readable;
    }

    /// Set the writable flag.
    pub fn set_writable(&self, writable: bool) {
        self.inner.write().flags.writable = writable;
    }

    /// Record the exit code.
    pub fn set_exit_code(&self, code: Option<i32>) {
        self.inner.write().flags.exit_code = code;
    }

    /// Last known exit code.
    pub fn exit_code(&self) -> Option<i32> {
        self.inner.read().flags.exit_code
    }

    /// Record a process exit with its code and terminating signal.
    pub fn set_exit(&self, code: Option<i32>, signal: Option<String>) {
        let mut inner = self.inner.write();
        inner.flags.exit_code = code;
        inner.flags.exited = true;
        inner.exit_signal = signal;
    }

    /// Name of the signal that terminated the process, if any.
    pub fn exit_signal(&self) -> Option<String> {
        self.inner.read().exit_signal.clone()
    }

    /// Record a fault. Only the first one is kept, together with the flags
    /// as they were when it happened.
    pub fn record_fault(&self, fault: Fault) {
        let mut inner = self.inner.write();
        if inner.fault.is_none() {
            let at = inner.flags;
            inner.fault = Some((fault, at));
        }
    }

    /// The first recorded fault and the flags at that moment.
    pub fn fault(&self) -> Option<(Fault, Flags)> {
        self.inner.read().fault.clone()
    }

    /// Mark the resource closed.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn mark_closed(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.flags.closed {
            return false;
        }
        inner.flags.closed = true;
        true
    }

    /// Mark the readable side as ended and no longer readable.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn end_readable(&self) -> bool {
        let mut inner = self.inner.write();
        let flags = &mut inner.flags;
        if flags.readable_ended {
            return false;
        }
        flags.readable_ended = true;
        flags.readable = false;
        true
    }

    /// Mark the writable side as ended and no longer writable.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn end_writable(&self) -> bool {
        let mut inner = self.inner.write();
        let flags = &mut inner.flags;
        if flags.writable_ended {
            return false;
        }
        flags.writable_ended = true;
        flags.writable = false;
        true
    }
}
