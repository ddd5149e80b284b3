//! Lifecycle event emitter
//!
//! Every observed resource exposes an [`Emitter`]. Observers attach to a
//! [`Signal`] and receive the matching [`Event`]; each attachment yields a
//! [`ListenerId`] that detaches exactly that observer again.
//!
//! Emission never holds the listener lock while calling out, so a listener is
//! free to attach, detach or emit re-entrantly. A listener detached while an
//! emission is in flight is not called by that emission.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Names of the lifecycle signals a resource can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// The readable side delivered all of its data.
    End,
    /// The writable side flushed everything and shut down.
    Finish,
    /// The resource reported a fault.
    Error,
    /// The resource released its underlying handle.
    Close,
    /// A request-like resource completed its exchange.
    Complete,
    /// A request-like resource was aborted.
    Abort,
    /// A request-like resource attached its outgoing transport.
    Request,
    /// A process resource terminated.
    Exit,
}

impl Signal {
    /// All signals, in declaration order.
    pub const ALL: [Signal; 8] = [
        Signal::End,
        Signal::Finish,
        Signal::Error,
        Signal::Close,
        Signal::Complete,
        Signal::Abort,
        Signal::Request,
        Signal::Exit,
    ];

    /// Wire-style name of the signal.
    pub const fn as_str(self) -> &'static str {
        match self {
            Signal::End => "end",
            Signal::Finish => "finish",
            Signal::Error => "error",
            Signal::Close => "close",
            Signal::Complete => "complete",
            Signal::Abort => "abort",
            Signal::Request => "request",
            Signal::Exit => "exit",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fault reported by a resource through [`Signal::Error`].
///
/// Cloning is cheap; the wrapped errors are reference counted.
#[derive(Debug, Clone)]
pub enum Fault {
    /// An I/O error from the underlying transport.
    Io(Arc<io::Error>),
    /// Any other error value.
    Other(Arc<dyn std::error::Error + Send + Sync>),
    /// A bare message that is not an error value of its own.
    Message(String),
}

impl Fault {
    /// Wraps an I/O error.
    pub fn io(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }

    /// Wraps an arbitrary error value.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Arc::new(err))
    }

    /// Wraps a bare message.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// The I/O error kind, if this fault is (or wraps) an I/O error.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        self.io_error().map(io::Error::kind)
    }

    /// The raw OS error code, if the fault carries one.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }

    fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Io(err) => Some(err),
            Self::Other(err) => err.downcast_ref::<io::Error>(),
            Self::Message(_) => None,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{}", err),
            Self::Other(err) => write!(f, "{}", err),
            Self::Message(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => err.source(),
            Self::Other(err) => err.source(),
            Self::Message(_) => None,
        }
    }
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        Self::io(err)
    }
}

/// A lifecycle event together with its payload.
#[derive(Debug, Clone)]
pub enum Event {
    /// See [`Signal::End`].
    End,
    /// See [`Signal::Finish`].
    Finish,
    /// See [`Signal::Error`].
    Error(Fault),
    /// See [`Signal::Close`]. Carries the exit code known at close time.
    Close {
        /// Last known exit code of the resource, if any
        exit_code: Option<i32>,
    },
    /// See [`Signal::Complete`].
    Complete,
    /// See [`Signal::Abort`].
    Abort,
    /// See [`Signal::Request`]. Carries the emitter of the outgoing transport.
    Request(Emitter),
    /// See [`Signal::Exit`].
    Exit {
        /// Exit code, absent when the process was terminated by a signal
        code: Option<i32>,
        /// Name of the terminating signal, if any
        signal: Option<String>,
    },
}

impl Event {
    /// The signal this event is delivered on.
    pub fn signal(&self) -> Signal {
        match self {
            Event::End => Signal::End,
            Event::Finish => Signal::Finish,
            Event::Error(_) => Signal::Error,
            Event::Close { .. } => Signal::Close,
            Event::Complete => Signal::Complete,
            Event::Abort => Signal::Abort,
            Event::Request(_) => Signal::Request,
            Event::Exit { .. } => Signal::Exit,
        }
    }
}

/// Identifier of one attached listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type alias for a shared listener function.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone)]
struct Entry {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

type ListenerMap = HashMap<Signal, Vec<Entry>>;

/// Thread-safe lifecycle event emitter.
///
/// Clones share the same listener table.
#[derive(Clone, Default)]
pub struct Emitter {
    listeners: Arc<Mutex<ListenerMap>>,
}

impl Emitter {
    /// Create an emitter with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener that stays attached until removed.
    pub fn on<F>(&self, signal: Signal, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(signal, false, Arc::new(listener))
    }

    /// Attach a listener that is removed right before its first call.
    pub fn once<F>(&self, signal: Signal, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add(signal, true, Arc::new(listener))
    }

    fn add(&self, signal: Signal, once: bool, listener: Listener) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.listeners
            .lock()
            .entry(signal)
            .or_default()
            .push(Entry { id, once, listener });
        id
    }

    /// Detach a listener.
    ///
    /// Returns `false` when the listener was not attached (already removed,
    /// already fired as a `once` listener, or attached to another signal).
    pub fn off(&self, signal: Signal, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(&signal) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&signal);
        }
        removed
    }

    fn is_attached(&self, signal: Signal, id: ListenerId) -> bool {
        self.listeners
            .lock()
            .get(&signal)
            .is_some_and(|entries| entries.iter().any(|entry| entry.id == id))
    }

    /// Emit an event to every listener of its signal, in attach order.
    ///
    /// Returns `true` if the signal had listeners.
    pub fn emit(&self, event: Event) -> bool {
        let signal = event.signal();
        let snapshot: Vec<Entry> = self
            .listeners
            .lock()
            .get(&signal)
            .cloned()
            .unwrap_or_default();

        if snapshot.is_empty() {
            tracing::trace!(%signal, "emitted with no listeners");
            return false;
        }

        for entry in snapshot {
            // Claiming a once-listener and checking liveness are both done
            // under the lock, so a listener never runs after being removed.
            let live = if entry.once {
                self.off(signal, entry.id)
            } else {
                self.is_attached(signal, entry.id)
            };
            if live {
                (entry.listener)(&event);
            }
        }
        true
    }

    /// Number of listeners attached to a signal.
    pub fn listener_count(&self, signal: Signal) -> usize {
        self.listeners.lock().get(&signal).map_or(0, Vec::len)
    }

    /// Total number of listeners across all signals.
    pub fn total_listeners(&self) -> usize {
        self.listeners.lock().values().map(Vec::len).sum()
    }

    /// Whether both handles share one listener table.
    pub fn same_as(&self, other: &Emitter) -> bool {
        Arc::ptr_eq(&self.listeners, &other.listeners)
    }

    /// Non-owning handle, used to detach without keeping the emitter alive.
    pub fn downgrade(&self) -> WeakEmitter {
        WeakEmitter {
            listeners: Arc::downgrade(&self.listeners),
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        let mut counts: Vec<(Signal, usize)> = listeners
            .iter()
            .map(|(signal, entries)| (*signal, entries.len()))
            .collect();
        counts.sort_by_key(|(signal, _)| signal.as_str());
        f.debug_struct("Emitter").field("listeners", &counts).finish()
    }
}

/// Weak counterpart of [`Emitter`].
#[derive(Clone, Debug, Default)]
pub struct WeakEmitter {
    listeners: Weak<Mutex<ListenerMap>>,
}

impl WeakEmitter {
    /// Upgrade to a strong handle if the emitter is still alive.
    pub fn upgrade(&self) -> Option<Emitter> {
        self.listeners.upgrade().map(|listeners| Emitter { listeners })
    }
}
