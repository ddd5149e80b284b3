//! Lifecycle listener registry
//!
//! Attaches the observer set a [`Variant`] needs and remembers every
//! `(emitter, signal, listener)` binding it made, including bindings made
//! later on a request's transport, so that [`Registry::detach_all`] reverses
//! exactly those and nothing else.
//!
//! Bindings hold the emitter weakly. A registry never keeps a resource alive.

use crate::config::CompletionConfig;
use crate::state::Trigger;
use parking_lot::Mutex;
use settle_core::{
    Emitter, Event, ListenerId, Resource, Signal, StreamState, Variant, WeakEmitter,
};
use std::sync::{Arc, Weak};

/// Where observers deliver their triggers.
pub type Sink = Arc<dyn Fn(Trigger) + Send + Sync>;

#[derive(Debug)]
struct Binding {
    emitter: WeakEmitter,
    signal: Signal,
    id: ListenerId,
}

#[derive(Debug, Default)]
struct Bindings {
    attached: Vec<Binding>,
    detached: bool,
}

/// Record of the observers attached for one operation.
#[derive(Debug, Default)]
pub struct Registry {
    bindings: Mutex<Bindings>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a one-shot observer and record the binding.
    ///
    /// Returns `false` without attaching once the registry has been detached.
    pub fn attach<F>(&self, emitter: &Emitter, signal: Signal, observer: F) -> bool
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut bindings = self.bindings.lock();
        if bindings.detached {
            return false;
        }
        let id = emitter.once(signal, observer);
        bindings.attached.push(Binding {
            emitter: emitter.downgrade(),
            signal,
            id,
        });
        true
    }

    /// Detach every recorded binding. Idempotent.
    ///
    /// Returns the number of observers actually removed from live emitters.
    pub fn detach_all(&self) -> usize {
        let attached = {
            let mut bindings = self.bindings.lock();
            if bindings.detached {
                return 0;
            }
            bindings.detached = true;
            std::mem::take(&mut bindings.attached)
        };

        attached
            .into_iter()
            .filter(|binding| {
                binding
                    .emitter
                    .upgrade()
                    .is_some_and(|emitter| emitter.off(binding.signal, binding.id))
            })
            .count()
    }

    /// Whether [`Registry::detach_all`] has run.
    pub fn is_detached(&self) -> bool {
        self.bindings.lock().detached
    }

    /// Number of recorded bindings.
    pub fn len(&self) -> usize {
        self.bindings.lock().attached.len()
    }

    /// Whether no bindings are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Attach the observers for `variant` to `resource`, feeding triggers to `sink`.
pub fn register<R>(
    resource: &R,
    variant: Variant,
    config: &CompletionConfig,
    registry: &Arc<Registry>,
    sink: &Sink,
) where
    R: Resource + ?Sized,
{
    let emitter = resource.emitter();
    let state = resource.state();

    if variant == Variant::RequestLike {
        registry.attach(emitter, Signal::Complete, finished(sink));
        registry.attach(emitter, Signal::Abort, closed(sink, state));
        match resource.transport() {
            Some(transport) => attach_transport(registry, &transport, sink),
            None => {
                let pending = Arc::downgrade(registry);
                let sink = Arc::clone(sink);
                registry.attach(emitter, Signal::Request, move |event| {
                    if let Event::Request(transport) = event {
                        on_request(&pending, transport, &sink);
                    }
                });
            }
        }
    } else if tracks_writable(config, state) && resource.shape().is_legacy_writable() {
        // Legacy writables never emit finish; trust the flag, not the signal.
        registry.attach(emitter, Signal::End, legacy_finished(sink, state));
        registry.attach(emitter, Signal::Close, legacy_finished(sink, state));
    }

    if variant == Variant::ProcessLike {
        let sink = Arc::clone(sink);
        registry.attach(emitter, Signal::Exit, move |event| {
            if let Event::Exit { code, signal } = event {
                sink(Trigger::Exit {
                    code: *code,
                    signal: signal.clone(),
                });
            }
        });
    }

    {
        let sink = Arc::clone(sink);
        registry.attach(emitter, Signal::End, move |_| sink(Trigger::ReadableEnded));
    }
    registry.attach(emitter, Signal::Finish, finished(sink));
    if config.error {
        let sink = Arc::clone(sink);
        registry.attach(emitter, Signal::Error, move |event| {
            if let Event::Error(fault) = event {
                sink(Trigger::Error(fault.clone()));
            }
        });
    }
    registry.attach(emitter, Signal::Close, closed(sink, state));
}

fn tracks_writable(config: &CompletionConfig, state: &StreamState) -> bool {
    config.writable.unwrap_or_else(|| state.is_writable())
}

fn on_request(registry: &Weak<Registry>, transport: &Emitter, sink: &Sink) {
    if let Some(registry) = registry.upgrade() {
        attach_transport(&registry, transport, sink);
    }
}

fn attach_transport(registry: &Registry, transport: &Emitter, sink: &Sink) {
    if registry.attach(transport, Signal::Finish, finished(sink)) {
        tracing::trace!("observing request transport");
    }
}

fn finished(sink: &Sink) -> impl Fn(&Event) + Send + Sync + 'static {
    let sink = Arc::clone(sink);
    move |_| sink(Trigger::WritableFinished)
}

fn closed(sink: &Sink, state: &StreamState) -> impl Fn(&Event) + Send + Sync + 'static {
    let sink = Arc::clone(sink);
    let state = state.clone();
    move |event| {
        let mut flags = state.snapshot();
        if let Event::Close {
            exit_code: Some(code),
        } = event
        {
            flags.exit_code = Some(*code);
        }
        sink(Trigger::close(flags));
    }
}

fn legacy_finished(sink: &Sink, state: &StreamState) -> impl Fn(&Event) + Send + Sync + 'static {
    let sink = Arc::clone(sink);
    let state = state.clone();
    move |_| {
        if !state.is_writable() {
            sink(Trigger::WritableFinished);
        }
    }
}
