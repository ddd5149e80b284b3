//! Starting a tracking operation
//!
//! [`track_completion`] wires the pieces together: classify the resource,
//! seed a [`CompletionState`], attach observers through the registry, catch
//! up on whatever the resource recorded before they were attached, and on
//! the settling trigger clean up, normalize, and hand the result to the
//! single-fire deferred callback.

use crate::cleanup::CleanupHandle;
use crate::config::CompletionConfig;
use crate::error::Result;
use crate::normalize::{CompletionError, normalize};
use crate::registry::{self, Registry, Sink};
use crate::state::{CompletionState, Trigger};
use parking_lot::Mutex;
use settle_core::{Deferred, Resource, Scheduler, TokioScheduler, Variant, classify};
use std::sync::Arc;

/// Outcome delivered to completion callbacks.
pub type Outcome = std::result::Result<(), CompletionError>;

struct Operation {
    variant: Variant,
    state: Arc<Mutex<CompletionState>>,
    registry: Arc<Registry>,
    auto_cleanup: bool,
    on_done: Deferred<Outcome>,
}

impl Operation {
    fn on_trigger(&self, trigger: Trigger) {
        let name = trigger.name();
        // Held until the outcome is queued, so a concurrent cleanup either
        // cancels first or waits for the delivery to be scheduled.
        let mut state = self.state.lock();
        let Some(raw) = state.apply(trigger) else {
            tracing::trace!(variant = %self.variant, trigger = name, "trigger ignored or left operation pending");
            return;
        };

        // Detach first so the callback may re-attach to the same resource.
        if self.auto_cleanup {
            self.registry.detach_all();
        }

        let outcome = normalize(raw);
        match &outcome {
            Ok(()) => tracing::debug!(variant = %self.variant, trigger = name, "resource finished"),
            Err(err) => tracing::debug!(
                variant = %self.variant,
                trigger = name,
                kind = %err.kind(),
                exit_code = ?err.exit_code(),
                "resource failed: {}",
                err
            ),
        }
        self.on_done.invoke(outcome);
    }
}

/// Track a resource until it finishes, delivering the outcome on the current
/// tokio runtime.
///
/// `on_done` runs exactly once, on a spawned task, with `Ok(())` when every
/// tracked side finished or the [`CompletionError`] describing why it did
/// not. It never runs if the returned handle is cleaned up first.
///
/// # Errors
///
/// Returns [`TrackError`](crate::TrackError) when the resource classifies as
/// nothing observable, or when called outside of a tokio runtime. Nothing is
/// attached in either case.
///
/// # Examples
///
/// ```rust,ignore
/// use settle::{CompletionConfig, track_completion};
///
/// let handle = track_completion(&reader, CompletionConfig::default(), |outcome| {
///     match outcome {
///         Ok(()) => println!("stream has ended"),
///         Err(err) => println!("stream had an error or closed early: {}", err),
///     }
/// })?;
/// ```
pub fn track_completion<R, F>(
    resource: &R,
    config: CompletionConfig,
    on_done: F,
) -> Result<CleanupHandle>
where
    R: Resource + ?Sized,
    F: FnOnce(Outcome) + Send + 'static,
{
    let variant = classify(resource.shape())?;
    let scheduler = TokioScheduler::current()?;
    Ok(start(resource, variant, config, Arc::new(scheduler), on_done))
}

/// Like [`track_completion`], delivering the outcome through `scheduler`.
pub fn track_completion_with<R, F>(
    resource: &R,
    config: CompletionConfig,
    scheduler: Arc<dyn Scheduler>,
    on_done: F,
) -> Result<CleanupHandle>
where
    R: Resource + ?Sized,
    F: FnOnce(Outcome) + Send + 'static,
{
    let variant = classify(resource.shape())?;
    Ok(start(resource, variant, config, scheduler, on_done))
}

fn start<R, F>(
    resource: &R,
    variant: Variant,
    config: CompletionConfig,
    scheduler: Arc<dyn Scheduler>,
    on_done: F,
) -> CleanupHandle
where
    R: Resource + ?Sized,
    F: FnOnce(Outcome) + Send + 'static,
{
    let initial = CompletionState::initialize(variant, &config, &resource.state().snapshot());
    let state = Arc::new(Mutex::new(initial));
    let registry = Arc::new(Registry::new());
    let operation = Arc::new(Operation {
        variant,
        state: Arc::clone(&state),
        registry: Arc::clone(&registry),
        auto_cleanup: config.cleanup,
        on_done: Deferred::new(scheduler, on_done),
    });

    let sink: Sink = Arc::new(move |trigger: Trigger| operation.on_trigger(trigger));
    registry::register(resource, variant, &config, &registry, &sink);

    tracing::debug!(
        %variant,
        bindings = registry.len(),
        readable_pending = initial.readable_pending(),
        writable_pending = initial.writable_pending(),
        "tracking resource completion"
    );
    catch_up(resource, variant, &config, &sink);
    CleanupHandle::new(registry, state)
}

/// Feed the transitions the resource recorded before its observers were
/// attached.
///
/// Anything the observers also saw is applied twice, which the state
/// machine absorbs.
fn catch_up<R>(resource: &R, variant: Variant, config: &CompletionConfig, sink: &Sink)
where
    R: Resource + ?Sized,
{
    let state = resource.state();
    let flags = state.snapshot();
    let fault = state.fault();

    // Sides that ended before the fault count as ended before it.
    if let Some((fault, at)) = fault {
        if at.readable_ended {
            sink(Trigger::ReadableEnded);
        }
        if at.writable_ended {
            sink(Trigger::WritableFinished);
        }
        if config.error {
            sink(Trigger::Error(fault));
        }
    }
    if flags.readable_ended {
        sink(Trigger::ReadableEnded);
    }
    if flags.writable_ended {
        sink(Trigger::WritableFinished);
    }
    if variant == Variant::ProcessLike && flags.exited {
        sink(Trigger::Exit {
            code: flags.exit_code,
            signal: state.exit_signal(),
        });
    }
    if flags.closed {
        if resource.shape().is_legacy_writable() && !flags.writable {
            sink(Trigger::WritableFinished);
        }
        tracing::trace!(%variant, "resource closed before tracking attached");
        sink(Trigger::close(flags));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackError;
    use crate::normalize::ErrorKind;
    use settle_core::{Emitter, Event, Fault, QueueScheduler, Shape, StreamState};

    struct Mock {
        emitter: Emitter,
        state: StreamState,
        shape: Shape,
    }

    impl Mock {
        fn new(shape: Shape, state: StreamState) -> Self {
            Self {
                emitter: Emitter::new(),
                state,
                shape,
            }
        }
    }

    impl Resource for Mock {
        fn emitter(&self) -> &Emitter {
            &self.emitter
        }

        fn state(&self) -> &StreamState {
            &self.state
        }

        fn shape(&self) -> Shape {
            self.shape
        }
    }

    type Outcomes = Arc<Mutex<Vec<Outcome>>>;

    fn track(mock: &Mock, config: CompletionConfig) -> (QueueScheduler, Outcomes, CleanupHandle) {
        let queue = QueueScheduler::new();
        let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        let handle = track_completion_with(mock, config, Arc::new(queue.clone()), move |outcome| {
            sink.lock().push(outcome);
        })
        .expect("mock is a resource");
        (queue, outcomes, handle)
    }

    #[test]
    fn test_outcome_is_deferred() {
        let mock = Mock::new(Shape::readable(), StreamState::readable());
        let (queue, outcomes, _handle) = track(&mock, CompletionConfig::default());

        mock.emitter.emit(Event::End);
        assert!(outcomes.lock().is_empty());

        queue.run_pending();
        assert!(matches!(outcomes.lock().as_slice(), [Ok(())]));
    }

    #[test]
    fn test_error_then_close_delivers_once() {
        let mock = Mock::new(Shape::duplex(), StreamState::duplex());
        let config = CompletionConfig::default().with_cleanup(false);
        let (queue, outcomes, _handle) = track(&mock, config);

        mock.emitter.emit(Event::Error(Fault::message("boom")));
        mock.emitter.emit(Event::Close { exit_code: None });
        queue.run_pending();

        let outcomes = outcomes.lock();
        assert_eq!(outcomes.len(), 1);
        let err = outcomes[0].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamError);
    }

    #[test]
    fn test_auto_cleanup_detaches_before_delivery() {
        let mock = Mock::new(Shape::duplex(), StreamState::duplex());
        let (queue, _outcomes, handle) = track(&mock, CompletionConfig::default());

        mock.emitter.emit(Event::Error(Fault::message("boom")));
        assert!(handle.is_cleaned_up());
        assert_eq!(mock.emitter.total_listeners(), 0);
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_cleanup_disabled_keeps_observers() {
        let mock = Mock::new(Shape::readable(), StreamState::readable());
        let config = CompletionConfig::default().with_cleanup(false);
        let (_queue, _outcomes, handle) = track(&mock, config);

        mock.emitter.emit(Event::End);
        assert!(!handle.is_cleaned_up());
        assert!(mock.emitter.total_listeners() > 0);

        handle.cleanup();
        assert_eq!(mock.emitter.total_listeners(), 0);
    }

    #[test]
    fn test_cancel_before_any_signal() {
        let mock = Mock::new(Shape::writable(), StreamState::writable());
        let (queue, outcomes, handle) = track(&mock, CompletionConfig::default());

        handle.cleanup();
        mock.emitter.emit(Event::Close { exit_code: None });
        mock.emitter.emit(Event::Finish);

        assert_eq!(queue.run_pending(), 0);
        assert!(outcomes.lock().is_empty());
    }

    #[test]
    fn test_recorded_close_settles_late_tracking() {
        let mock = Mock::new(Shape::duplex(), StreamState::duplex());
        mock.state.record_fault(Fault::io(std::io::Error::from(
            std::io::ErrorKind::ConnectionRefused,
        )));
        mock.state.mark_closed();

        let (queue, outcomes, handle) = track(&mock, CompletionConfig::default());
        queue.run_pending();

        let outcomes = outcomes.lock();
        assert_eq!(outcomes.len(), 1);
        let err = outcomes[0].as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
        assert!(handle.is_cleaned_up());
    }

    #[test]
    fn test_recorded_end_before_close_is_success() {
        let mock = Mock::new(Shape::readable(), StreamState::readable());
        mock.state.end_readable();
        mock.state.mark_closed();

        let (queue, outcomes, _handle) = track(&mock, CompletionConfig::default());
        queue.run_pending();

        assert!(matches!(outcomes.lock().as_slice(), [Ok(())]));
    }

    #[test]
    fn test_fault_after_finishing_does_not_override() {
        let mock = Mock::new(Shape::duplex(), StreamState::duplex());
        mock.state.end_readable();
        mock.state.end_writable();
        mock.state.record_fault(Fault::message("late"));
        mock.state.mark_closed();

        let (queue, outcomes, _handle) = track(&mock, CompletionConfig::default());
        queue.run_pending();

        assert!(matches!(outcomes.lock().as_slice(), [Ok(())]));
    }

    #[test]
    fn test_recorded_exit_reports_signal() {
        let mock = Mock::new(Shape::process(), StreamState::detached());
        mock.state.set_exit(None, Some("SIGKILL".to_string()));
        mock.state.mark_closed();

        let (queue, outcomes, _handle) = track(&mock, CompletionConfig::default());
        queue.run_pending();

        let outcomes = outcomes.lock();
        let err = outcomes[0].as_ref().unwrap_err();
        assert!(err.is_process_exit());
        assert_eq!(err.signal(), Some("SIGKILL"));
    }

    #[test]
    fn test_recorded_legacy_shutdown_is_success() {
        let mock = Mock::new(Shape::legacy_writable(), StreamState::writable());
        mock.state.set_writable(false);
        mock.state.mark_closed();

        let config = CompletionConfig::default().with_writable(true);
        let (queue, outcomes, _handle) = track(&mock, config);
        queue.run_pending();

        assert!(matches!(outcomes.lock().as_slice(), [Ok(())]));
    }

    #[test]
    fn test_cleanup_racing_emission_never_delivers_late() {
        for _ in 0..200 {
            let mock = Mock::new(Shape::writable(), StreamState::writable());
            let (queue, outcomes, handle) = track(&mock, CompletionConfig::default());

            let queued_at_cleanup = std::thread::scope(|scope| {
                scope.spawn(|| mock.emitter.emit(Event::Close { exit_code: None }));
                let canceller = scope.spawn(|| {
                    handle.cleanup();
                    queue.pending()
                });
                canceller.join().expect("cleanup thread")
            });

            queue.run_pending();
            assert_eq!(outcomes.lock().len(), queued_at_cleanup);
        }
    }

    #[test]
    fn test_not_a_resource_attaches_nothing() {
        let mock = Mock::new(Shape::opaque(), StreamState::duplex());
        let result = track_completion_with(
            &mock,
            CompletionConfig::default(),
            Arc::new(QueueScheduler::new()),
            |_| {},
        );

        assert!(matches!(result, Err(TrackError::NotAResource(_))));
        assert_eq!(mock.emitter.total_listeners(), 0);
    }

    #[test]
    fn test_default_scheduler_needs_runtime() {
        let mock = Mock::new(Shape::readable(), StreamState::readable());
        let result = track_completion(&mock, CompletionConfig::default(), |_| {});

        assert!(matches!(result, Err(TrackError::NoRuntime(_))));
        assert_eq!(mock.emitter.total_listeners(), 0);
    }
}
