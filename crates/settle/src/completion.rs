//! Awaitable completion
//!
//! [`finished`] is the async face of [`track_completion`]: it returns a
//! [`Completion`] future instead of taking a callback. Dropping the future
//! before it resolves cancels the operation and detaches its observers.
//! Cancelling through [`Completion::handle`] does the same without dropping
//! it; the future then never resolves.

use crate::cleanup::{CleanupGuard, CleanupHandle};
use crate::config::CompletionConfig;
use crate::error::Result;
use crate::normalize::CompletionError;
use crate::track::{Outcome, track_completion};
use settle_core::Resource;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Future resolving to the outcome of one tracking operation.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited; dropping a Completion cancels it"]
pub struct Completion {
    outcome: oneshot::Receiver<Outcome>,
    guard: CleanupGuard,
}

impl Completion {
    /// Handle to cancel the operation without dropping the future.
    pub fn handle(&self) -> Option<&CleanupHandle> {
        self.guard.handle()
    }

    fn is_cancelled(&self) -> bool {
        self.handle().is_some_and(CleanupHandle::is_cancelled)
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Cancelled operations produce no outcome.
        if self.is_cancelled() {
            return Poll::Pending;
        }
        match Pin::new(&mut self.outcome).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The resource went away without ever settling.
            Poll::Ready(Err(_)) => Poll::Ready(Err(CompletionError::premature_close(None))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Wait for a resource to finish.
///
/// Must be called from within a tokio runtime.
///
/// # Examples
///
/// ```rust,ignore
/// use settle::{CompletionConfig, finished};
///
/// let process = ProcessHandle::spawn(ProcessConfig::new("true")).await?;
/// finished(&process, CompletionConfig::default())?.await?;
/// ```
pub fn finished<R>(resource: &R, config: CompletionConfig) -> Result<Completion>
where
    R: Resource + ?Sized,
{
    let (tx, rx) = oneshot::channel();
    let handle = track_completion(resource, config, move |outcome| {
        // The receiver is gone only if the Completion was dropped.
        let _ = tx.send(outcome);
    })?;

    Ok(Completion {
        outcome: rx,
        guard: handle.into_guard(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle_core::{Emitter, Event, Shape, StreamState};
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    struct Mock {
        emitter: Emitter,
        state: StreamState,
    }

    impl Resource for Mock {
        fn emitter(&self) -> &Emitter {
            &self.emitter
        }

        fn state(&self) -> &StreamState {
            &self.state
        }

        fn shape(&self) -> Shape {
            Shape::writable()
        }
    }

    fn writable() -> Mock {
        Mock {
            emitter: Emitter::new(),
            state: StreamState::writable(),
        }
    }

    #[tokio::test]
    async fn test_resolves_after_finish() {
        let mock = writable();
        let mut completion = finished(&mock, CompletionConfig::default()).expect("inside a runtime");
        assert!(futures::poll!(&mut completion).is_pending());

        mock.emitter.emit(Event::Finish);
        assert!(completion.await.is_ok());
    }

    #[test]
    fn test_pending_until_signalled() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let _entered = runtime.enter();

        let mock = writable();
        let mut completion =
            tokio_test::task::spawn(finished(&mock, CompletionConfig::default()).expect("entered"));
        assert_pending!(completion.poll());
        assert_pending!(completion.poll());

        mock.emitter.emit(Event::Finish);
        for _ in 0..64 {
            if completion.is_woken() {
                break;
            }
            runtime.block_on(tokio::task::yield_now());
        }
        assert!(completion.is_woken());
        let outcome = assert_ready!(completion.poll());
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let mock = writable();
        let completion = finished(&mock, CompletionConfig::default()).expect("inside a runtime");
        assert!(mock.emitter.total_listeners() > 0);

        drop(completion);
        assert_eq!(mock.emitter.total_listeners(), 0);
    }

    #[tokio::test]
    async fn test_dropped_resource_is_premature_close() {
        let mock = writable();
        let completion = finished(&mock, CompletionConfig::default()).expect("inside a runtime");
        drop(mock);

        let err = completion.await.unwrap_err();
        assert!(err.is_premature_close());
        assert_eq!(err.exit_code(), None);
    }

    #[tokio::test]
    async fn test_handle_cancels_in_place() {
        let mock = writable();
        let mut completion =
            finished(&mock, CompletionConfig::default()).expect("inside a runtime");

        completion.handle().expect("armed").cleanup();
        assert_eq!(mock.emitter.total_listeners(), 0);
        assert!(futures::poll!(&mut completion).is_pending());

        // The writable is still open; cancelling must not report it closed.
        mock.emitter.emit(Event::Close { exit_code: None });
        let waited = tokio::time::timeout(Duration::from_millis(50), completion).await;
        assert!(waited.is_err());
    }
}
