//! Observed byte streams
//!
//! Wrappers over tokio [`AsyncRead`]/[`AsyncWrite`] types that report their
//! lifecycle through an [`Emitter`]:
//!
//! - `end` when a read reaches end-of-data
//! - `finish` when a shutdown completes
//! - `error` when an I/O call fails
//! - `close` on [`close`](ObservedStream::close) or when dropped
//!
//! Events are not replayed to listeners attached after a transition; the
//! transition is still visible in the stream's state.

use crate::lifecycle::Lifecycle;
use pin_project::{pin_project, pinned_drop};
use settle_core::{Emitter, Resource, Shape, StreamState};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// How an [`ObservedWriter`] reports the end of its writable side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterMode {
    /// Emit `finish` after shutdown.
    #[default]
    Standard,
    /// Clear the writable flag and emit `close` after shutdown, without ever
    /// emitting `finish`.
    Legacy,
}

fn poll_observed_read<R>(
    inner: Pin<&mut R>,
    lifecycle: &Lifecycle,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
) -> Poll<io::Result<()>>
where
    R: AsyncRead + ?Sized,
{
    let wanted = buf.remaining() > 0;
    let before = buf.filled().len();
    match inner.poll_read(cx, buf) {
        Poll::Ready(Ok(())) => {
            if wanted && buf.filled().len() == before {
                lifecycle.end_readable();
            }
            Poll::Ready(Ok(()))
        }
        Poll::Ready(Err(err)) => {
            lifecycle.fail(&err);
            Poll::Ready(Err(err))
        }
        Poll::Pending => Poll::Pending,
    }
}

fn observe_write<T>(lifecycle: &Lifecycle, result: Poll<io::Result<T>>) -> Poll<io::Result<T>> {
    if let Poll::Ready(Err(err)) = &result {
        lifecycle.fail(err);
    }
    result
}

fn observe_shutdown(
    lifecycle: &Lifecycle,
    mode: WriterMode,
    result: Poll<io::Result<()>>,
) -> Poll<io::Result<()>> {
    match &result {
        Poll::Ready(Ok(())) => match mode {
            WriterMode::Standard => lifecycle.finish_writable(),
            WriterMode::Legacy => {
                lifecycle.state().set_writable(false);
                lifecycle.close();
            }
        },
        Poll::Ready(Err(err)) => lifecycle.fail(err),
        Poll::Pending => {}
    }
    result
}

/// A readable resource over any [`AsyncRead`].
#[pin_project(PinnedDrop)]
#[derive(Debug)]
pub struct ObservedReader<R> {
    #[pin]
    inner: R,
    lifecycle: Lifecycle,
}

impl<R> ObservedReader<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self::with_lifecycle(inner, Lifecycle::new(StreamState::readable()))
    }

    /// Wrap a reader reporting through an existing lifecycle.
    pub fn with_lifecycle(inner: R, lifecycle: Lifecycle) -> Self {
        Self { inner, lifecycle }
    }

    /// The wrapped reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Emit `close`. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        self.lifecycle.close()
    }
}

impl<R: AsyncRead> AsyncRead for ObservedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        poll_observed_read(this.inner, this.lifecycle, cx, buf)
    }
}

impl<R: Send + Sync> Resource for ObservedReader<R> {
    fn emitter(&self) -> &Emitter {
        self.lifecycle.emitter()
    }

    fn state(&self) -> &StreamState {
        self.lifecycle.state()
    }

    fn shape(&self) -> Shape {
        Shape::readable()
    }
}

#[pinned_drop]
impl<R> PinnedDrop for ObservedReader<R> {
    fn drop(self: Pin<&mut Self>) {
        self.lifecycle.close();
    }
}

/// A writable resource over any [`AsyncWrite`].
#[pin_project(PinnedDrop)]
#[derive(Debug)]
pub struct ObservedWriter<W> {
    #[pin]
    inner: W,
    lifecycle: Lifecycle,
    mode: WriterMode,
}

impl<W> ObservedWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self::with_mode(inner, WriterMode::Standard)
    }

    /// Wrap a writer that never emits `finish`.
    pub fn legacy(inner: W) -> Self {
        Self::with_mode(inner, WriterMode::Legacy)
    }

    /// Wrap a writer with an explicit mode.
    pub fn with_mode(inner: W, mode: WriterMode) -> Self {
        Self {
            inner,
            lifecycle: Lifecycle::new(StreamState::writable()),
            mode,
        }
    }

    /// The wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// How the end of the writable side is reported.
    pub fn mode(&self) -> WriterMode {
        self.mode
    }

    /// Emit `close`. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        self.lifecycle.close()
    }
}

impl<W: AsyncWrite> AsyncWrite for ObservedWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        observe_write(this.lifecycle, this.inner.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        observe_write(this.lifecycle, this.inner.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        observe_shutdown(this.lifecycle, *this.mode, this.inner.poll_shutdown(cx))
    }
}

impl<W: Send + Sync> Resource for ObservedWriter<W> {
    fn emitter(&self) -> &Emitter {
        self.lifecycle.emitter()
    }

    fn state(&self) -> &StreamState {
        self.lifecycle.state()
    }

    fn shape(&self) -> Shape {
        match self.mode {
            WriterMode::Standard => Shape::writable(),
            WriterMode::Legacy => Shape::legacy_writable(),
        }
    }
}

#[pinned_drop]
impl<W> PinnedDrop for ObservedWriter<W> {
    fn drop(self: Pin<&mut Self>) {
        self.lifecycle.close();
    }
}

/// A duplex resource over any type that is both [`AsyncRead`] and
/// [`AsyncWrite`], such as a TCP stream.
#[pin_project(PinnedDrop)]
#[derive(Debug)]
pub struct ObservedStream<S> {
    #[pin]
    inner: S,
    lifecycle: Lifecycle,
}

impl<S> ObservedStream<S> {
    /// Wrap a duplex stream.
    pub fn new(inner: S) -> Self {
        Self::with_lifecycle(inner, Lifecycle::new(StreamState::duplex()))
    }

    /// Wrap a duplex stream reporting through an existing lifecycle.
    pub fn with_lifecycle(inner: S, lifecycle: Lifecycle) -> Self {
        Self { inner, lifecycle }
    }

    /// The wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Emit `close`. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        self.lifecycle.close()
    }
}

impl<S: AsyncRead> AsyncRead for ObservedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        poll_observed_read(this.inner, this.lifecycle, cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for ObservedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        observe_write(this.lifecycle, this.inner.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        observe_write(this.lifecycle, this.inner.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        observe_shutdown(this.lifecycle, WriterMode::Standard, this.inner.poll_shutdown(cx))
    }
}

impl<S: Send + Sync> Resource for ObservedStream<S> {
    fn emitter(&self) -> &Emitter {
        self.lifecycle.emitter()
    }

    fn state(&self) -> &StreamState {
        self.lifecycle.state()
    }

    fn shape(&self) -> Shape {
        Shape::duplex()
    }
}

#[pinned_drop]
impl<S> PinnedDrop for ObservedStream<S> {
    fn drop(self: Pin<&mut Self>) {
        self.lifecycle.close();
    }
}
