//! Observable TCP connections
//!
//! [`Connection::connect`] hands back a duplex resource right away and
//! connects in the background. A failed connect is reported on the
//! resource as `error` followed by `close`; a successful one is picked up
//! with [`Connection::established`], which yields an [`ObservedStream`]
//! reporting through the same emitter.

use crate::error::{Result, TransportError};
use crate::lifecycle::{Lifecycle, mirror};
use crate::stream::ObservedStream;
use settle_core::{Emitter, Resource, Shape, StreamState};
use std::io;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::oneshot;

/// A TCP connection that may still be connecting.
#[derive(Debug)]
pub struct Connection {
    lifecycle: Lifecycle,
    stream: oneshot::Receiver<io::Result<TcpStream>>,
}

impl Connection {
    /// Start connecting to `addr`.
    ///
    /// Must be called from within a tokio runtime. The connect attempt runs
    /// on a spawned task and may fail before anything attaches; the failure
    /// and the close are recorded in the connection's state.
    pub fn connect<A>(addr: A) -> Self
    where
        A: ToSocketAddrs + Send + 'static,
    {
        let lifecycle = Lifecycle::new(StreamState::duplex());
        let (tx, rx) = oneshot::channel();

        let task = lifecycle.clone();
        tokio::spawn(async move {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    tracing::debug!(peer = ?stream.peer_addr().ok(), "connection established");
                    if let Err(Ok(stream)) = tx.send(Ok(stream)) {
                        // Nobody is waiting for the stream; release it.
                        drop(stream);
                        task.close();
                    }
                }
                Err(err) => {
                    task.fail(&err);
                    task.close();
                    let _ = tx.send(Err(err));
                }
            }
        });

        Self {
            lifecycle,
            stream: rx,
        }
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> ObservedStream<TcpStream> {
        ObservedStream::new(stream)
    }

    /// Wait for the connect attempt and return the observed stream.
    ///
    /// # Errors
    ///
    /// Returns the connect failure as [`TransportError::Io`].
    pub async fn established(self) -> Result<ObservedStream<TcpStream>> {
        match self.stream.await {
            Ok(Ok(stream)) => Ok(ObservedStream::with_lifecycle(stream, self.lifecycle)),
            Ok(Err(err)) => Err(TransportError::Io(mirror(&err))),
            Err(_) => Err(TransportError::Closed(
                "connect task ended without a result".to_string(),
            )),
        }
    }
}

impl Resource for Connection {
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
