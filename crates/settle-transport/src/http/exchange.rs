//! Observable HTTP exchanges
//!
//! An [`HttpExchange`] runs one request on a background task and reports it
//! with the request vocabulary:
//!
//! - `request` carrying the emitter of the outgoing request, which emits
//!   `finish` once the request has been sent
//! - `end` once the response body has been read, then `complete`
//! - `error` if the request fails, `abort` if [`HttpExchange::abort`] is called
//! - `close` last, in every case

use super::message::{HttpRequest, HttpResponse};
use crate::error::{Result, TransportError};
use crate::lifecycle::Lifecycle;
use settle_core::{Emitter, Event, Fault, Resource, Shape, StreamState};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};

/// Client configuration for HTTP exchanges
#[derive(Clone, Debug)]
pub struct HttpExchangeConfig {
    /// Request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpExchangeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 10,
        }
    }
}

impl HttpExchangeConfig {
    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build a client with this configuration
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))
    }
}

/// One in-flight HTTP request/response exchange.
#[derive(Debug)]
pub struct HttpExchange {
    lifecycle: Lifecycle,
    request: Emitter,
    request_attached: Arc<AtomicBool>,
    aborted: Arc<AtomicBool>,
    abort: Arc<Notify>,
    response: oneshot::Receiver<Result<HttpResponse>>,
}

impl HttpExchange {
    /// Start sending `request` with `client`.
    ///
    /// Must be called from within a tokio runtime. The exchange runs on
    /// another task right away; its progress is recorded in the exchange's
    /// state as well as emitted.
    ///
    /// # Errors
    ///
    /// Fails synchronously only for an unsupported method; transport failures
    /// are reported through `error` and [`HttpExchange::response`].
    pub fn send(client: &reqwest::Client, request: HttpRequest) -> Result<Self> {
        let method = request.reqwest_method()?;
        let mut builder = client.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let lifecycle = Lifecycle::new(StreamState::duplex());
        let request_emitter = Emitter::new();
        let request_attached = Arc::new(AtomicBool::new(false));
        let abort = Arc::new(Notify::new());
        let (tx, rx) = oneshot::channel();

        let driver = Driver {
            lifecycle: lifecycle.clone(),
            request: request_emitter.clone(),
            request_attached: request_attached.clone(),
            abort: abort.clone(),
        };
        tracing::debug!(method = %request.method, url = %request.url, "starting HTTP exchange");
        tokio::spawn(driver.run(builder, tx));

        Ok(Self {
            lifecycle,
            request: request_emitter,
            request_attached,
            aborted: Arc::new(AtomicBool::new(false)),
            abort,
            response: rx,
        })
    }

    /// Abort the exchange.
    ///
    /// Emits `abort` right away. Returns `false` if the exchange had already
    /// closed or been aborted.
    pub fn abort(&self) -> bool {
        if self.lifecycle.is_closed() || self.aborted.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::debug!("aborting HTTP exchange");
        self.lifecycle.emitter().emit(Event::Abort);
        self.abort.notify_one();
        true
    }

    /// Wait for the collected response.
    ///
    /// # Errors
    ///
    /// Returns the transport failure, or [`TransportError::Aborted`].
    pub async fn response(self) -> Result<HttpResponse> {
        self.response.await.map_err(|_| {
            TransportError::Closed("exchange task ended without a result".to_string())
        })?
    }
}

impl Resource for HttpExchange {
    fn emitter(&self) -> &Emitter {
        self.lifecycle.emitter()
    }

    fn state(&self) -> &StreamState {
        self.lifecycle.state()
    }

    fn shape(&self) -> Shape {
        Shape::request()
    }

    fn transport(&self) -> Option<Emitter> {
        self.request_attached
            .load(Ordering::Acquire)
            .then(|| self.request.clone())
    }
}

struct Driver {
    lifecycle: Lifecycle,
    request: Emitter,
    request_attached: Arc<AtomicBool>,
    abort: Arc<Notify>,
}

impl Driver {
    async fn run(
        self,
        builder: reqwest::RequestBuilder,
        tx: oneshot::Sender<Result<HttpResponse>>,
    ) {
        self.request_attached.store(true, Ordering::Release);
        self.lifecycle
            .emitter()
            .emit(Event::Request(self.request.clone()));

        let result = tokio::select! {
            result = self.exchange(builder) => result,
            () = self.abort.notified() => Err(TransportError::Aborted),
        };
        match &result {
            Ok(response) => tracing::debug!(status = response.status, "HTTP exchange complete"),
            Err(err) => tracing::debug!("HTTP exchange failed: {}", err),
        }

        self.lifecycle.close();
        let _ = tx.send(result);
    }

    async fn exchange(&self, builder: reqwest::RequestBuilder) -> Result<HttpResponse> {
        let response = builder.send().await.map_err(|e| self.fail(e))?;
        self.lifecycle.state().end_writable();
        self.request.emit(Event::Finish);

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.to_string(), v.to_string());
            }
        }

        let body = response.bytes().await.map_err(|e| self.fail(e))?;
        self.lifecycle.end_readable();
        self.lifecycle.emitter().emit(Event::Complete);

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn fail(&self, err: reqwest::Error) -> TransportError {
        match io_source(&err) {
            Some(io) => self.lifecycle.fail(io),
            None => self.lifecycle.fail_with(Fault::message(err.to_string())),
        }
        TransportError::from(err)
    }
}

/// The innermost I/O error in an error's source chain.
fn io_source<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut source = err.source();
    let mut found = None;
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            found = Some(io);
        }
        source = err.source();
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = HttpExchangeConfig::default().with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.build_client().is_ok());
    }

    #[test]
    fn test_io_source_finds_nested_error() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] io::Error);

        #[derive(Debug, thiserror::Error)]
        #[error("top")]
        struct Top(#[source] Outer);

        let err = Top(Outer(io::Error::from(io::ErrorKind::ConnectionRefused)));
        let io = io_source(&err).expect("nested io error");
        assert_eq!(io.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_unsupported_method_fails_synchronously() {
        let client = reqwest::Client::new();
        let result = HttpExchange::send(&client, HttpRequest::new("BREW", "http://localhost/"));
        assert!(matches!(result, Err(TransportError::Http(_))));
    }
}
