//! Observable tokio adapters for settle
//!
//! Wraps real I/O so that its lifecycle can be tracked with
//! `settle::track_completion`. Every adapter implements
//! [`Resource`](settle_core::Resource).
//!
//! # Adapters
//!
//! - **Processes**: [`ProcessHandle`] emits `exit` and `close`
//! - **Byte streams**: [`ObservedReader`], [`ObservedWriter`] and
//!   [`ObservedStream`] emit `end`, `finish`, `error` and `close`
//! - **Connections**: [`Connection`] connects in the background and reports
//!   connect failures as `error` + `close`
//! - **HTTP**: [`HttpExchange`] speaks the request vocabulary (`request`,
//!   `complete`, `abort`)
//!
//! Events are never replayed to plain listeners, but every adapter records
//! its transitions in its [`StreamState`](settle_core::StreamState) before
//! emitting them. Completion tracking catches up from that state, so it can
//! attach at any time, even after the background task has already finished.
//!
//! # Usage
//!
//! ```ignore
//! use settle::{CompletionConfig, finished};
//! use settle_transport::{HttpExchange, HttpRequest};
//!
//! let client = reqwest::Client::new();
//! let exchange = HttpExchange::send(&client, HttpRequest::get("https://example.com/"))?;
//! let done = finished(&exchange, CompletionConfig::default())?;
//! let response = exchange.response().await?;
//! done.await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod process;
pub mod stream;

// Re-export commonly used types
pub use connection::Connection;
pub use error::{Result, TransportError};
pub use http::{HttpExchange, HttpExchangeConfig, HttpRequest, HttpResponse};
pub use lifecycle::Lifecycle;
pub use process::{ProcessConfig, ProcessHandle};
pub use stream::{ObservedReader, ObservedStream, ObservedWriter, WriterMode};
