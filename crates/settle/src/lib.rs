#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Settle
//!
//! Exactly-once completion tracking for streams, requests and child
//! processes.
//!
//! Give [`track_completion`] anything that implements
//! [`Resource`](settle_core::Resource) and it calls you back once, with
//! `Ok(())` when the resource is fully done or a [`CompletionError`] saying
//! why it is not: a stream error, a close before the end, a failed process
//! exit, or a refused connection.
//!
//! ## Features
//!
//! - **One callback, one time**: error-then-close, end-then-finish and
//!   repeated signals all collapse into a single deferred delivery
//! - **Every shape**: readable, writable, duplex, request-like and
//!   process-like resources, including legacy writables without a `finish`
//!   signal
//! - **Cancellable**: the returned [`CleanupHandle`] detaches every observer;
//!   cleaning up first means the callback never runs
//! - **Awaitable**: [`finished`] returns a future instead of taking a callback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use settle::{CompletionConfig, finished};
//! use settle_transport::{ProcessConfig, ProcessHandle};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let child = ProcessHandle::spawn(ProcessConfig::new("ls").with_arg("-l")).await?;
//!     finished(&child, CompletionConfig::default())?.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! [`CompletionConfig`] picks which sides to wait on and whether observers
//! are detached automatically. Loosely typed options (for example decoded
//! from JSON) go through [`CompletionConfig::normalize`].

pub mod cleanup;
pub mod completion;
pub mod config;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod state;
pub mod track;

pub use cleanup::{CleanupGuard, CleanupHandle};
pub use completion::{Completion, finished};
pub use config::CompletionConfig;
pub use error::{Result, TrackError};
pub use normalize::{CompletionError, ErrorKind, NORMAL_EXIT};
pub use track::{Outcome, track_completion, track_completion_with};

pub use settle_core::{Emitter, Event, Fault, Resource, Shape, Signal, StreamState, Variant};

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use settle::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cleanup::{CleanupGuard, CleanupHandle};
    pub use crate::completion::finished;
    pub use crate::config::CompletionConfig;
    pub use crate::normalize::{CompletionError, ErrorKind};
    pub use crate::track::{Outcome, track_completion};
    pub use settle_core::prelude::*;
}
