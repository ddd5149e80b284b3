#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Core building blocks for the settle ecosystem.
//!
//! This crate holds the pieces that completion tracking depends on but does
//! not itself decide anything about:
//!
//! - **Lifecycle emitters** via [`Emitter`], the event surface every observed
//!   resource exposes (`end`, `finish`, `error`, `close`, `exit`, ...)
//! - **Live stream state** via [`StreamState`], the readable/writable flags and
//!   per-side "ended" markers a resource keeps while it runs
//! - **Resource classification** via [`Resource`], [`Shape`] and [`classify`]
//! - **Deferred, single-fire dispatch** via [`Scheduler`], [`SingleFire`] and
//!   [`Deferred`]
//!
//! # Examples
//!
//! ```rust
//! use settle_core::prelude::*;
//!
//! let emitter = Emitter::new();
//! let id = emitter.once(Signal::End, |_event| println!("ended"));
//! assert_eq!(emitter.listener_count(Signal::End), 1);
//!
//! emitter.emit(Event::End);
//! assert!(!emitter.off(Signal::End, id));
//! ```

pub mod emitter;
pub mod error;
pub mod resource;
pub mod schedule;
pub mod state;

pub use emitter::{Emitter, Event, Fault, ListenerId, Signal, WeakEmitter};
pub use error::{CoreError, Result};
pub use resource::{Resource, Shape, Variant, classify};
pub use schedule::{Deferred, QueueScheduler, Scheduler, SingleFire, Task, TokioScheduler};
pub use state::{Flags, StreamState};

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use settle_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::emitter::{Emitter, Event, Fault, Signal};
    pub use crate::resource::{Resource, Shape, Variant, classify};
    pub use crate::schedule::{QueueScheduler, Scheduler, TokioScheduler};
    pub use crate::state::StreamState;
}
