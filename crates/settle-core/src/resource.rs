//! Observed resources and their classification.
//!
//! A [`Resource`] is anything with a lifecycle-event surface: an [`Emitter`],
//! a live [`StreamState`], and a [`Shape`] describing which protocol it
//! speaks. [`classify`] turns the shape into a closed [`Variant`] once, so
//! nothing downstream ever re-inspects the resource's shape.

use crate::emitter::Emitter;
use crate::error::{CoreError, Result};
use crate::state::StreamState;
use std::fmt;
use std::sync::Arc;

/// Structural description of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Shape {
    /// Has a readable side with internal readable state
    pub readable_side: bool,
    /// Has a writable side with internal writable state
    pub writable_side: bool,
    /// Has a writable side but no internal writable state (never emits finish)
    pub legacy_writable: bool,
    /// Speaks the request vocabulary (complete/abort/request)
    pub request: bool,
    /// Is a process handle (exit)
    pub process: bool,
}

impl Shape {
    /// A read-only stream.
    pub const fn readable() -> Self {
        Self {
            readable_side: true,
            writable_side: false,
            legacy_writable: false,
            request: false,
            process: false,
        }
    }

    /// A write-only stream.
    pub const fn writable() -> Self {
        Self {
            readable_side: false,
            writable_side: true,
            legacy_writable: false,
            request: false,
            process: false,
        }
    }

    /// A write-only stream without internal writable state.
    pub const fn legacy_writable() -> Self {
        Self {
            readable_side: false,
            writable_side: false,
            legacy_writable: true,
            request: false,
            process: false,
        }
    }

    /// A stream with both sides.
    pub const fn duplex() -> Self {
        Self {
            readable_side: true,
            writable_side: true,
            legacy_writable: false,
            request: false,
            process: false,
        }
    }

    /// An HTTP-style request/response exchange.
    pub const fn request() -> Self {
        Self {
            readable_side: false,
            writable_side: false,
            legacy_writable: false,
            request: true,
            process: false,
        }
    }

    /// A child-process handle.
    pub const fn process() -> Self {
        Self {
            readable_side: false,
            writable_side: false,
            legacy_writable: false,
            request: false,
            process: true,
        }
    }

    /// Nothing observable.
    pub const fn opaque() -> Self {
        Self {
            readable_side: false,
            writable_side: false,
            legacy_writable: false,
            request: false,
            process: false,
        }
    }

    /// Whether the writable side lacks internal writable state.
    pub const fn is_legacy_writable(&self) -> bool {
        self.legacy_writable && !self.writable_side
    }
}

/// Classified kind of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Read-only stream
    Readable,
    /// Write-only stream
    Writable,
    /// Stream with both sides
    Duplex,
    /// HTTP-style request/response exchange
    RequestLike,
    /// Child-process handle
    ProcessLike,
}

impl Variant {
    /// Short lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Variant::Readable => "readable",
            Variant::Writable => "writable",
            Variant::Duplex => "duplex",
            Variant::RequestLike => "request",
            Variant::ProcessLike => "process",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a shape.
///
/// Request and process shapes win over stream sides; a shape with nothing
/// observable is rejected.
pub fn classify(shape: Shape) -> Result<Variant> {
    if shape.request {
        return Ok(Variant::RequestLike);
    }
    if shape.process {
        return Ok(Variant::ProcessLike);
    }

    let writable = shape.writable_side || shape.legacy_writable;
    match (shape.readable_side, writable) {
        (true, true) => Ok(Variant::Duplex),
        (true, false) => Ok(Variant::Readable),
        (false, true) => Ok(Variant::Writable),
        (false, false) => Err(CoreError::NotAResource(shape)),
    }
}

/// A resource whose completion can be observed.
pub trait Resource: Send + Sync {
    /// The lifecycle-event surface.
    fn emitter(&self) -> &Emitter;

    /// Live readable/writable state.
    fn state(&self) -> &StreamState;

    /// Structural description used for classification.
    fn shape(&self) -> Shape;

    /// Emitter of the outgoing transport of a request-like resource, once it
    /// has been attached.
    fn transport(&self) -> Option<Emitter> {
        None
    }
}

impl<R: Resource + ?Sized> Resource for Arc<R> {
    fn emitter(&self) -> &Emitter {
        (**self).emitter()
    }

    fn state(&self) -> &StreamState {
        (**self).state()
    }

    fn shape(&self) -> Shape {
        (**self).shape()
    }

    fn transport(&self) -> Option<Emitter> {
        (**self).transport()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Shape::readable(), Variant::Readable)]
    #[case(Shape::writable(), Variant::Writable)]
    #[case(Shape::legacy_writable(), Variant::Writable)]
    #[case(Shape::duplex(), Variant::Duplex)]
    #[case(Shape::request(), Variant::RequestLike)]
    #[case(Shape::process(), Variant::ProcessLike)]
    fn test_classify(#[case] shape: Shape, #[case] expected: Variant) {
        assert_eq!(classify(shape), Ok(expected));
    }

    #[test]
    fn test_classify_request_wins_over_sides() {
        let shape = Shape {
            request: true,
            ..Shape::duplex()
        };
        assert_eq!(classify(shape), Ok(Variant::RequestLike));
    }

    #[test]
    fn test_classify_opaque_is_rejected() {
        assert_eq!(
            classify(Shape::opaque()),
            Err(CoreError::NotAResource(Shape::opaque()))
        );
    }

    #[test]
    fn test_legacy_writable_detection() {
        assert!(Shape::legacy_writable().is_legacy_writable());
        assert!(!Shape::writable().is_legacy_writable());
    }
}
