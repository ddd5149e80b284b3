//! Completion state machine
//!
//! [`CompletionState`] decides, one [`Trigger`] at a time, whether a resource
//! has finished. It is a plain value with no knowledge of emitters or
//! callbacks, so the whole transition table is testable in isolation.

use crate::config::CompletionConfig;
use settle_core::{Fault, Flags, Variant};

/// A lifecycle signal, as seen by the state machine.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// The writable side finished.
    WritableFinished,
    /// The readable side ended.
    ReadableEnded,
    /// The resource reported a fault.
    Error(Fault),
    /// The resource closed (or was aborted).
    Close {
        /// Exit code known at close time
        exit_code: Option<i32>,
        /// The resource's own state marks its readable side ended
        readable_ended: bool,
        /// The resource's own state marks its writable side ended
        writable_ended: bool,
    },
    /// A process terminated.
    Exit {
        /// Exit code, absent when killed by a signal
        code: Option<i32>,
        /// Terminating signal name
        signal: Option<String>,
    },
}

impl Trigger {
    /// Close trigger built from the live state of the resource.
    pub fn close(flags: Flags) -> Self {
        Trigger::Close {
            exit_code: flags.exit_code,
            readable_ended: flags.readable_ended,
            writable_ended: flags.writable_ended,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::WritableFinished => "writable-finished",
            Trigger::ReadableEnded => "readable-ended",
            Trigger::Error(_) => "error",
            Trigger::Close { .. } => "close",
            Trigger::Exit { .. } => "exit",
        }
    }
}

/// The outcome produced when the state machine settles, before normalization.
#[derive(Debug, Clone)]
pub enum RawOutcome {
    /// Every tracked side finished.
    Success,
    /// The resource reported a fault.
    Fault(Fault),
    /// The resource closed while a tracked side was still pending.
    PrematureClose {
        /// Exit code known at close time
        exit_code: Option<i32>,
    },
    /// A process terminated abnormally.
    Exit {
        /// Exit code, absent when killed by a signal
        code: Option<i32>,
        /// Terminating signal name
        signal: Option<String>,
    },
}

/// Pending/settled bookkeeping for one tracking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionState {
    readable_pending: bool,
    writable_pending: bool,
    settled: bool,
    cancelled: bool,
}

impl CompletionState {
    /// Seed the state from the classified variant, the caller's overrides and
    /// the resource's flags at registration time.
    pub fn initialize(variant: Variant, config: &CompletionConfig, flags: &Flags) -> Self {
        let readable_pending = match (config.readable, variant) {
            (Some(readable), _) => readable,
            (None, Variant::Writable) => false,
            (None, _) => flags.readable,
        };
        let writable_pending = match (config.writable, variant) {
            (Some(writable), _) => writable,
            (None, Variant::Readable) => false,
            (None, _) => flags.writable,
        };

        Self {
            readable_pending,
            writable_pending,
            settled: false,
            cancelled: false,
        }
    }

    /// Whether the readable side is still expected to finish.
    pub fn readable_pending(&self) -> bool {
        self.readable_pending
    }

    /// Whether the writable side is still expected to finish.
    pub fn writable_pending(&self) -> bool {
        self.writable_pending
    }

    /// Whether an outcome has been produced.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Whether the operation was cancelled before it settled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Cancel the operation so that no later trigger produces an outcome.
    ///
    /// Returns `false` if the operation had already settled or been cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.settled {
            return false;
        }
        self.settled = true;
        self.cancelled = true;
        true
    }

    /// Apply one trigger.
    ///
    /// Returns the outcome on the transition that settles the operation and
    /// `None` otherwise. Once settled, triggers change nothing.
    pub fn apply(&mut self, trigger: Trigger) -> Option<RawOutcome> {
        if self.settled {
            return None;
        }

        match trigger {
            Trigger::WritableFinished => self.finish_writable(),
            Trigger::ReadableEnded => {
                self.readable_pending = false;
                if self.writable_pending {
                    None
                } else {
                    self.finalize(RawOutcome::Success)
                }
            }
            Trigger::Error(fault) => self.finalize(RawOutcome::Fault(fault)),
            Trigger::Close {
                exit_code,
                readable_ended,
                writable_ended,
            } => {
                let readable_open = self.readable_pending && !readable_ended;
                let writable_open = self.writable_pending && !writable_ended;
                if readable_open || writable_open {
                    self.finalize(RawOutcome::PrematureClose { exit_code })
                } else if !self.readable_pending && !self.writable_pending {
                    self.finalize(RawOutcome::Success)
                } else {
                    // Ended internally; the end/finish signal settles it.
                    None
                }
            }
            Trigger::Exit { code: Some(0), .. } => self.finish_writable(),
            Trigger::Exit { code, signal } => self.finalize(RawOutcome::Exit { code, signal }),
        }
    }

    fn finish_writable(&mut self) -> Option<RawOutcome> {
        self.writable_pending = false;
        if self.readable_pending {
            None
        } else {
            self.finalize(RawOutcome::Success)
        }
    }

    fn finalize(&mut self, outcome: RawOutcome) -> Option<RawOutcome> {
        self.settled = true;
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn duplex() -> CompletionState {
        CompletionState::initialize(
            Variant::Duplex,
            &CompletionConfig::default(),
            &Flags {
                readable: true,
                writable: true,
                ..Flags::default()
            },
        )
    }

    fn close(exit_code: Option<i32>) -> Trigger {
        Trigger::Close {
            exit_code,
            readable_ended: false,
            writable_ended: false,
        }
    }

    #[rstest]
    #[case(Variant::Readable, true, true, true, false)]
    #[case(Variant::Writable, true, true, false, true)]
    #[case(Variant::Duplex, true, false, true, false)]
    #[case(Variant::ProcessLike, false, false, false, false)]
    #[case(Variant::RequestLike, true, true, true, true)]
    fn test_initialize_from_flags(
        #[case] variant: Variant,
        #[case] readable: bool,
        #[case] writable: bool,
        #[case] readable_pending: bool,
        #[case] writable_pending: bool,
    ) {
        let flags = Flags {
            readable,
            writable,
            ..Flags::default()
        };
        let state = CompletionState::initialize(variant, &CompletionConfig::default(), &flags);
        assert_eq!(state.readable_pending(), readable_pending);
        assert_eq!(state.writable_pending(), writable_pending);
        assert!(!state.is_settled());
    }

    #[test]
    fn test_initialize_overrides_win() {
        let config = CompletionConfig::default()
            .with_readable(false)
            .with_writable(true);
        let flags = Flags {
            readable: true,
            ..Flags::default()
        };
        let state = CompletionState::initialize(Variant::Readable, &config, &flags);
        assert!(!state.readable_pending());
        assert!(state.writable_pending());
    }

    #[test]
    fn test_end_then_finish_succeeds() {
        let mut state = duplex();
        assert!(state.apply(Trigger::ReadableEnded).is_none());
        assert!(matches!(
            state.apply(Trigger::WritableFinished),
            Some(RawOutcome::Success)
        ));
        assert!(state.is_settled());
    }

    #[test]
    fn test_finish_then_end_succeeds() {
        let mut state = duplex();
        assert!(state.apply(Trigger::WritableFinished).is_none());
        assert!(matches!(
            state.apply(Trigger::ReadableEnded),
            Some(RawOutcome::Success)
        ));
    }

    #[test]
    fn test_error_overrides_pending() {
        let mut state = duplex();
        let outcome = state.apply(Trigger::Error(Fault::message("boom")));
        assert!(matches!(outcome, Some(RawOutcome::Fault(_))));
        assert!(state.readable_pending());
    }

    #[test]
    fn test_close_while_pending_is_premature() {
        let mut state = duplex();
        state.apply(Trigger::ReadableEnded);
        assert!(matches!(
            state.apply(close(Some(0))),
            Some(RawOutcome::PrematureClose { exit_code: Some(0) })
        ));
    }

    #[test]
    fn test_close_after_internal_end_waits_for_signal() {
        let mut state = duplex();
        state.apply(Trigger::WritableFinished);
        let outcome = state.apply(Trigger::Close {
            exit_code: None,
            readable_ended: true,
            writable_ended: true,
        });
        assert!(outcome.is_none());
        assert!(!state.is_settled());

        assert!(matches!(
            state.apply(Trigger::ReadableEnded),
            Some(RawOutcome::Success)
        ));
    }

    #[test]
    fn test_close_with_nothing_tracked_succeeds() {
        let config = CompletionConfig::default()
            .with_readable(false)
            .with_writable(false);
        let mut state =
            CompletionState::initialize(Variant::Duplex, &config, &Flags::default());
        assert!(matches!(state.apply(close(None)), Some(RawOutcome::Success)));
    }

    #[test]
    fn test_exit_zero_finishes_writable_side() {
        let mut state = CompletionState::initialize(
            Variant::ProcessLike,
            &CompletionConfig::default(),
            &Flags::default(),
        );
        let outcome = state.apply(Trigger::Exit {
            code: Some(0),
            signal: None,
        });
        assert!(matches!(outcome, Some(RawOutcome::Success)));
    }

    #[test]
    fn test_exit_zero_waits_for_tracked_readable() {
        let config = CompletionConfig::default().with_readable(true);
        let mut state =
            CompletionState::initialize(Variant::ProcessLike, &config, &Flags::default());
        let outcome = state.apply(Trigger::Exit {
            code: Some(0),
            signal: None,
        });
        assert!(outcome.is_none());
        assert!(matches!(
            state.apply(Trigger::ReadableEnded),
            Some(RawOutcome::Success)
        ));
    }

    #[test]
    fn test_exit_nonzero_fails() {
        let mut state = CompletionState::initialize(
            Variant::ProcessLike,
            &CompletionConfig::default(),
            &Flags::default(),
        );
        let outcome = state.apply(Trigger::Exit {
            code: Some(1),
            signal: None,
        });
        assert!(matches!(
            outcome,
            Some(RawOutcome::Exit { code: Some(1), .. })
        ));
    }

    #[test]
    fn test_settled_ignores_everything() {
        let mut state = duplex();
        state.apply(Trigger::Error(Fault::message("first")));
        let frozen = state;

        assert!(state.apply(close(None)).is_none());
        assert!(state.apply(Trigger::ReadableEnded).is_none());
        assert!(state.apply(Trigger::WritableFinished).is_none());
        assert_eq!(state, frozen);
    }

    fn any_trigger() -> impl Strategy<Value = Trigger> {
        prop_oneof![
            Just(Trigger::WritableFinished),
            Just(Trigger::ReadableEnded),
            Just(Trigger::Error(Fault::message("fault"))),
            (any::<Option<i32>>(), any::<bool>(), any::<bool>()).prop_map(
                |(exit_code, readable_ended, writable_ended)| Trigger::Close {
                    exit_code,
                    readable_ended,
                    writable_ended,
                }
            ),
            (prop::option::of(-2i32..3)).prop_map(|code| Trigger::Exit { code, signal: None }),
        ]
    }

    fn any_variant() -> impl Strategy<Value = Variant> {
        prop_oneof![
            Just(Variant::Readable),
            Just(Variant::Writable),
            Just(Variant::Duplex),
            Just(Variant::RequestLike),
            Just(Variant::ProcessLike),
        ]
    }

    #[test]
    fn test_cancel_blocks_later_triggers() {
        let mut state = duplex();
        assert!(state.cancel());
        assert!(!state.cancel());
        assert!(state.is_cancelled());

        assert!(state.apply(Trigger::Error(Fault::message("late"))).is_none());
        assert!(state.apply(close(None)).is_none());
    }

    #[test]
    fn test_cancel_after_settle_is_noop() {
        let mut state = duplex();
        assert!(state.apply(close(None)).is_some());
        assert!(!state.cancel());
        assert!(!state.is_cancelled());
    }

    proptest! {
        #[test]
        fn prop_settles_at_most_once(
            variant in any_variant(),
            readable in any::<bool>(),
            writable in any::<bool>(),
            triggers in prop::collection::vec(any_trigger(), 0..24),
        ) {
            let flags = Flags { readable, writable, ..Flags::default() };
            let mut state = CompletionState::initialize(variant, &CompletionConfig::default(), &flags);

            let outcomes = triggers
                .into_iter()
                .filter_map(|trigger| state.apply(trigger))
                .count();

            prop_assert!(outcomes <= 1);
            prop_assert_eq!(outcomes == 1, state.is_settled());
        }

        #[test]
        fn prop_error_always_settles_unsettled_state(
            variant in any_variant(),
            readable in any::<bool>(),
            writable in any::<bool>(),
        ) {
            let flags = Flags { readable, writable, ..Flags::default() };
            let mut state = CompletionState::initialize(variant, &CompletionConfig::default(), &flags);
            let settled = matches!(
                state.apply(Trigger::Error(Fault::message("fault"))),
                Some(RawOutcome::Fault(_))
            );
            prop_assert!(settled);
        }
    }
}
