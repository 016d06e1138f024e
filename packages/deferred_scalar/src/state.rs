//! Subscription state machine logic. Everything starts in the empty state, in which
//! the subscriber has not asked for anything and the producer has not offered anything.
//!
//! The following states exist:
//!
//! 0 - empty - initial state; no demand has been recorded and no value has been offered.
//! 1 - has value - the producer has offered a value but the subscriber has not requested it yet;
//!                 the value is held in the subscription until demand arrives.
//! 2 - has request - the subscriber has requested at least one element but the producer has not
//!                   offered anything yet.
//! 3 - has request has value - demand met a buffered value; whoever entered this state owns the
//!                             value and is in the process of emitting it. This state acts as a
//!                             mutex of sorts, preventing cancellation from touching the value.
//! 4 - cancelled - the subscriber cancelled before anything was emitted. Terminal.
//! 5 - done - a value or an error has been emitted (or the producer aborted). Terminal.
//!
//! Every transition is a single compare-and-set on the state word. Whoever wins the transition
//! out of a non-terminal state owns the right to act on it (emit, discard the value, etc).
//! The loser observes the new state on its next attempt and adjusts accordingly.

pub(crate) const STATE_EMPTY: u8 = 0;
pub(crate) const STATE_HAS_VALUE: u8 = 1;
pub(crate) const STATE_HAS_REQUEST: u8 = 2;
pub(crate) const STATE_HAS_REQUEST_HAS_VALUE: u8 = 3;
pub(crate) const STATE_CANCELLED: u8 = 4;
pub(crate) const STATE_DONE: u8 = 5;

/// Snapshot of the lifecycle of a [`DeferredScalarSubscription`][crate::DeferredScalarSubscription].
///
/// This is a point-in-time observation. Unless the state is terminal, it may
/// have already changed by the time the caller inspects it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SubscriptionState {
    /// Neither demand nor a value has arrived yet.
    Empty,

    /// The producer has offered a value that is waiting for demand.
    HasValue,

    /// The subscriber has requested the value but the producer has not offered it yet.
    HasRequest,

    /// Demand and value have met and the value is being emitted.
    HasRequestHasValue,

    /// The subscriber cancelled before anything was emitted.
    Cancelled,

    /// A terminal signal has been emitted or the producer aborted.
    Done,
}

impl SubscriptionState {
    /// Whether no further signals can ever be emitted in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Done)
    }

    #[cfg_attr(test, mutants::skip)] // Trivial mapping, verified indirectly by every state test.
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_EMPTY => Self::Empty,
            STATE_HAS_VALUE => Self::HasValue,
            STATE_HAS_REQUEST => Self::HasRequest,
            STATE_HAS_REQUEST_HAS_VALUE => Self::HasRequestHasValue,
            STATE_CANCELLED => Self::Cancelled,
            STATE_DONE => Self::Done,
            _ => unreachable!("unreachable subscription state: {raw}"),
        }
    }
}
