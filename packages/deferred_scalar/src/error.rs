use thiserror::Error;

/// The subscriber asked for zero or a negative number of elements.
///
/// Demand must always be positive. The subscription state is left untouched, so a later valid
/// request behaves as if the invalid one had never happened.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("demand must be positive but {requested} elements were requested")]
pub struct InvalidDemand {
    requested: i64,
}

impl InvalidDemand {
    pub(crate) const fn new(requested: i64) -> Self {
        Self { requested }
    }

    /// The number of elements that was requested.
    #[must_use]
    pub const fn requested(&self) -> i64 {
        self.requested
    }
}

/// Errors delivered to a subscriber via [`Subscriber::on_error`][crate::Subscriber::on_error].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError<E> {
    /// The producer finished without producing a value.
    #[error("the computation completed without producing a value")]
    MissingValue,

    /// The computation failed with an error that was not classified as fatal.
    #[error("the computation failed")]
    Computation(#[source] E),
}

impl<E> StreamError<E> {
    /// Whether this is the [`MissingValue`][Self::MissingValue] error.
    #[must_use]
    pub const fn is_missing_value(&self) -> bool {
        matches!(self, Self::MissingValue)
    }

    /// The error raised by the computation, if that is what this error wraps.
    #[must_use]
    pub const fn computation_error(&self) -> Option<&E> {
        match self {
            Self::Computation(error) => Some(error),
            Self::MissingValue => None,
        }
    }

    /// Consumes the error, returning the error raised by the computation if there was one.
    #[must_use]
    pub fn into_computation_error(self) -> Option<E> {
        match self {
            Self::Computation(error) => Some(error),
            Self::MissingValue => None,
        }
    }
}

/// The computation failed with an error that the fatal error policy declared unrecoverable.
///
/// This is returned to whoever called [`ScalarSource::subscribe`][crate::ScalarSource::subscribe]
/// instead of being delivered to the subscriber. The subscription is terminated without any
/// signal reaching the subscriber.
#[derive(Debug, Error)]
#[error("the computation failed with an error classified as fatal")]
pub struct FatalError<E> {
    #[source]
    error: E,
}

impl<E> FatalError<E> {
    pub(crate) const fn new(error: E) -> Self {
        Self { error }
    }

    /// The error raised by the computation.
    #[must_use]
    pub const fn error(&self) -> &E {
        &self.error
    }

    /// Consumes the wrapper, returning the error raised by the computation.
    #[must_use]
    pub fn into_inner(self) -> E {
        self.error
    }
}
