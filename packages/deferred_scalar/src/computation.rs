use std::convert::Infallible;
use std::fmt;

/// A zero-argument operation that produces at most one value or fails.
///
/// A [`ScalarSource`][crate::ScalarSource] evaluates its computation once for every
/// subscription that is still active after the subscriber has been handed its subscription.
///
/// `Ok(None)` means the computation finished without producing a value. The subscriber
/// receives [`StreamError::MissingValue`][crate::StreamError::MissingValue] in that case.
///
/// Any `Fn() -> Result<Option<T>, E>` closure is a computation. For closures with a
/// different shape, see [`Fallible`] and [`Supplied`].
pub trait Computation {
    /// The value produced on success.
    type Output;

    /// The error raised on failure.
    type Error;

    /// Runs the computation.
    ///
    /// # Errors
    ///
    /// Returns whatever error the underlying operation raised.
    fn compute(&self) -> Result<Option<Self::Output>, Self::Error>;
}

impl<F, T, E> Computation for F
where
    F: Fn() -> Result<Option<T>, E>,
{
    type Output = T;
    type Error = E;

    fn compute(&self) -> Result<Option<T>, E> {
        self()
    }
}

/// Adapts a `Fn() -> Result<T, E>` closure that always produces a value when it succeeds.
///
/// # Example
///
/// ```
/// use deferred_scalar::{Computation, Fallible};
///
/// let parse = Fallible::new(|| "42".parse::<u32>());
///
/// assert_eq!(parse.compute(), Ok(Some(42)));
/// ```
#[derive(Clone, Copy)]
pub struct Fallible<F> {
    f: F,
}

impl<F> Fallible<F> {
    /// Wraps the closure.
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, T, E> Computation for Fallible<F>
where
    F: Fn() -> Result<T, E>,
{
    type Output = T;
    type Error = E;

    fn compute(&self) -> Result<Option<T>, E> {
        (self.f)().map(Some)
    }
}

impl<F> fmt::Debug for Fallible<F> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallible").finish_non_exhaustive()
    }
}

/// Adapts a `Fn() -> T` closure that can neither fail nor come up empty.
///
/// # Example
///
/// ```
/// use deferred_scalar::{Computation, Supplied};
///
/// let answer = Supplied::new(|| 42);
///
/// assert_eq!(answer.compute(), Ok(Some(42)));
/// ```
#[derive(Clone, Copy)]
pub struct Supplied<F> {
    f: F,
}

impl<F> Supplied<F> {
    /// Wraps the closure.
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, T> Computation for Supplied<F>
where
    F: Fn() -> T,
{
    type Output = T;
    type Error = Infallible;

    fn compute(&self) -> Result<Option<T>, Infallible> {
        Ok(Some((self.f)()))
    }
}

impl<F> fmt::Debug for Supplied<F> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supplied").finish_non_exhaustive()
    }
}
