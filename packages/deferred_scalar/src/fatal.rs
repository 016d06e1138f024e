/// Decides whether an error raised by a computation is too severe to be delivered to
/// a subscriber as a regular stream error.
///
/// Errors classified as fatal bypass the subscriber and are handed back to whoever
/// called [`ScalarSource::subscribe`][crate::ScalarSource::subscribe], wrapped in a
/// [`FatalError`][crate::FatalError].
///
/// Any `Fn(&E) -> bool` closure is a policy.
///
/// # Example
///
/// ```
/// use std::io;
///
/// use deferred_scalar::FatalErrorPolicy;
///
/// let out_of_memory = |error: &io::Error| error.kind() == io::ErrorKind::OutOfMemory;
///
/// assert!(out_of_memory.is_fatal(&io::Error::from(io::ErrorKind::OutOfMemory)));
/// assert!(!out_of_memory.is_fatal(&io::Error::from(io::ErrorKind::NotFound)));
/// ```
pub trait FatalErrorPolicy<E> {
    /// Returns `true` if `error` must be returned to the caller instead of the subscriber.
    fn is_fatal(&self, error: &E) -> bool;
}

impl<E, F> FatalErrorPolicy<E> for F
where
    F: Fn(&E) -> bool,
{
    fn is_fatal(&self, error: &E) -> bool {
        self(error)
    }
}

/// Policy that delivers every error to the subscriber.
///
/// This is the policy used by [`ScalarSource::new`][crate::ScalarSource::new].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
pub struct NeverFatal;

impl<E> FatalErrorPolicy<E> for NeverFatal {
    fn is_fatal(&self, _error: &E) -> bool {
        false
    }
}
