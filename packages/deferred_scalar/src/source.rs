use std::fmt;
use std::sync::Arc;

use scopeguard::ScopeGuard;
use tracing::{debug, trace};

use crate::{
    Computation, DeferredScalarSubscription, FatalError, FatalErrorPolicy, NeverFatal,
    StreamError, Subscriber,
};

/// Evaluates a [`Computation`] for each subscriber and delivers its outcome as a single value.
///
/// Each call to [`subscribe()`][Self::subscribe] creates an independent subscription and, unless
/// the subscriber cancels while being subscribed, evaluates the computation exactly once. The
/// outcome is held by the subscription until the subscriber requests it.
///
/// The source itself keeps no per-subscription state and can be shared freely.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use deferred_scalar::{Fallible, ScalarSource, StreamError, Subscriber, Subscription};
///
/// #[derive(Default)]
/// struct Print(Mutex<Vec<String>>);
///
/// impl Subscriber<u32, std::num::ParseIntError> for Print {
///     fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
///         subscription.request(1).unwrap();
///     }
///     fn on_next(&self, value: u32) {
///         self.0.lock().unwrap().push(format!("next {value}"));
///     }
///     fn on_error(&self, error: StreamError<std::num::ParseIntError>) {
///         self.0.lock().unwrap().push(format!("error {error}"));
///     }
///     fn on_complete(&self) {
///         self.0.lock().unwrap().push("complete".to_string());
///     }
/// }
///
/// let source = ScalarSource::new(Fallible::new(|| "42".parse::<u32>()));
///
/// let subscriber = Arc::new(Print::default());
/// source.subscribe(Arc::clone(&subscriber)).unwrap();
///
/// assert_eq!(*subscriber.0.lock().unwrap(), vec!["next 42", "complete"]);
/// ```
#[derive(Clone)]
pub struct ScalarSource<C, P = NeverFatal> {
    computation: C,
    fatal_policy: P,
}

impl<C> ScalarSource<C>
where
    C: Computation,
{
    /// Creates a source that delivers every error raised by the computation to the subscriber.
    #[must_use]
    pub const fn new(computation: C) -> Self {
        Self {
            computation,
            fatal_policy: NeverFatal,
        }
    }
}

impl<C, P> ScalarSource<C, P>
where
    C: Computation,
    P: FatalErrorPolicy<C::Error>,
{
    /// Creates a source that consults `fatal_policy` for every error raised by the computation.
    ///
    /// Errors the policy considers fatal are returned from [`subscribe()`][Self::subscribe]
    /// instead of being delivered to the subscriber.
    #[must_use]
    pub const fn with_fatal_policy(computation: C, fatal_policy: P) -> Self {
        Self {
            computation,
            fatal_policy,
        }
    }

    /// The computation evaluated for each subscriber.
    #[must_use]
    pub const fn computation(&self) -> &C {
        &self.computation
    }

    /// Subscribes a subscriber, evaluating the computation on the calling thread.
    ///
    /// The subscriber receives its subscription via [`Subscriber::on_subscribe`] before the
    /// computation is evaluated. If it cancels from within that call, the computation is never
    /// evaluated.
    ///
    /// If the computation or the fatal error policy panics, the subscription is terminated
    /// without notifying the subscriber and the panic continues to unwind into the caller.
    ///
    /// # Errors
    ///
    /// Returns [`FatalError`] if the computation failed with an error that the fatal error
    /// policy considers fatal. The subscriber receives no signal in that case.
    pub fn subscribe<S>(&self, subscriber: S) -> Result<(), FatalError<C::Error>>
    where
        S: Subscriber<C::Output, C::Error> + Send + Sync + 'static,
        C::Output: Send + 'static,
        C::Error: 'static,
    {
        let subscription =
            DeferredScalarSubscription::<C::Output, C::Error, S>::new(subscriber);

        // We hold our own reference because the subscriber may cancel from within
        // `on_subscribe`, which releases it from the subscription.
        if let Some(subscriber) = subscription.subscriber() {
            let handle = Arc::clone(&subscription);
            Subscriber::<C::Output, C::Error>::on_subscribe(&*subscriber, handle);
        }

        if subscription.is_cancelled() {
            trace!("subscriber cancelled during subscribe; skipping the computation");
            return Ok(());
        }

        // If the computation or the fatal error policy panics, nothing may ever be emitted
        // for this subscription.
        let abort_on_panic = scopeguard::guard(&subscription, |subscription| {
            subscription.abort();
        });

        let outcome = self.computation.compute();
        let fatal = matches!(&outcome, Err(error) if self.fatal_policy.is_fatal(error));

        // Disarm the guard since the outcome is fully classified.
        ScopeGuard::into_inner(abort_on_panic);

        match outcome {
            Ok(Some(value)) => subscription.complete(value),
            Ok(None) => subscription.fail_with(StreamError::MissingValue),
            Err(error) if fatal => {
                debug!("computation failed with a fatal error; bypassing the subscriber");

                subscription.abort();
                return Err(FatalError::new(error));
            }
            Err(error) => subscription.fail(error),
        }

        Ok(())
    }
}

impl<C, P> fmt::Debug for ScalarSource<C, P> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarSource").finish_non_exhaustive()
    }
}
