use std::sync::Arc;

use crate::{InvalidDemand, StreamError};

/// The consumer-facing handle that mediates demand and cancellation.
///
/// A subscriber receives this via [`Subscriber::on_subscribe`] and uses it to declare
/// how many elements it can accept or to lose interest in the outcome altogether.
pub trait Subscription: Send + Sync {
    /// Declares that the subscriber is ready to receive `n` more elements.
    ///
    /// If a value is already waiting, it is emitted before this call returns, on the
    /// calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDemand`] if `n` is zero or negative. The subscription is unaffected.
    fn request(&self, n: i64) -> Result<(), InvalidDemand>;

    /// Stops any future signals from reaching the subscriber.
    ///
    /// Calling this more than once has no additional effect. An emission that has already
    /// started may still complete.
    fn cancel(&self);

    /// Whether the subscription was cancelled before anything was emitted.
    fn is_cancelled(&self) -> bool;
}

/// Receives the signals of a single subscription.
///
/// The subscriber first receives [`on_subscribe`][Self::on_subscribe]. After that it
/// receives at most one of:
///
/// * [`on_next`][Self::on_next] followed by [`on_complete`][Self::on_complete].
/// * [`on_error`][Self::on_error] alone.
///
/// Nothing is received after a successful cancellation.
///
/// All methods take `&self` because signals may arrive re-entrantly: a subscriber that
/// requests from within `on_subscribe` may receive `on_next` before `on_subscribe` returns.
/// Signals may also arrive on any thread that interacts with the subscription.
///
/// A subscriber may keep its [`Subscription`] handle for as long as it likes. The subscription
/// releases the subscriber once it becomes terminal, including after a cancellation or an
/// abort that the subscriber is never told about.
pub trait Subscriber<T, E> {
    /// Hands the subscriber its subscription. Always the first signal.
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    /// Delivers the value. Always immediately followed by [`on_complete`][Self::on_complete].
    fn on_next(&self, value: T);

    /// Delivers a failure. Terminal.
    fn on_error(&self, error: StreamError<E>);

    /// Signals successful completion. Terminal.
    fn on_complete(&self);
}

impl<T, E, S> Subscriber<T, E> for Arc<S>
where
    S: Subscriber<T, E> + ?Sized,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        (**self).on_subscribe(subscription);
    }

    fn on_next(&self, value: T) {
        (**self).on_next(value);
    }

    fn on_error(&self, error: StreamError<E>) {
        (**self).on_error(error);
    }

    fn on_complete(&self) {
        (**self).on_complete();
    }
}
