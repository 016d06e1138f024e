use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::Arc;

use tracing::trace;

use crate::sync::{AtomicBool, AtomicU8, Mutex, Ordering};
use crate::{
    ERR_POISONED_LOCK, InvalidDemand, STATE_CANCELLED, STATE_DONE, STATE_EMPTY,
    STATE_HAS_REQUEST, STATE_HAS_REQUEST_HAS_VALUE, STATE_HAS_VALUE, StreamError, Subscriber,
    Subscription, SubscriptionState,
};

/// Coordinates delivery of at most one `T` (or one error) to a subscriber, emitting only once
/// the subscriber has declared demand.
///
/// The subscriber side drives the subscription via [`request()`][Self::request] and
/// [`try_cancel()`][Self::try_cancel]. The producer side offers the outcome via
/// [`complete()`][Self::complete], [`fail()`][Self::fail] and friends. The two sides may act from
/// different threads in any order; exactly one terminal outcome results:
///
/// * the value, as `on_next` followed by `on_complete`;
/// * an error, as `on_error`;
/// * nothing, if the subscriber cancelled first or the producer aborted.
///
/// Only the first producer call has any effect. Later ones are ignored.
///
/// The subscription lets go of its subscriber as soon as it becomes terminal, whether by
/// emission, cancellation or abort. A subscriber that holds on to its [`Subscription`] handle
/// therefore does not keep itself alive through the subscription.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use deferred_scalar::{DeferredScalarSubscription, StreamError, Subscriber, Subscription};
///
/// #[derive(Default)]
/// struct Collect(Mutex<Vec<String>>);
///
/// impl Subscriber<String, ()> for Collect {
///     fn on_subscribe(&self, _subscription: Arc<dyn Subscription>) {}
///     fn on_next(&self, value: String) {
///         self.0.lock().unwrap().push(value);
///     }
///     fn on_error(&self, _error: StreamError<()>) {}
///     fn on_complete(&self) {}
/// }
///
/// let collect = Arc::new(Collect::default());
/// let subscription = DeferredScalarSubscription::<String, (), _>::new(Arc::clone(&collect));
///
/// // The value is held until there is demand for it.
/// subscription.complete("Hello".to_string());
/// assert!(collect.0.lock().unwrap().is_empty());
///
/// subscription.request(1).unwrap();
/// assert_eq!(*collect.0.lock().unwrap(), vec!["Hello".to_string()]);
///
/// // Terminal, so the subscriber has been released.
/// assert!(subscription.subscriber().is_none());
/// ```
pub struct DeferredScalarSubscription<T, E, S> {
    /// The logical state of the subscription; see constants in `state.rs`.
    state: AtomicU8,

    /// Set by the first producer-side call. Guarantees that `value` has a single writer.
    producer_claimed: AtomicBool,

    /// Written by the producer before it attempts any transition. Read (moved out) only by
    /// whoever wins the transition that takes ownership of the value:
    ///
    /// * `HAS_VALUE -> HAS_REQUEST_HAS_VALUE` (subscriber requests a buffered value);
    /// * `HAS_VALUE -> CANCELLED` (subscriber discards a buffered value);
    /// * `HAS_REQUEST -> DONE` (producer emits directly);
    /// * the producer itself, if it finds the subscription already terminal.
    ///
    /// We use `UnsafeCell` because we are a synchronization primitive and
    /// do our own synchronization of reads/writes.
    value: UnsafeCell<MaybeUninit<T>>,

    /// Emptied by whoever wins the first transition into `CANCELLED` or `DONE`. Signals are
    /// delivered through the taken `Arc`, never while the lock is held, so the subscriber may
    /// call back into the subscription.
    subscriber: Mutex<Option<Arc<S>>>,

    _error: PhantomData<fn(E)>,
}

impl<T, E, S> DeferredScalarSubscription<T, E, S> {
    /// The subscriber this subscription delivers to.
    ///
    /// Returns `None` once the subscription is terminal, because the subscriber has been
    /// released by then.
    #[must_use]
    pub fn subscriber(&self) -> Option<Arc<S>> {
        self.subscriber.lock().expect(ERR_POISONED_LOCK).clone()
    }

    /// A snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Whether the subscriber cancelled before anything was emitted.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_CANCELLED
    }

    /// Whether the subscription has reached a state from which nothing more will be emitted.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }

    /// Claims the producer side. Returns `false` if some producer call already happened.
    fn claim_producer(&self) -> bool {
        // Relaxed is enough - this only decides who may touch `value`, and all accesses
        // to `value` are ordered by the transitions on `state`.
        !self.producer_claimed.swap(true, Ordering::Relaxed)
    }

    /// Takes the subscriber out of its slot. Only the winner of the first terminal transition
    /// calls this, so it only returns `None` if that winner is not us.
    fn release_subscriber(&self) -> Option<Arc<S>> {
        self.subscriber.lock().expect(ERR_POISONED_LOCK).take()
    }

    /// # Safety
    ///
    /// The caller must have claimed the producer side and must not have stored a value yet.
    unsafe fn store_value(&self, value: T) {
        // SAFETY: Forwarding the guarantee from the caller that we are the single writer and
        // that nobody reads the field until a state transition publishes it.
        unsafe {
            self.value.get().cast::<T>().write(value);
        }
    }

    /// # Safety
    ///
    /// The caller must have won a transition that grants ownership of the stored value
    /// (see the documentation of the `value` field) and must only call this once.
    unsafe fn take_value(&self) -> T {
        // SAFETY: Forwarding the guarantee from the caller that the value is initialized and
        // that nobody else can access it anymore.
        unsafe { self.value.get().cast::<T>().read() }
    }
}

impl<T, E, S> DeferredScalarSubscription<T, E, S>
where
    S: Subscriber<T, E>,
{
    /// Creates a new subscription in the empty state that delivers to `subscriber`.
    ///
    /// The caller is responsible for handing the subscription to the subscriber
    /// via [`Subscriber::on_subscribe`].
    #[must_use]
    pub fn new(subscriber: S) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(STATE_EMPTY),
            producer_claimed: AtomicBool::new(false),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            subscriber: Mutex::new(Some(Arc::new(subscriber))),
            _error: PhantomData,
        })
    }

    /// Declares demand for the value.
    ///
    /// Only the first valid request is meaningful. If the value is already waiting, it is
    /// emitted to the subscriber before this call returns.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDemand`] if `n` is zero or negative. The subscription is unaffected.
    pub fn request(&self, n: i64) -> Result<(), InvalidDemand> {
        if n <= 0 {
            trace!(requested = n, "rejected non-positive demand");
            return Err(InvalidDemand::new(n));
        }

        let mut current = self.state.load(Ordering::Acquire);

        loop {
            match current {
                STATE_EMPTY => {
                    match self.state.compare_exchange(
                        STATE_EMPTY,
                        STATE_HAS_REQUEST,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Ok(()),
                        Err(actual) => current = actual,
                    }
                }
                STATE_HAS_VALUE => {
                    // Acquire pairs with the producer's release of `value`.
                    match self.state.compare_exchange(
                        STATE_HAS_VALUE,
                        STATE_HAS_REQUEST_HAS_VALUE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            // SAFETY: We won the HAS_VALUE -> HAS_REQUEST_HAS_VALUE transition,
                            // which makes us the owner of the value. Cancellation cannot
                            // touch it in this state and the producer never reads it again.
                            let value = unsafe { self.take_value() };

                            self.state.store(STATE_DONE, Ordering::Release);

                            self.emit_value(value);
                            return Ok(());
                        }
                        Err(actual) => current = actual,
                    }
                }
                STATE_HAS_REQUEST | STATE_HAS_REQUEST_HAS_VALUE | STATE_CANCELLED | STATE_DONE => {
                    // Demand is already recorded or nothing more will ever be emitted.
                    return Ok(());
                }
                _ => unreachable!("unreachable subscription state on request: {current}"),
            }
        }
    }

    /// Cancels the subscription, ensuring no future signals reach the subscriber.
    ///
    /// Returns `true` if this call performed the cancellation. Returns `false` if the
    /// subscription was already cancelled, or if an outcome has already been granted
    /// emission (which may still be in progress on another thread).
    ///
    /// A value that was waiting for demand is dropped.
    pub fn try_cancel(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);

        loop {
            match current {
                STATE_EMPTY | STATE_HAS_REQUEST | STATE_HAS_VALUE => {
                    match self.state.compare_exchange(
                        current,
                        STATE_CANCELLED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(previous) => {
                            if previous == STATE_HAS_VALUE {
                                // SAFETY: We won the HAS_VALUE -> CANCELLED transition, which
                                // makes us the owner of the value. Nobody takes it from the
                                // CANCELLED state.
                                drop(unsafe { self.take_value() });

                                trace!("dropped pending value on cancellation");
                            }

                            drop(self.release_subscriber());
                            return true;
                        }
                        Err(actual) => current = actual,
                    }
                }
                STATE_HAS_REQUEST_HAS_VALUE | STATE_CANCELLED | STATE_DONE => return false,
                _ => unreachable!("unreachable subscription state on cancel: {current}"),
            }
        }
    }

    /// Offers the value to the subscriber.
    ///
    /// If demand is already recorded, the value is emitted before this call returns, on the
    /// calling thread. Otherwise it is held until the subscriber requests it.
    ///
    /// Ignored if a producer-side call has already been made. The value is dropped if the
    /// subscription is cancelled.
    pub fn complete(&self, value: T) {
        if !self.claim_producer() {
            trace!("ignored completion after the outcome was already offered");
            return;
        }

        // We can start by storing the value - whichever path we take below, the value is
        // read back out by exactly one party that wins a transition.
        //
        // SAFETY: We just claimed the producer side, so we are the only writer, and no reader
        // touches the field before we publish it via the HAS_VALUE state below.
        unsafe {
            self.store_value(value);
        }

        let mut current = self.state.load(Ordering::Acquire);

        loop {
            match current {
                STATE_EMPTY => {
                    // Release publishes `value` to whoever later requests or cancels.
                    match self.state.compare_exchange(
                        STATE_EMPTY,
                        STATE_HAS_VALUE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return,
                        Err(actual) => current = actual,
                    }
                }
                STATE_HAS_REQUEST => {
                    match self.state.compare_exchange(
                        STATE_HAS_REQUEST,
                        STATE_DONE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            // SAFETY: We stored the value and never published it, so it is
                            // still ours, and we just made sure nobody else ever will.
                            let value = unsafe { self.take_value() };

                            self.emit_value(value);
                            return;
                        }
                        Err(actual) => current = actual,
                    }
                }
                STATE_CANCELLED | STATE_DONE => {
                    // SAFETY: We stored the value and never published it, so it is still ours.
                    drop(unsafe { self.take_value() });

                    trace!("dropped value offered to a terminated subscription");
                    return;
                }
                _ => {
                    // HAS_VALUE and HAS_REQUEST_HAS_VALUE are only reachable via a producer
                    // call and we are the only producer call that got through.
                    unreachable!("unreachable subscription state on complete: {current}")
                }
            }
        }
    }

    /// Offers an optional value, treating `None` as
    /// [`StreamError::MissingValue`].
    pub fn complete_optional(&self, value: Option<T>) {
        match value {
            Some(value) => self.complete(value),
            None => self.fail_with(StreamError::MissingValue),
        }
    }

    /// Offers an error raised by the computation, delivered as [`StreamError::Computation`].
    ///
    /// See [`fail_with()`][Self::fail_with].
    pub fn fail(&self, error: E) {
        self.fail_with(StreamError::Computation(error));
    }

    /// Offers an error to the subscriber.
    ///
    /// Errors do not wait for demand - unless the subscription is cancelled, the error is
    /// emitted before this call returns, on the calling thread.
    ///
    /// Ignored if a producer-side call has already been made. The error is dropped if the
    /// subscription is cancelled.
    pub fn fail_with(&self, error: StreamError<E>) {
        if !self.claim_producer() {
            trace!("ignored failure after the outcome was already offered");
            return;
        }

        let mut current = self.state.load(Ordering::Acquire);

        loop {
            match current {
                STATE_EMPTY | STATE_HAS_REQUEST => {
                    match self.state.compare_exchange(
                        current,
                        STATE_DONE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            if let Some(subscriber) = self.release_subscriber() {
                                Self::deliver_error(&subscriber, error);
                            }
                            return;
                        }
                        Err(actual) => current = actual,
                    }
                }
                STATE_CANCELLED | STATE_DONE => {
                    trace!("dropped error offered to a terminated subscription");
                    return;
                }
                _ => unreachable!("unreachable subscription state on fail: {current}"),
            }
        }
    }

    /// Terminates the subscription without emitting anything to the subscriber.
    ///
    /// This is what happens when the producer cannot produce an outcome that is fit for
    /// delivery (e.g. the computation failed fatally). The subscriber is released all the
    /// same. Ignored if a producer-side call has already been made.
    pub fn abort(&self) {
        if !self.claim_producer() {
            trace!("ignored abort after the outcome was already offered");
            return;
        }

        let mut current = self.state.load(Ordering::Acquire);

        loop {
            match current {
                STATE_EMPTY | STATE_HAS_REQUEST => {
                    match self.state.compare_exchange(
                        current,
                        STATE_DONE,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            drop(self.release_subscriber());
                            return;
                        }
                        Err(actual) => current = actual,
                    }
                }
                STATE_CANCELLED | STATE_DONE => return,
                _ => unreachable!("unreachable subscription state on abort: {current}"),
            }
        }
    }

    fn emit_value(&self, value: T) {
        if let Some(subscriber) = self.release_subscriber() {
            Self::deliver_value(&subscriber, value);
        }
    }

    fn deliver_value(subscriber: &S, value: T) {
        subscriber.on_next(value);
        subscriber.on_complete();
    }

    fn deliver_error(subscriber: &S, error: StreamError<E>) {
        subscriber.on_error(error);
    }
}

impl<T, E, S> Subscription for DeferredScalarSubscription<T, E, S>
where
    T: Send,
    S: Subscriber<T, E> + Send + Sync,
{
    fn request(&self, n: i64) -> Result<(), InvalidDemand> {
        Self::request(self, n)
    }

    fn cancel(&self) {
        self.try_cancel();
    }

    fn is_cancelled(&self) -> bool {
        Self::is_cancelled(self)
    }
}

impl<T, E, S> Drop for DeferredScalarSubscription<T, E, S> {
    fn drop(&mut self) {
        // HAS_REQUEST_HAS_VALUE cannot be observed here because the emitting party
        // holds a reference to us until it has moved on to DONE.
        if self.state.load(Ordering::Acquire) == STATE_HAS_VALUE {
            // SAFETY: We are the last reference and the value was offered but never claimed.
            drop(unsafe { self.take_value() });
        }
    }
}

impl<T, E, S> fmt::Debug for DeferredScalarSubscription<T, E, S> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredScalarSubscription")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// SAFETY: The value is only ever moved between threads, never shared, and every access to it is
// serialized by the state word. The subscriber is invoked from whichever thread wins a transition
// and is released from whichever thread terminates the subscription, so it must be Send + Sync.
// Errors are emitted on the thread that offered them and never stored.
unsafe impl<T, E, S> Send for DeferredScalarSubscription<T, E, S>
where
    T: Send,
    S: Send + Sync,
{
}

// SAFETY: See the `Send` impl above. Shared references only allow operations that synchronize
// via the state word.
unsafe impl<T, E, S> Sync for DeferredScalarSubscription<T, E, S>
where
    T: Send,
    S: Send + Sync,
{
}

#[cfg(all(test, not(loom)))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::rc::Rc;
    use std::sync::Weak;
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};

    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use testing::{race, with_watchdog};

    use super::*;
    use crate::test_subscriber::{RecordingSubscriber, Signal};

    type TestSubscription<T> =
        DeferredScalarSubscription<T, &'static str, Arc<RecordingSubscriber<T, &'static str>>>;

    assert_impl_all!(TestSubscription<u32>: Send, Sync, Subscription);
    assert_not_impl_any!(
        DeferredScalarSubscription<Rc<u32>, (), Arc<RecordingSubscriber<Rc<u32>, ()>>>: Send, Sync
    );

    fn subscription<T>() -> (
        Arc<TestSubscription<T>>,
        Arc<RecordingSubscriber<T, &'static str>>,
    ) {
        let subscriber = Arc::new(RecordingSubscriber::new());
        (
            DeferredScalarSubscription::new(Arc::clone(&subscriber)),
            subscriber,
        )
    }

    /// Like `subscription()` but the subscription holds the only strong reference to the
    /// subscriber, so the `Weak` shows whether the subscription still retains it.
    fn released_subscription<T>() -> (
        Arc<TestSubscription<T>>,
        Weak<RecordingSubscriber<T, &'static str>>,
    ) {
        let subscriber = Arc::new(RecordingSubscriber::new());
        let weak = Arc::downgrade(&subscriber);
        (DeferredScalarSubscription::new(subscriber), weak)
    }

    /// Counts how many times any of its clones have been dropped.
    #[derive(Debug)]
    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, StdOrdering::Relaxed);
        }
    }

    #[test]
    fn request_then_complete_emits_value() {
        let (subscription, subscriber) = subscription();

        subscription.request(1).unwrap();
        assert_eq!(subscription.state(), SubscriptionState::HasRequest);
        assert!(subscriber.take_signals().is_empty());

        subscription.complete("x");

        assert!(matches!(
            subscriber.take_signals().as_slice(),
            [Signal::Next("x"), Signal::Complete]
        ));
        assert_eq!(subscription.state(), SubscriptionState::Done);
    }

    #[test]
    fn complete_then_request_emits_value() {
        let (subscription, subscriber) = subscription();

        subscription.complete("x");
        assert_eq!(subscription.state(), SubscriptionState::HasValue);
        assert!(subscriber.take_signals().is_empty());

        subscription.request(1).unwrap();

        assert!(matches!(
            subscriber.take_signals().as_slice(),
            [Signal::Next("x"), Signal::Complete]
        ));
        assert_eq!(subscription.state(), SubscriptionState::Done);
    }

    #[test]
    fn large_request_behaves_like_single() {
        let (subscription, subscriber) = subscription();

        subscription.request(i64::MAX).unwrap();
        subscription.complete(5_u64);

        assert!(matches!(
            subscriber.take_signals().as_slice(),
            [Signal::Next(5), Signal::Complete]
        ));
    }

    #[test]
    fn repeated_request_emits_once() {
        let (subscription, subscriber) = subscription();

        subscription.request(1).unwrap();
        subscription.request(1).unwrap();
        subscription.complete(1_u8);
        subscription.request(3).unwrap();

        assert_eq!(subscriber.take_signals().len(), 2);
    }

    #[test]
    fn missing_value_emits_error() {
        let (subscription, subscriber) = subscription::<u8>();

        subscription.request(1).unwrap();
        subscription.complete_optional(None);

        assert!(matches!(
            subscriber.take_signals().as_slice(),
            [Signal::Error(StreamError::MissingValue)]
        ));
    }

    #[test]
    fn present_optional_value_is_emitted() {
        let (subscription, subscriber) = subscription();

        subscription.complete_optional(Some(9_i32));
        subscription.request(1).unwrap();

        assert!(matches!(
            subscriber.take_signals().as_slice(),
            [Signal::Next(9), Signal::Complete]
        ));
    }

    #[test]
    fn fail_emits_without_demand() {
        let (subscription, subscriber) = subscription::<u8>();

        subscription.fail("boom");

        assert!(matches!(
            subscriber.take_signals().as_slice(),
            [Signal::Error(StreamError::Computation("boom"))]
        ));
        assert_eq!(subscription.state(), SubscriptionState::Done);
    }

    #[test]
    fn fail_after_request_emits_error() {
        let (subscription, subscriber) = subscription::<u8>();

        subscription.request(1).unwrap();
        subscription.fail("boom");

        assert!(matches!(
            subscriber.take_signals().as_slice(),
            [Signal::Error(StreamError::Computation("boom"))]
        ));
    }

    #[test]
    fn invalid_demand_is_rejected_without_state_change() {
        let (subscription, subscriber) = subscription();

        assert_eq!(subscription.request(0).unwrap_err().requested(), 0);
        assert_eq!(subscription.request(-1).unwrap_err().requested(), -1);
        assert_eq!(subscription.state(), SubscriptionState::Empty);

        subscription.complete("x");

        assert!(subscription.request(0).is_err());
        assert_eq!(subscription.state(), SubscriptionState::HasValue);
        assert!(subscriber.take_signals().is_empty());

        subscription.request(1).unwrap();

        assert!(matches!(
            subscriber.take_signals().as_slice(),
            [Signal::Next("x"), Signal::Complete]
        ));
    }

    #[test]
    fn cancel_is_idempotent() {
        let (subscription, subscriber) = subscription::<u8>();

        assert!(subscription.try_cancel());
        assert!(!subscription.try_cancel());
        Subscription::cancel(&*subscription);

        assert!(subscription.is_cancelled());
        assert!(subscription.is_terminated());
        assert!(subscriber.take_signals().is_empty());
    }

    #[test]
    fn cancel_after_request_prevents_emission() {
        let (subscription, subscriber) = subscription();

        subscription.request(1).unwrap();
        assert!(subscription.try_cancel());
        subscription.complete("x");

        assert!(subscriber.take_signals().is_empty());
        assert!(subscription.is_cancelled());
    }

    #[test]
    fn cancel_discards_pending_value() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (subscription, subscriber) = subscription();

        subscription.complete(Tracked(Arc::clone(&drops)));
        assert_eq!(drops.load(StdOrdering::Relaxed), 0);

        assert!(subscription.try_cancel());
        assert_eq!(drops.load(StdOrdering::Relaxed), 1);

        subscription.request(1).unwrap();
        assert!(subscriber.take_signals().is_empty());

        drop(subscription);
        assert_eq!(drops.load(StdOrdering::Relaxed), 1);
    }

    #[test]
    fn value_offered_after_cancel_is_dropped() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (subscription, subscriber) = subscription();

        subscription.try_cancel();
        subscription.complete(Tracked(Arc::clone(&drops)));

        assert_eq!(drops.load(StdOrdering::Relaxed), 1);
        assert!(subscriber.take_signals().is_empty());
    }

    #[test]
    fn error_offered_after_cancel_is_dropped() {
        let (subscription, subscriber) = subscription::<u8>();

        subscription.try_cancel();
        subscription.fail("boom");

        assert!(subscriber.take_signals().is_empty());
        assert!(subscription.is_cancelled());
    }

    #[test]
    fn cancel_after_emission_has_no_effect() {
        let (subscription, subscriber) = subscription();

        subscription.request(1).unwrap();
        subscription.complete(1_u8);

        assert!(!subscription.try_cancel());
        assert!(!subscription.is_cancelled());
        assert_eq!(subscription.state(), SubscriptionState::Done);
        assert_eq!(subscriber.take_signals().len(), 2);
    }

    #[test]
    fn only_first_producer_call_counts() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (subscription, subscriber) = subscription();

        subscription.complete(Tracked(Arc::clone(&drops)));
        subscription.complete(Tracked(Arc::clone(&drops)));
        // The rejected value is dropped right away.
        assert_eq!(drops.load(StdOrdering::Relaxed), 1);

        subscription.fail("late");
        subscription.complete_optional(None);
        subscription.abort();
        assert_eq!(subscription.state(), SubscriptionState::HasValue);

        subscription.request(1).unwrap();

        let signals = subscriber.take_signals();
        assert!(matches!(
            signals.as_slice(),
            [Signal::Next(_), Signal::Complete]
        ));
    }

    #[test]
    fn failure_cannot_be_followed_by_value() {
        let (subscription, subscriber) = subscription();

        subscription.fail("boom");
        subscription.complete("x");
        subscription.request(1).unwrap();

        assert!(matches!(
            subscriber.take_signals().as_slice(),
            [Signal::Error(StreamError::Computation("boom"))]
        ));
    }

    #[test]
    fn abort_terminates_silently() {
        let (subscription, subscriber) = subscription::<u8>();

        subscription.request(1).unwrap();
        subscription.abort();

        assert_eq!(subscription.state(), SubscriptionState::Done);
        assert!(!subscription.is_cancelled());
        assert!(!subscription.try_cancel());
        assert!(subscriber.take_signals().is_empty());
    }

    #[test]
    fn abort_after_cancel_stays_cancelled() {
        let (subscription, _subscriber) = subscription::<u8>();

        subscription.try_cancel();
        subscription.abort();

        assert_eq!(subscription.state(), SubscriptionState::Cancelled);
    }

    #[test]
    fn drop_releases_pending_value() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (subscription, _subscriber) = subscription();

        subscription.complete(Tracked(Arc::clone(&drops)));
        assert_eq!(drops.load(StdOrdering::Relaxed), 0);

        drop(subscription);
        assert_eq!(drops.load(StdOrdering::Relaxed), 1);
    }

    #[test]
    fn emitted_value_is_not_dropped_again() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (subscription, subscriber) = subscription();

        subscription.complete(Tracked(Arc::clone(&drops)));
        subscription.request(1).unwrap();
        drop(subscription);

        // Still held by the subscriber.
        assert_eq!(drops.load(StdOrdering::Relaxed), 0);

        drop(subscriber);
        assert_eq!(drops.load(StdOrdering::Relaxed), 1);
    }

    #[test]
    fn debug_shows_state() {
        let (subscription, _subscriber) = subscription::<u8>();

        let output = format!("{subscription:?}");
        assert!(output.contains("Empty"));
    }

    #[test]
    fn subscriber_is_retained_until_emission() {
        let (subscription, subscriber) = released_subscription::<u8>();

        subscription.request(1).unwrap();
        assert!(subscriber.upgrade().is_some());
        assert!(subscription.subscriber().is_some());

        subscription.complete(1);

        assert!(subscriber.upgrade().is_none());
        assert!(subscription.subscriber().is_none());
    }

    #[test]
    fn emitting_buffered_value_releases_subscriber() {
        let (subscription, subscriber) = released_subscription::<u8>();

        subscription.complete(1);
        assert!(subscriber.upgrade().is_some());

        subscription.request(1).unwrap();

        assert!(subscriber.upgrade().is_none());
    }

    #[test]
    fn cancel_releases_subscriber() {
        let (subscription, subscriber) = released_subscription::<u8>();

        subscription.complete(1);
        assert!(subscription.try_cancel());

        assert!(subscriber.upgrade().is_none());
        assert!(subscription.subscriber().is_none());
    }

    #[test]
    fn fail_releases_subscriber() {
        let (subscription, subscriber) = released_subscription::<u8>();

        subscription.fail("boom");

        assert!(subscriber.upgrade().is_none());
    }

    #[test]
    fn abort_releases_subscriber() {
        let (subscription, subscriber) = released_subscription::<u8>();

        subscription.request(1).unwrap();
        subscription.abort();

        assert!(subscriber.upgrade().is_none());
        assert!(subscription.subscriber().is_none());
    }

    #[test]
    fn subscriber_holding_its_handle_is_freed_after_abort() {
        let (subscription, subscriber) = released_subscription::<u8>();

        // The subscriber keeps its handle, as subscribers normally do.
        let handle = Arc::clone(&subscription);
        subscriber.upgrade().unwrap().on_subscribe(handle);

        let weak_subscription = Arc::downgrade(&subscription);
        subscription.abort();
        drop(subscription);

        assert!(subscriber.upgrade().is_none());
        assert!(weak_subscription.upgrade().is_none());
    }

    #[test]
    fn request_complete_cancel_race_emits_at_most_once() {
        with_watchdog(|| {
            for _ in 0..500 {
                let (subscription, subscriber) = subscription();

                let cancelled = race(3, |participant| match participant {
                    0 => {
                        subscription.request(1).unwrap();
                        false
                    }
                    1 => {
                        subscription.complete(42_u32);
                        false
                    }
                    _ => subscription.try_cancel(),
                });

                let signals = subscriber.take_signals();

                if cancelled.contains(&true) {
                    assert!(signals.is_empty());
                    assert!(subscription.is_cancelled());
                } else {
                    assert!(matches!(
                        signals.as_slice(),
                        [Signal::Next(42), Signal::Complete]
                    ));
                    assert_eq!(subscription.state(), SubscriptionState::Done);
                }
            }
        });
    }

    #[test]
    fn fail_cancel_race_emits_at_most_once() {
        with_watchdog(|| {
            for _ in 0..500 {
                let (subscription, subscriber) = subscription::<u32>();

                let cancelled = race(2, |participant| {
                    if participant == 0 {
                        subscription.fail("boom");
                        false
                    } else {
                        subscription.try_cancel()
                    }
                });

                let signals = subscriber.take_signals();

                if cancelled.contains(&true) {
                    assert!(signals.is_empty());
                } else {
                    assert!(matches!(
                        signals.as_slice(),
                        [Signal::Error(StreamError::Computation("boom"))]
                    ));
                }
            }
        });
    }

    #[test]
    fn concurrent_requests_emit_buffered_value_once() {
        with_watchdog(|| {
            for _ in 0..500 {
                let (subscription, subscriber) = subscription();

                subscription.complete(7_u16);

                let requests = race(4, |_| subscription.request(1));
                assert!(requests.iter().all(Result::is_ok));

                assert!(matches!(
                    subscriber.take_signals().as_slice(),
                    [Signal::Next(7), Signal::Complete]
                ));
            }
        });
    }
}
