//! A subscriber that records every signal it receives, shared by the unit tests.

use std::mem;
use std::sync::{Arc, Mutex};

use crate::{StreamError, Subscriber, Subscription};

#[derive(Debug)]
pub(crate) enum Signal<T, E> {
    Subscribe,
    Next(T),
    Error(StreamError<E>),
    Complete,
}

/// What the subscriber does with its subscription as soon as it receives it.
#[derive(Clone, Copy, Debug)]
pub(crate) enum OnSubscribe {
    Nothing,
    Request(i64),
    Cancel,
}

pub(crate) struct RecordingSubscriber<T, E> {
    on_subscribe: OnSubscribe,

    // Released on the terminal signal so the subscription and the subscriber do not keep
    // each other alive.
    subscription: Mutex<Option<Arc<dyn Subscription>>>,

    signals: Mutex<Vec<Signal<T, E>>>,
}

impl<T, E> RecordingSubscriber<T, E> {
    pub(crate) fn new() -> Self {
        Self::with_behavior(OnSubscribe::Nothing)
    }

    pub(crate) fn with_behavior(on_subscribe: OnSubscribe) -> Self {
        Self {
            on_subscribe,
            subscription: Mutex::new(None),
            signals: Mutex::new(Vec::new()),
        }
    }

    /// Removes and returns everything recorded so far.
    pub(crate) fn take_signals(&self) -> Vec<Signal<T, E>> {
        mem::take(&mut *self.signals.lock().unwrap())
    }

    /// The subscription handed over by `on_subscribe`, unless a terminal signal released it.
    pub(crate) fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.subscription.lock().unwrap().clone()
    }

    fn record(&self, signal: Signal<T, E>) {
        self.signals.lock().unwrap().push(signal);
    }

    fn release_subscription(&self) {
        self.subscription.lock().unwrap().take();
    }
}

impl<T, E> Subscriber<T, E> for RecordingSubscriber<T, E> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.record(Signal::Subscribe);

        *self.subscription.lock().unwrap() = Some(Arc::clone(&subscription));

        // The lock is released before acting because requesting may emit synchronously.
        match self.on_subscribe {
            OnSubscribe::Nothing => {}
            OnSubscribe::Request(n) => {
                drop(subscription.request(n));
            }
            OnSubscribe::Cancel => subscription.cancel(),
        }
    }

    fn on_next(&self, value: T) {
        self.record(Signal::Next(value));
    }

    fn on_error(&self, error: StreamError<E>) {
        self.record(Signal::Error(error));
        self.release_subscription();
    }

    fn on_complete(&self) {
        self.record(Signal::Complete);
        self.release_subscription();
    }
}
