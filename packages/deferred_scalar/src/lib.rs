#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Single-value subscriptions that deliver the outcome of a fallible computation to a
//! consumer only once the consumer has asked for it.
//!
//! This is the bridge between code that produces one outcome on demand and consumers that
//! follow a request/cancel protocol: the outcome is computed eagerly but only handed over once
//! the consumer has asked for it.
//!
//! The consumer ([`Subscriber`]) receives a [`Subscription`] handle through which it declares
//! demand or cancels. The producer offers a value or an error. The two sides may act in any
//! order and from any thread; the subscriber observes exactly one of:
//!
//! * `on_next(value)` followed by `on_complete()`;
//! * `on_error(error)`;
//! * nothing at all, if it cancelled first.
//!
//! Two building blocks are provided:
//!
//! * [`DeferredScalarSubscription`] - the lock-free state machine that reconciles demand,
//!   cancellation and the producer's outcome. Use it directly to build your own producers.
//! * [`ScalarSource`] - evaluates a [`Computation`] once per subscriber and feeds the outcome
//!   into a fresh [`DeferredScalarSubscription`].
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use deferred_scalar::{ScalarSource, StreamError, Subscriber, Subscription};
//!
//! #[derive(Default)]
//! struct Collect {
//!     subscription: Mutex<Option<Arc<dyn Subscription>>>,
//!     received: Mutex<Option<String>>,
//! }
//!
//! impl Subscriber<String, String> for Collect {
//!     fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
//!         *self.subscription.lock().unwrap() = Some(subscription);
//!     }
//!
//!     fn on_next(&self, value: String) {
//!         *self.received.lock().unwrap() = Some(value);
//!     }
//!
//!     fn on_error(&self, error: StreamError<String>) {
//!         panic!("unexpected error: {error}");
//!     }
//!
//!     fn on_complete(&self) {
//!         // Release the handle so the subscription can be dropped.
//!         self.subscription.lock().unwrap().take();
//!     }
//! }
//!
//! let source = ScalarSource::new(|| Ok::<_, String>(Some("Hello, world!".to_string())));
//!
//! let subscriber = Arc::new(Collect::default());
//! source.subscribe(Arc::clone(&subscriber)).unwrap();
//!
//! // The computation has run but nothing is delivered until there is demand.
//! assert!(subscriber.received.lock().unwrap().is_none());
//!
//! let subscription = subscriber.subscription.lock().unwrap().clone().unwrap();
//! subscription.request(1).unwrap();
//!
//! assert_eq!(
//!     subscriber.received.lock().unwrap().as_deref(),
//!     Some("Hello, world!")
//! );
//! ```
//!
//! # Fatal errors
//!
//! By default every error raised by the computation is delivered to the subscriber. A
//! [`FatalErrorPolicy`] can single out errors that must instead be returned to whoever called
//! [`ScalarSource::subscribe`], as a [`FatalError`]. The subscriber receives nothing in that case.

const ERR_POISONED_LOCK: &str = "encountered poisoned lock - program validity cannot be guaranteed";

mod computation;
mod error;
mod fatal;
mod source;
mod state;
mod subscriber;
mod subscription;
mod sync;

#[cfg(all(test, not(loom)))]
mod test_subscriber;

pub use computation::*;
pub use error::*;
pub use fatal::*;
pub use source::*;
pub use state::*;
pub use subscriber::*;
pub use subscription::*;
