//! Subscribes to a `ScalarSource` and shows that the outcome of the computation is held
//! until the subscriber asks for it, and that cancelling early skips the computation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use deferred_scalar::{Fallible, ScalarSource, StreamError, Subscriber, Subscription};

/// Prints every signal and keeps the subscription handle until a terminal signal arrives or
/// it cancels.
struct Printer {
    name: &'static str,
    cancel_immediately: bool,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

impl Printer {
    fn new(name: &'static str, cancel_immediately: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            cancel_immediately,
            subscription: Mutex::new(None),
        })
    }

    fn request(&self) {
        let subscription = self.subscription.lock().unwrap().clone();

        if let Some(subscription) = subscription {
            subscription.request(1).unwrap();
        }
    }
}

impl Subscriber<u64, String> for Printer {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        println!("[{}] subscribed", self.name);

        if self.cancel_immediately {
            println!("[{}] cancelling before the computation runs", self.name);
            subscription.cancel();
            return;
        }

        *self.subscription.lock().unwrap() = Some(subscription);
    }

    fn on_next(&self, value: u64) {
        println!("[{}] received {value}", self.name);
    }

    fn on_error(&self, error: StreamError<String>) {
        println!("[{}] failed: {error}", self.name);
        self.subscription.lock().unwrap().take();
    }

    fn on_complete(&self) {
        println!("[{}] completed", self.name);
        self.subscription.lock().unwrap().take();
    }
}

fn main() {
    let evaluations = Arc::new(AtomicUsize::new(0));

    let source = ScalarSource::new(Fallible::new({
        let evaluations = Arc::clone(&evaluations);

        move || {
            let n = evaluations.fetch_add(1, Ordering::Relaxed);
            println!("computation evaluated (evaluation #{n})");

            if n == 1 {
                Err("second evaluation is unlucky".to_string())
            } else {
                Ok(1_048_576_u64)
            }
        }
    }));

    let patient = Printer::new("patient", false);
    source.subscribe(Arc::clone(&patient)).unwrap();
    println!("nothing delivered yet; requesting now");
    patient.request();

    let unlucky = Printer::new("unlucky", false);
    source.subscribe(Arc::clone(&unlucky)).unwrap();

    let impatient = Printer::new("impatient", true);
    source.subscribe(Arc::clone(&impatient)).unwrap();

    println!(
        "computation evaluated {} times for 3 subscribers",
        evaluations.load(Ordering::Relaxed)
    );
}
