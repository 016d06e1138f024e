#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in the workspace packages.

use std::sync::{Barrier, mpsc};
use std::thread;
use std::time::Duration;
use std::{env, panic};

/// Runs a test with a timeout to prevent infinite hangs.
///
/// A subscription that loses a wake-up or spins on a state it can never leave shows up as a
/// hang, not as a failure. This turns such a hang into a test failure.
///
/// The timeout is 10 seconds under normal conditions and 60 seconds under
/// Miri, where thread synchronization primitives are significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog
/// is disabled and the test function is executed directly. This allows mutation
/// testing to properly detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode).
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     // Your test code here
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded the {timeout:?} timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected unexpectedly"),
            Err(e) => panic::resume_unwind(e),
        },
    }
}

/// Runs `f` on `participants` threads at once, passing each its index, and returns the results
/// in index order.
///
/// All threads wait on a barrier before calling `f`, so the calls overlap as closely as the
/// scheduler allows. Use this to provoke races between the two sides of a synchronization
/// primitive.
///
/// # Panics
///
/// If any participant panics, the panic is propagated to the caller.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use testing::race;
///
/// let counter = AtomicUsize::new(0);
///
/// let seen = race(4, |_| counter.fetch_add(1, Ordering::Relaxed));
///
/// let mut seen = seen;
/// seen.sort_unstable();
/// assert_eq!(seen, vec![0, 1, 2, 3]);
/// ```
pub fn race<F, R>(participants: usize, f: F) -> Vec<R>
where
    F: Fn(usize) -> R + Sync,
    R: Send,
{
    let barrier = Barrier::new(participants);

    thread::scope(|s| {
        let handles = (0..participants)
            .map(|index| {
                let barrier = &barrier;
                let f = &f;

                s.spawn(move || {
                    barrier.wait();
                    f(index)
                })
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(e) => panic::resume_unwind(e),
            })
            .collect()
    })
}
