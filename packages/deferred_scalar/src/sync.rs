//! Synchronization primitives used by the subscription state machine.
//!
//! Under `cfg(loom)` these are the model-checked `loom` equivalents, so the
//! state machine can be exhaustively explored for interleaving bugs.

#[cfg(loom)]
pub(crate) use loom::sync::Mutex;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU8, Ordering};
#[cfg(not(loom))]
pub(crate) use std::sync::Mutex;
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
