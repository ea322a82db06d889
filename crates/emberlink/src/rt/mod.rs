// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Runtime primitives generic over an injected runtime.
//!
//! The [`Runtime`] capability declares thread spawning, time operations and
//! a CPU-count query; everything else here (mutex, semaphore, event group,
//! [`WaitGroup`]) is built on top of it with `parking_lot` backing.
//!
//! All primitives are safe for use from any task. ISR-safe variants are
//! annotated (`signal_from_isr`). Cancellation is cooperative: a task
//! observes its [`Cancel`] token at natural pauses; primitives never raise
//! cancellation themselves.

mod cancel;
mod event_group;
mod mutex;
mod runtime;
mod semaphore;
mod waitgroup;

pub use cancel::Cancel;
pub use event_group::{EventGroup, WaitMode};
pub use mutex::{Mutex, MutexGuard};
pub use runtime::{Rt, Runtime, RuntimeCap, StdRuntime, StdThread, Thread};
pub use semaphore::Semaphore;
pub use waitgroup::WaitGroup;

/// Condition variable; pairs with [`Mutex`]'s guards.
pub use parking_lot::Condvar;

use std::fmt;

/// Errors from runtime primitives.
#[derive(Debug)]
pub enum RtError {
    /// Thread spawn failed (resource exhaustion).
    SpawnFailed(String),

    /// A joined task panicked.
    TaskPanicked,

    /// A timed wait expired.
    Timeout,
}

impl fmt::Display for RtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(msg) => write!(f, "thread spawn failed: {}", msg),
            Self::TaskPanicked => write!(f, "joined task panicked"),
            Self::Timeout => write!(f, "wait timed out"),
        }
    }
}

impl std::error::Error for RtError {}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, RtError>;
