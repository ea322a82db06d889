// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! The `Runtime` capability: threads, time and CPU topology.

use super::{Result, RtError};
use crate::cap::{Cap, Contract};
use std::time::{Duration, Instant};

/// A joinable task handle returned by [`Runtime::spawn`].
pub trait Thread: Send {
    /// Block until the task completes.
    ///
    /// # Errors
    ///
    /// [`RtError::TaskPanicked`] if the task panicked.
    fn join(self) -> Result<()>;

    /// Release the handle without joining; the task keeps running.
    fn detach(self);
}

/// Injected runtime: the platform's threads, clock and topology.
///
/// Implementations must be cheap to clone - every subsystem that spawns
/// tasks holds its own copy.
pub trait Runtime: Clone + Send + Sync + 'static {
    /// The runtime's joinable task handle.
    type JoinHandle: Thread;

    /// Spawn a named task.
    ///
    /// # Errors
    ///
    /// [`RtError::SpawnFailed`] if the platform refuses the thread.
    fn spawn<F>(&self, name: &str, f: F) -> Result<Self::JoinHandle>
    where
        F: FnOnce() + Send + 'static;

    /// Block the calling task for `duration`.
    fn sleep(&self, duration: Duration);

    /// Monotonic clock reading.
    fn now(&self) -> Instant;

    /// Number of CPUs available to the scheduler.
    fn cpu_count(&self) -> usize;
}

/// Capability marker for [`Runtime`] implementations.
pub struct RuntimeCap;

/// Runtime capability config; no optional members today.
#[derive(Default)]
pub struct RuntimeConfig;

impl<T: Runtime> Contract<T> for RuntimeCap {
    type Config = RuntimeConfig;
}

/// Runtime capability wrapper alias.
pub type Rt<T> = Cap<RuntimeCap, T>;

/// The standard-library runtime: `std::thread` + `Instant`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdRuntime;

impl StdRuntime {
    /// Create the std runtime.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Join handle over a `std::thread` task.
pub struct StdThread(std::thread::JoinHandle<()>);

impl Thread for StdThread {
    fn join(self) -> Result<()> {
        self.0.join().map_err(|_| RtError::TaskPanicked)
    }

    fn detach(self) {
        drop(self.0);
    }
}

impl Runtime for StdRuntime {
    type JoinHandle = StdThread;

    fn spawn<F>(&self, name: &str, f: F) -> Result<StdThread>
    where
        F: FnOnce() + Send + 'static,
    {
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(f)
            .map(StdThread)
            .map_err(|e| RtError::SpawnFailed(e.to_string()))
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn cpu_count(&self) -> usize {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    }
}
