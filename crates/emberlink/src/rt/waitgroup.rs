// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Task-joining helper over an injected runtime.
//!
//! `go` spawns a tracked task; `wait` joins every task spawned so far.
//! The handle list is mutex-protected and appends are atomic with the
//! spawn: a failed spawn leaves the list untouched. Handles are moved out
//! under the lock and joined after releasing it, so a blocking join never
//! holds the lock against concurrent `go` calls.

use super::runtime::{Runtime, Thread};
use super::{Result, StdRuntime};
use parking_lot::Mutex;

/// Tracks spawned tasks for collective join.
pub struct WaitGroup<R: Runtime = StdRuntime> {
    runtime: R,
    threads: Mutex<Vec<R::JoinHandle>>,
    next_id: std::sync::atomic::AtomicU32,
}

impl WaitGroup<StdRuntime> {
    /// WaitGroup over the standard-library runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runtime(StdRuntime::new())
    }
}

impl Default for WaitGroup<StdRuntime> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Runtime> WaitGroup<R> {
    /// WaitGroup over an explicit runtime.
    #[must_use]
    pub fn with_runtime(runtime: R) -> Self {
        Self {
            runtime,
            threads: Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Spawn a tracked task with a generated name.
    ///
    /// # Errors
    ///
    /// Propagates the runtime's spawn failure; the group is unchanged.
    pub fn go<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.go_named(&format!("wg-{}", id), f)
    }

    /// Spawn a tracked task with an explicit thread name.
    ///
    /// The spawn and the list append happen under the same lock, so `wait`
    /// in another task either joins this task or never observes it.
    pub fn go_named<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut threads = self.threads.lock();
        let handle = self.runtime.spawn(name, f)?;
        threads.push(handle);
        Ok(())
    }

    /// Join every task spawned so far.
    ///
    /// Returns immediately on an empty group. Tasks spawned concurrently
    /// with `wait` belong to the next `wait`.
    ///
    /// # Errors
    ///
    /// Reports the first panicked task after all handles were joined.
    pub fn wait(&self) -> Result<()> {
        let handles = std::mem::take(&mut *self.threads.lock());
        let mut first_err = None;
        for handle in handles {
            if let Err(e) = handle.join() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of currently tracked (not yet waited) tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    /// True when no tasks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn wait_on_empty_group_returns_immediately() {
        let wg = WaitGroup::new();
        wg.wait().unwrap();
    }

    #[test]
    fn wait_observes_all_side_effects() {
        let wg = WaitGroup::new();
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            wg.go(move || {
                counter.fetch_add(1, Ordering::Release);
            })
            .unwrap();
        }
        wg.wait().unwrap();
        assert_eq!(counter.load(Ordering::Acquire), 10);
        assert!(wg.is_empty());
    }

    #[test]
    fn concurrent_go_calls_all_join() {
        let wg = Arc::new(WaitGroup::new());
        let counter = Arc::new(AtomicU32::new(0));
        let spawners: Vec<_> = (0..4)
            .map(|_| {
                let wg = wg.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..8 {
                        let counter = counter.clone();
                        wg.go(move || {
                            std::thread::sleep(Duration::from_millis(1));
                            counter.fetch_add(1, Ordering::Release);
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for s in spawners {
            s.join().unwrap();
        }
        wg.wait().unwrap();
        assert_eq!(counter.load(Ordering::Acquire), 32);
    }

    #[test]
    fn panicked_task_surfaces_after_all_joined() {
        let wg = WaitGroup::new();
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        wg.go(move || panic!("task failure")).unwrap();
        wg.go(move || {
            c.fetch_add(1, Ordering::Release);
        })
        .unwrap();
        assert!(wg.wait().is_err());
        assert_eq!(counter.load(Ordering::Acquire), 1);
    }
}
