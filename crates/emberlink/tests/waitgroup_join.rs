// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! WaitGroup joining scenario: ten tasks, one shared counter, full join.

use emberlink::rt::{Cancel, EventGroup, Semaphore, WaitGroup, WaitMode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn ten_tasks_all_counted_and_joined() {
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
    // Every handle was consumed by the join: nothing left tracked.
    assert!(wg.is_empty());
}

#[test]
fn wait_can_be_reused_for_later_batches() {
    let wg = WaitGroup::new();
    let counter = Arc::new(AtomicU32::new(0));
    for round in 1..=3u32 {
        for _ in 0..4 {
            let counter = counter.clone();
            wg.go(move || {
                counter.fetch_add(1, Ordering::Release);
            })
            .unwrap();
        }
        wg.wait().unwrap();
        assert_eq!(counter.load(Ordering::Acquire), round * 4);
    }
}

#[test]
fn cancellation_is_cooperative() {
    let wg = WaitGroup::new();
    let cancel = Cancel::new();
    let observed = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::binary());

    for _ in 0..4 {
        let cancel = cancel.child();
        let observed = observed.clone();
        let gate = gate.clone();
        wg.go(move || {
            // Park until the main task says go, then observe the token.
            gate.wait();
            gate.signal();
            if cancel.is_cancelled() {
                observed.fetch_add(1, Ordering::Release);
            }
        })
        .unwrap();
    }

    cancel.cancel();
    gate.signal();
    wg.wait().unwrap();
    assert_eq!(observed.load(Ordering::Acquire), 4);
}

#[test]
fn event_group_coordinates_tracked_tasks() {
    const READY: u32 = 1 << 0;
    const GO: u32 = 1 << 1;

    let wg = WaitGroup::new();
    let events = Arc::new(EventGroup::new());
    let counter = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let events = events.clone();
        let counter = counter.clone();
        wg.go(move || {
            events.set(READY);
            events.wait(GO, WaitMode::Any, false);
            counter.fetch_add(1, Ordering::Release);
        })
        .unwrap();
    }

    events.wait(READY, WaitMode::Any, false);
    events.set(GO);
    wg.wait().unwrap();
    assert_eq!(counter.load(Ordering::Acquire), 3);

    let observed = events
        .wait_timeout(READY | GO, WaitMode::All, false, Duration::from_millis(100))
        .expect("flags remain set");
    assert_eq!(observed & (READY | GO), READY | GO);
}
