// SPDX-License-Identifier: MPL-2.0

//! The monotonic clock and the periodic tick.

use crate::{arch, prelude::*, sync::SpinLock};

/// Returns the nanoseconds elapsed since boot.
pub fn uptime_ns() -> u64 {
    arch::now_ns()
}

static TICK_CALLBACKS: SpinLock<Vec<fn()>> = SpinLock::new(Vec::new());

/// Registers a function to run on every periodic tick.
///
/// Callbacks run in interrupt context with local IRQs masked; they must not
/// block.
pub fn register_tick_callback(callback: fn()) {
    TICK_CALLBACKS.lock().push(callback);
}

/// Runs the registered tick callbacks.
///
/// Invoked by the timer interrupt on bare metal. Hosted embedders (and the
/// test suites) call it directly to simulate the tick.
pub fn tick() {
    // Snapshot under the lock; the callbacks themselves may take locks.
    let callbacks = TICK_CALLBACKS.lock().clone();
    for callback in callbacks {
        callback();
    }
}

/// Advances the emulated clock on hosted targets.
#[cfg(not(target_os = "none"))]
pub fn advance_ns(delta: u64) {
    crate::arch::advance_clock_ns(delta);
}
