// SPDX-License-Identifier: MPL-2.0

//! The hosted platform layer.
//!
//! Used whenever the crate is not built for bare metal. The interrupt flag
//! is an emulated per-process flag, the clock is an atomic counter advanced
//! by the embedder, and IPIs are dispatched synchronously to the handler
//! registered in [`crate::smp`]. Scheduling is therefore cooperative: a
//! hosted "interrupt" only ever fires from an explicit `tick()` or IPI
//! call site.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::smp::IpiRequest;

static IRQ_ENABLED: AtomicBool = AtomicBool::new(true);
static CLOCK_NS: AtomicU64 = AtomicU64::new(0);

pub(crate) fn this_cpu_id() -> u32 {
    0
}

pub(crate) fn irq_is_enabled() -> bool {
    IRQ_ENABLED.load(Ordering::Relaxed)
}

pub(crate) fn irq_disable() {
    IRQ_ENABLED.store(false, Ordering::Relaxed);
}

pub(crate) fn irq_enable() {
    IRQ_ENABLED.store(true, Ordering::Relaxed);
}

pub(crate) fn now_ns() -> u64 {
    CLOCK_NS.load(Ordering::Relaxed)
}

/// Advances the emulated monotonic clock.
pub fn advance_clock_ns(delta: u64) {
    CLOCK_NS.fetch_add(delta, Ordering::Relaxed);
}

pub(crate) fn send_ipi_raw(_cpu: u32, request: IpiRequest) {
    // There is no other CPU to interrupt; hand the request to the
    // registered handler on the spot.
    crate::smp::dispatch(request);
}
