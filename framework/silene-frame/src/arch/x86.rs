// SPDX-License-Identifier: MPL-2.0

//! The x86-64 bare-metal platform layer.
//!
//! The APIC programming that backs `send_ipi_raw` and the per-CPU id setup
//! are provided by the platform integration outside this crate; this module
//! only carries the pieces the core calls directly.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::smp::IpiRequest;

/// The scheduler IPI vector. The platform interrupt setup routes it to
/// `crate::smp::dispatch`.
pub const RESCHEDULE_VECTOR: u8 = 0xf1;

// Written once per CPU during early boot, before any scheduling happens.
static BOOT_CPU_ID: AtomicU32 = AtomicU32::new(0);

pub(crate) fn this_cpu_id() -> u32 {
    BOOT_CPU_ID.load(Ordering::Relaxed)
}

pub(crate) fn irq_is_enabled() -> bool {
    x86_64::instructions::interrupts::are_enabled()
}

pub(crate) fn irq_disable() {
    x86_64::instructions::interrupts::disable();
}

pub(crate) fn irq_enable() {
    x86_64::instructions::interrupts::enable();
}

pub(crate) fn now_ns() -> u64 {
    // The TSC is calibrated by the platform timer setup; the raw counter is
    // good enough for deadline ordering until then.
    let tsc = unsafe { core::arch::x86_64::_rdtsc() };
    tsc
}

pub(crate) fn send_ipi_raw(cpu: u32, request: IpiRequest) {
    extern "Rust" {
        fn __silene_platform_send_ipi(cpu: u32, vector: u8);
    }
    let _ = request;
    unsafe { __silene_platform_send_ipi(cpu, RESCHEDULE_VECTOR) };
}
