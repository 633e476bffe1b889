// SPDX-License-Identifier: MPL-2.0

//! Platform-specific bits.
//!
//! Only the contracts the core needs are defined here: reading the current
//! CPU id, masking and restoring local interrupts, a monotonic clock, and
//! delivering inter-processor interrupts. Everything else that touches the
//! hardware (interrupt controllers, page tables, port I/O) lives outside
//! this repository.

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        mod x86;
        pub(crate) use x86 as imp;
    } else {
        pub(crate) mod hosted;
        pub(crate) use hosted as imp;
        pub use hosted::advance_clock_ns;
    }
}

pub(crate) use imp::{
    irq_disable, irq_enable, irq_is_enabled, now_ns, send_ipi_raw, this_cpu_id,
};
