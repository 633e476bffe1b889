// SPDX-License-Identifier: MPL-2.0

//! The framework part of Silene.
//!
//! This crate provides the privileged, architecture-facing half of the
//! kernel: CPU identification, local interrupt masking, the spin lock that
//! every core data structure relies on, task contexts and the context
//! switch, kernel stacks, the monotonic clock with tick callbacks, IPI
//! plumbing, and the intrusive priority queue shared by the upper layers.
//!
//! On bare metal (`target_os = "none"`) the architecture layer talks to the
//! hardware. On hosted targets it emulates the interrupt flag and the clock
//! so that the whole kernel core, real stack switches included, runs inside
//! an ordinary process. The test suites build on the hosted layer.

#![cfg_attr(not(test), no_std)]
#![allow(dead_code)]

extern crate alloc;

pub mod arch;
pub mod collections;
pub mod config;
pub mod cpu;
mod error;
pub mod logger;
pub mod prelude;
pub mod smp;
pub mod sync;
pub mod task;
pub mod time;
pub mod trap;

pub use self::{error::Error, prelude::Result};

use spin::Once;

static INIT: Once<()> = Once::new();

/// Initializes the framework.
///
/// `num_cpus` is the number of logical CPUs the scheduler may place threads
/// on. The call is idempotent; only the first call takes effect.
pub fn init(num_cpus: u32) {
    INIT.call_once(|| {
        cpu::init(num_cpus);
        logger::init();
    });
}
