// SPDX-License-Identifier: MPL-2.0

//! The OS-semantics part of Silene.
//!
//! Built on `silene-frame`, this crate provides the four subsystems that
//! give the system its semantics as an operating system: the thread
//! scheduler, the synchronization primitives, the virtual file system, and
//! the thread lifecycle that ties them together.

#![cfg_attr(not(test), no_std)]
#![allow(dead_code)]

extern crate alloc;

pub mod error;
pub mod fs;
pub mod sched;
pub mod sync;
pub mod thread;

mod prelude;

use spin::Once;

static INIT: Once<()> = Once::new();

/// Boots the kernel core.
///
/// The order is deterministic: framework first, then the scheduler tables,
/// then the VFS (which registers the thread-info filesystem, so the
/// scheduler must already exist). Idempotent.
pub fn init(num_cpus: u32) {
    silene_frame::init(num_cpus);
    INIT.call_once(|| {
        sched::init();
        fs::init();
        log::info!("silene kernel core is up ({} cpus)", num_cpus);
    });
}
