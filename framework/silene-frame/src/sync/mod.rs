// SPDX-License-Identifier: MPL-2.0

//! Synchronization substrate.

mod spin;

pub use self::spin::{SpinLock, SpinLockGuard};
