// SPDX-License-Identifier: MPL-2.0

//! Compile-time configuration of the framework.

/// Size of a kernel stack, in bytes.
pub const KERNEL_STACK_SIZE: usize = 64 * 1024;

/// Size of a signal-handler stack, in bytes.
pub const SIGNAL_STACK_SIZE: usize = 16 * 1024;

/// The maximum number of logical CPUs.
pub const MAX_CPUS: u32 = 64;

/// The number of scheduling priority levels. Priority 0 is the highest,
/// `PRIORITY_LEVELS - 1` the lowest.
pub const PRIORITY_LEVELS: u16 = 64;

/// The distinguished priority value meaning "no ready thread".
pub const PRIORITY_NONE: u16 = PRIORITY_LEVELS;

/// The window of the per-CPU load metric: the idle-election counter is
/// clamped to `[0, LOAD_WINDOW]`.
pub const LOAD_WINDOW: u32 = 100;

/// The maximum length of a thread name, in bytes.
pub const MAX_THREAD_NAME_LEN: usize = 32;
