// SPDX-License-Identifier: MPL-2.0

//! Kernel data structures.

pub mod prio_queue;
