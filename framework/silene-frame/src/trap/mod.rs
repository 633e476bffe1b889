// SPDX-License-Identifier: MPL-2.0

//! Interrupt masking.

mod irq;

pub use irq::{disable_local, enable_local, is_local_enabled, DisabledLocalIrqGuard};
