// SPDX-License-Identifier: MPL-2.0

use core::marker::PhantomData;

use crate::arch;

/// Disables all IRQs on the current CPU (i.e., locally).
///
/// This function returns a guard object, which will automatically enable
/// local IRQs again when it is dropped. The function works correctly even
/// when it is called in a _nested_ way: the local IRQs are only re-enabled
/// when the outermost guard is dropped.
#[must_use]
pub fn disable_local() -> DisabledLocalIrqGuard {
    DisabledLocalIrqGuard::new()
}

/// Returns whether the local IRQs are enabled.
pub fn is_local_enabled() -> bool {
    arch::irq_is_enabled()
}

/// Unconditionally enables the local IRQs.
///
/// A context that is switched to for the very first time starts executing
/// with the IRQs still masked by the switching side; its entry trampoline
/// calls this once before running any payload code.
pub fn enable_local() {
    arch::irq_enable();
}

/// A guard for disabled local IRQs.
pub struct DisabledLocalIrqGuard {
    was_enabled: bool,
    // The guard must stay on the CPU that created it.
    _not_send: PhantomData<*mut ()>,
}

impl DisabledLocalIrqGuard {
    fn new() -> Self {
        let was_enabled = arch::irq_is_enabled();
        if was_enabled {
            arch::irq_disable();
        }
        Self {
            was_enabled,
            _not_send: PhantomData,
        }
    }

    /// Transfers the saved IRQ status to a new guard and leaves `self`
    /// inert, so that the enable point can outlive the current scope.
    pub fn transfer_to(&mut self) -> Self {
        let was_enabled = self.was_enabled;
        self.was_enabled = false;
        Self {
            was_enabled,
            _not_send: PhantomData,
        }
    }
}

impl Drop for DisabledLocalIrqGuard {
    fn drop(&mut self) {
        if self.was_enabled {
            arch::irq_enable();
        }
    }
}
