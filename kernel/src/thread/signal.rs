// SPDX-License-Identifier: MPL-2.0

//! Kernel signals.
//!
//! Signals are a narrow, in-kernel mechanism: a per-thread pending mask
//! that the scheduler drains right before dispatching a thread. `KILL` is
//! the only signal with core-defined semantics; delivery redirects the
//! thread's saved context to the exit trampoline on its signal stack.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::prelude::*;

bitflags! {
    /// A set of kernel signals.
    pub struct SigSet: u32 {
        /// Terminate the thread.
        const KILL = 1 << 0;
    }
}

/// The pending-signal mask of one thread.
pub(crate) struct PendingSignals {
    mask: AtomicU32,
}

impl PendingSignals {
    pub(crate) const fn new() -> Self {
        Self {
            mask: AtomicU32::new(0),
        }
    }

    pub(crate) fn post(&self, signals: SigSet) {
        self.mask.fetch_or(signals.bits(), Ordering::Release);
    }

    /// Clears `signals` from the mask; returns whether any of them was
    /// pending.
    pub(crate) fn take(&self, signals: SigSet) -> bool {
        let old = self.mask.fetch_and(!signals.bits(), Ordering::AcqRel);
        old & signals.bits() != 0
    }

    pub(crate) fn is_pending(&self, signals: SigSet) -> bool {
        self.mask.load(Ordering::Acquire) & signals.bits() != 0
    }
}
