// SPDX-License-Identifier: MPL-2.0

//! Inter-processor interrupt plumbing.
//!
//! Cross-CPU influence travels exclusively through reschedule requests: a
//! CPU that changes another CPU's ready set asks it to re-run its scheduler.
//! The upper layer registers a single handler; the platform layer delivers
//! requests to it (from the IPI vector on bare metal, synchronously on
//! hosted targets).

use spin::Once;

use crate::arch;

/// A request carried by an inter-processor interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpiRequest {
    /// Re-run the scheduler on the receiving CPU.
    Reschedule,
}

static IPI_HANDLER: Once<fn(IpiRequest)> = Once::new();

/// Registers the handler invoked on the receiving CPU for every IPI.
///
/// Must be called once, before any `send_ipi`.
pub fn register_ipi_handler(handler: fn(IpiRequest)) {
    IPI_HANDLER.call_once(|| handler);
}

/// Sends `request` to `cpu`.
pub fn send_ipi(cpu: u32, request: IpiRequest) {
    arch::send_ipi_raw(cpu, request);
}

/// Hands a received request to the registered handler.
///
/// Called by the platform layer in interrupt context.
pub(crate) fn dispatch(request: IpiRequest) {
    if let Some(handler) = IPI_HANDLER.get() {
        handler(request);
    }
}
