// SPDX-License-Identifier: MPL-2.0

//! The `log` facade wiring.
//!
//! The framework does not format or transport log records itself; a sink
//! (the serial console on bare metal, a capture buffer in a test harness)
//! is registered by the embedder and records are forwarded to it.

use log::{LevelFilter, Metadata, Record};
use spin::Once;

static SINK: Once<fn(&Record)> = Once::new();

struct FrameLogger;

static LOGGER: FrameLogger = FrameLogger;

impl log::Log for FrameLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        SINK.get().is_some()
    }

    fn log(&self, record: &Record) {
        if let Some(sink) = SINK.get() {
            sink(record);
        }
    }

    fn flush(&self) {}
}

/// Routes all `log` records to `sink`.
pub fn register_sink(sink: fn(&Record)) {
    SINK.call_once(|| sink);
}

pub(crate) fn init() {
    // A second logger (e.g. the test harness's) is fine; ours just stays
    // unused then.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(LevelFilter::Info);
}
