// SPDX-License-Identifier: MPL-2.0

//! Per-CPU execution state.
//!
//! Each CPU runs at most one thread; when nothing is ready it runs its
//! bootstrap context, which doubles as the idle thread. The previous
//! thread of a switch is parked until the next context has fully landed,
//! at which point its context is marked saved and the reference dropped.

use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicU32, Ordering},
};

use silene_frame::{
    config::LOAD_WINDOW,
    cpu::this_cpu,
    task::{context_switch, TaskContext},
};

use crate::{prelude::*, thread::Thread};

pub(crate) struct Processor {
    inner: SpinLock<ProcessorInner>,
    idle_ctx: UnsafeCell<TaskContext>,
    // The load metric: how often recent elections picked idle. Higher
    // means a less busy CPU.
    idle_count: AtomicU32,
}

// SAFETY: `idle_ctx` is only touched by the owning CPU, inside the
// scheduler with interrupts masked.
unsafe impl Sync for Processor {}

struct ProcessorInner {
    current: Option<Arc<Thread>>,
    // Kept alive across a switch; see `finish_switch`.
    prev: Option<Arc<Thread>>,
}

impl Processor {
    pub(crate) fn new() -> Self {
        Self {
            inner: SpinLock::new(ProcessorInner {
                current: None,
                prev: None,
            }),
            idle_ctx: UnsafeCell::new(TaskContext::new()),
            idle_count: AtomicU32::new(0),
        }
    }

    pub(crate) fn current(&self) -> Option<Arc<Thread>> {
        self.inner.lock().current.clone()
    }

    /// An election picked the idle context.
    pub(crate) fn note_idle(&self) {
        let count = self.idle_count.load(Ordering::Relaxed);
        if count < LOAD_WINDOW {
            self.idle_count.store(count + 1, Ordering::Relaxed);
        }
    }

    /// An election picked a real thread.
    pub(crate) fn note_busy(&self) {
        let count = self.idle_count.load(Ordering::Relaxed);
        if count > 0 {
            self.idle_count.store(count - 1, Ordering::Relaxed);
        }
    }

    /// The load metric: the recent idle-election count, clamped to
    /// `[0, LOAD_WINDOW]`. Higher means less busy.
    pub(crate) fn load(&self) -> u32 {
        self.idle_count.load(Ordering::Relaxed)
    }

    /// Switches from the current context (a thread or idle) to `next`.
    ///
    /// Returns when this context is switched back to. Must be called with
    /// interrupts masked and no lock guard held.
    pub(crate) fn switch_to(&self, next: Arc<Thread>) {
        let next_ctx = next.ctx_ptr().cast_const();
        let cur_ctx = {
            let mut inner = self.inner.lock();
            let prev = inner.current.take();
            let cur_ctx = match &prev {
                Some(thread) => {
                    debug_assert!(!Arc::ptr_eq(thread, &next));
                    thread.ctx_ptr()
                }
                None => self.idle_ctx.get(),
            };
            next.set_ctx_saved(false);
            inner.current = Some(next);
            debug_assert!(inner.prev.is_none());
            inner.prev = prev;
            cur_ctx
        };

        // SAFETY: `cur_ctx` belongs to the context executing right here;
        // `next_ctx` is a fully saved context we have exclusive ownership
        // of (it was just dequeued and marked current).
        unsafe { context_switch(cur_ctx, next_ctx) };

        // Somebody switched back to us, possibly on another CPU.
        finish_switch();
    }

    /// Switches from the current thread back to the idle context.
    pub(crate) fn switch_to_idle(&self) {
        let (cur_ctx, idle_ctx) = {
            let mut inner = self.inner.lock();
            let prev = inner
                .current
                .take()
                .expect("switching to idle from the idle context");
            let cur_ctx = prev.ctx_ptr();
            debug_assert!(inner.prev.is_none());
            inner.prev = Some(prev);
            (cur_ctx, self.idle_ctx.get().cast_const())
        };

        // SAFETY: as in `switch_to`; the idle context was saved when this
        // CPU last switched away from it.
        unsafe { context_switch(cur_ctx, idle_ctx) };

        finish_switch();
    }
}

/// Finishes the switch that carried us here: marks the predecessor's
/// context as fully saved and drops the reference that kept it alive.
///
/// Every context resumption point runs this exactly once: the line after
/// `context_switch` for suspended contexts, the top of the entry
/// trampolines for fresh ones.
pub(crate) fn finish_switch() {
    let processor = super::processor(this_cpu());
    let prev = processor.inner.lock().prev.take();
    if let Some(prev) = prev {
        prev.set_ctx_saved(true);
    }
}
