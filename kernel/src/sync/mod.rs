// SPDX-License-Identifier: MPL-2.0

//! Synchronization primitives.
//!
//! Semaphores and mutexes share the same skeleton: a waiter queue on the
//! intrusive priority queue, an internal spin lock, a destroyed bit, and
//! flags selecting the queuing discipline. A primitive that needs to put
//! the caller to sleep always drops its own lock before entering the
//! scheduler.

mod mutex;
mod semaphore;

pub use mutex::Mutex;
pub use semaphore::Semaphore;

use crate::{
    prelude::*,
    thread::{BlockKind, Thread, ThreadState},
};

bitflags! {
    /// Behavior flags shared by the synchronization primitives.
    pub struct SyncFlags: u32 {
        /// Serve waiters first-come first-served.
        const QUEUE_FIFO = 1 << 0;
        /// Serve waiters by static thread priority (the default).
        const QUEUE_PRIORITY = 1 << 1;
        /// Allow the owner to re-acquire (mutex only).
        const RECURSIVE = 1 << 2;
        /// Elevate the owner to its highest waiter's priority (mutex only).
        const PRIORITY_INHERITANCE = 1 << 3;
    }
}

impl SyncFlags {
    pub(crate) fn validate_queue_discipline(self) -> Result<()> {
        if self.contains(SyncFlags::QUEUE_FIFO | SyncFlags::QUEUE_PRIORITY) {
            return_errno_with_message!(
                Errno::IncorrectValue,
                "FIFO and priority queuing are mutually exclusive"
            );
        }
        Ok(())
    }

    pub(crate) fn queue_by_priority(self) -> bool {
        // Priority queuing is the default.
        !self.contains(SyncFlags::QUEUE_FIFO)
    }
}

/// Marks `current` as waiting on a resource of the given kind.
///
/// Must happen before the thread becomes visible in a waiter queue, so a
/// racing release always observes a consistent blocked state.
pub(crate) fn mark_current_waiting(current: &Arc<Thread>, kind: BlockKind) {
    let mut inner = current.lock();
    inner.state = ThreadState::Waiting;
    inner.block_kind = Some(kind);
}

/// Enqueues `waiter` per the queue discipline in `flags`.
///
/// The caller has already marked the thread `Waiting` and holds the
/// primitive's lock.
pub(crate) fn enqueue_waiter(queue: &PrioQueue<Weak<Thread>>, waiter: &Arc<Thread>, flags: SyncFlags) {
    let node = waiter.sched_node().clone();
    let pushed = if flags.queue_by_priority() {
        queue.push_prio(node, waiter.static_priority().get() as u64)
    } else {
        queue.push(node)
    };
    pushed.expect("a blocking thread's node is already enlisted");
}

/// Pops the next waiter to serve: the highest static priority under
/// priority queuing, the earliest enqueued under FIFO.
pub(crate) fn dequeue_waiter(queue: &PrioQueue<Weak<Thread>>) -> Option<Arc<Thread>> {
    while let Some(node) = queue.pop() {
        if let Some(thread) = node.payload().upgrade() {
            return Some(thread);
        }
    }
    None
}

/// Drains the waiter queue; used by destroy.
pub(crate) fn drain_waiters(queue: &PrioQueue<Weak<Thread>>) -> Vec<Arc<Thread>> {
    let mut waiters = Vec::new();
    while let Some(thread) = dequeue_waiter(queue) {
        waiters.push(thread);
    }
    waiters
}
