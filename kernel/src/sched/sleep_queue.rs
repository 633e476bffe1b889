// SPDX-License-Identifier: MPL-2.0

//! The per-CPU sleep list.
//!
//! Keyed by wake-up deadline: the earliest deadline sits at the tail, so a
//! wake scan pops from the tail and stops at the first future deadline.

use crate::{prelude::*, thread::Thread};

pub(crate) struct SleepQueue {
    queue: PrioQueue<Weak<Thread>>,
}

impl SleepQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: PrioQueue::new(),
        }
    }

    pub(crate) fn push(&self, thread: &Arc<Thread>, deadline_ns: u64) {
        self.queue
            .push_prio(thread.sched_node().clone(), deadline_ns)
            .expect("a sleeping thread's node is already enlisted");
    }

    /// Pops the sleeper with the earliest deadline if it is due at `now`.
    pub(crate) fn pop_expired(&self, now_ns: u64) -> Option<Arc<Thread>> {
        loop {
            let node = self.queue.pop_if(|deadline, _| deadline <= now_ns)?;
            if let Some(thread) = node.payload().upgrade() {
                return Some(thread);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
