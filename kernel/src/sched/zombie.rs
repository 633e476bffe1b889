// SPDX-License-Identifier: MPL-2.0

//! The global zombie list.
//!
//! Exited threads wait here until a joiner (or the lazy reaper) cleans
//! them. Plain FIFO service.

use crate::{prelude::*, thread::Thread};

pub(crate) struct ZombieList {
    queue: PrioQueue<Weak<Thread>>,
}

impl ZombieList {
    pub(crate) fn new() -> Self {
        Self {
            queue: PrioQueue::new(),
        }
    }

    pub(crate) fn push(&self, thread: &Arc<Thread>) {
        self.queue
            .push(thread.sched_node().clone())
            .expect("an exiting thread's node is already enlisted");
    }

    /// Unlinks `thread` (a joiner is about to clean it). Missing entries
    /// are fine: the lazy reaper may have raced us.
    pub(crate) fn remove(&self, thread: &Arc<Thread>) {
        let _ = self.queue.remove(thread.sched_node(), false);
    }

    /// Pops every zombie that has no joiner registered. Zombies with a
    /// pending joiner stay listed; their joiner reaps them.
    pub(crate) fn take_unjoined(&self) -> Vec<Arc<Thread>> {
        let mut unjoined = Vec::new();
        let mut keep = Vec::new();
        while let Some(node) = self.queue.pop() {
            let Some(thread) = node.payload().upgrade() else {
                continue;
            };
            if thread.lock().joiner.is_some() {
                keep.push(node);
            } else {
                unjoined.push(thread);
            }
        }
        for node in keep {
            self.queue
                .push(node)
                .expect("re-listing a zombie node failed");
        }
        unjoined
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
