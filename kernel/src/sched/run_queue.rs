// SPDX-License-Identifier: MPL-2.0

//! The per-CPU ready table.
//!
//! One ready list per priority level. A released thread enters at the head
//! of its level's list and election pops from the tail, so equal-priority
//! threads round-robin. The `highest_priority` cache names the smallest
//! non-empty level and is rebuilt lazily on dequeue.

use silene_frame::config::PRIORITY_LEVELS;

use crate::{prelude::*, thread::Thread};

struct Cache {
    highest: Priority,
    count: usize,
}

pub(crate) struct RunQueue {
    buckets: Vec<PrioQueue<Weak<Thread>>>,
    cache: SpinLock<Cache>,
}

impl RunQueue {
    pub(crate) fn new() -> Self {
        let mut buckets = Vec::with_capacity(PRIORITY_LEVELS as usize);
        for _ in 0..PRIORITY_LEVELS {
            buckets.push(PrioQueue::new());
        }
        Self {
            buckets,
            cache: SpinLock::new(Cache {
                highest: Priority::none(),
                count: 0,
            }),
        }
    }

    /// Enqueues a ready thread's node at `priority`. Returns whether this
    /// improved the CPU's highest ready priority.
    pub(crate) fn enqueue(&self, node: Arc<PrioNode<Weak<Thread>>>, priority: Priority) -> bool {
        debug_assert!(!priority.is_none());
        let mut cache = self.cache.lock();
        self.buckets[priority.get() as usize]
            .push(node)
            .expect("a ready thread's node is already enlisted");
        cache.count += 1;
        if priority.is_higher_than(cache.highest) {
            cache.highest = priority;
            true
        } else {
            false
        }
    }

    /// Pops the oldest thread at the highest ready priority, or `None` if
    /// every list is empty.
    pub(crate) fn dequeue(&self) -> Option<Arc<PrioNode<Weak<Thread>>>> {
        let mut cache = self.cache.lock();
        if cache.highest.is_none() {
            debug_assert_eq!(cache.count, 0);
            return None;
        }
        let level = cache.highest.get();
        let node = self.buckets[level as usize]
            .pop()
            .expect("the highest-priority cache names an empty list");
        cache.count -= 1;
        // Rebuild the cache by scanning upward from the emptied level.
        if self.buckets[level as usize].is_empty() {
            cache.highest = Priority::none();
            for next in level + 1..PRIORITY_LEVELS {
                if !self.buckets[next as usize].is_empty() {
                    cache.highest = Priority::new(next);
                    break;
                }
            }
        }
        Some(node)
    }

    /// Moves an enqueued node from the `old` priority list to the `new`
    /// one; used when inheritance changes a ready thread's priority.
    pub(crate) fn requeue(
        &self,
        node: &Arc<PrioNode<Weak<Thread>>>,
        old: Priority,
        new: Priority,
    ) {
        let mut cache = self.cache.lock();
        self.buckets[old.get() as usize]
            .remove(node, true)
            .expect("requeued node absent from its priority list");
        self.buckets[new.get() as usize]
            .push(node.clone())
            .expect("requeued node still enlisted");
        if new.is_higher_than(cache.highest) {
            cache.highest = new;
        } else if cache.highest == old && self.buckets[old.get() as usize].is_empty() {
            // The emptied list may have been the cached highest.
            cache.highest = Priority::none();
            for next in 0..PRIORITY_LEVELS {
                if !self.buckets[next as usize].is_empty() {
                    cache.highest = Priority::new(next);
                    break;
                }
            }
        }
    }

    /// Returns the highest ready priority, or [`Priority::none`].
    pub(crate) fn highest(&self) -> Priority {
        self.cache.lock().highest
    }

    pub(crate) fn count(&self) -> usize {
        self.cache.lock().count
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::thread::{ThreadOptions, ThreadState};

    fn ready_thread(priority: u16) -> Arc<Thread> {
        crate::init(1);
        ThreadOptions::new(|| 0)
            .priority(Priority::new(priority))
            .build()
            .unwrap()
    }

    fn tid_of(node: &Arc<PrioNode<Weak<Thread>>>) -> u32 {
        node.payload().upgrade().unwrap().tid()
    }

    // Unit-test threads never run; drop them from the global registry so
    // other tests see a clean table.
    fn retire(threads: impl IntoIterator<Item = Arc<Thread>>) {
        for t in threads {
            t.lock().state = ThreadState::Zombie;
            crate::thread::thread_table::remove(t.tid());
        }
    }

    #[test]
    fn highest_priority_cache_tracks_minimum() {
        let rq = RunQueue::new();
        assert!(rq.highest().is_none());

        let low = ready_thread(20);
        let high = ready_thread(5);
        rq.enqueue(low.sched_node().clone(), Priority::new(20));
        assert_eq!(rq.highest(), Priority::new(20));
        assert!(rq.enqueue(high.sched_node().clone(), Priority::new(5)));
        assert_eq!(rq.highest(), Priority::new(5));

        assert_eq!(tid_of(&rq.dequeue().unwrap()), high.tid());
        assert_eq!(rq.highest(), Priority::new(20));
        assert_eq!(tid_of(&rq.dequeue().unwrap()), low.tid());
        assert!(rq.highest().is_none());
        assert!(rq.dequeue().is_none());
        retire([low, high]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let rq = RunQueue::new();
        let threads: Vec<_> = (0..3).map(|_| ready_thread(10)).collect();
        for t in &threads {
            rq.enqueue(t.sched_node().clone(), Priority::new(10));
        }
        for t in &threads {
            assert_eq!(tid_of(&rq.dequeue().unwrap()), t.tid());
        }
        retire(threads);
    }

    #[test]
    fn requeue_moves_between_levels() {
        let rq = RunQueue::new();
        let a = ready_thread(12);
        let b = ready_thread(12);
        rq.enqueue(a.sched_node().clone(), Priority::new(12));
        rq.enqueue(b.sched_node().clone(), Priority::new(12));

        rq.requeue(b.sched_node(), Priority::new(12), Priority::new(7));
        assert_eq!(rq.highest(), Priority::new(7));
        assert_eq!(tid_of(&rq.dequeue().unwrap()), b.tid());
        assert_eq!(tid_of(&rq.dequeue().unwrap()), a.tid());
        assert_eq!(rq.count(), 0);
        retire([a, b]);
    }
}
