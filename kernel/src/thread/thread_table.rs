// SPDX-License-Identifier: MPL-2.0

//! The global thread registry.
//!
//! A slot map keyed by thread id. It owns the control blocks; everything
//! else holds weak handles resolved through it.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::prelude::*;

use super::{Thread, ThreadKind, ThreadName, ThreadState, Tid};

lazy_static! {
    static ref THREADS: SpinLock<BTreeMap<Tid, Arc<Thread>>> = SpinLock::new(BTreeMap::new());
}

static NEXT_TID: AtomicU32 = AtomicU32::new(1);

pub(crate) fn allocate_tid() -> Tid {
    NEXT_TID.fetch_add(1, Ordering::SeqCst)
}

pub(crate) fn add(thread: Arc<Thread>) {
    let old = THREADS.lock().insert(thread.tid(), thread);
    debug_assert!(old.is_none(), "duplicate tid in the thread table");
}

pub(crate) fn remove(tid: Tid) -> Option<Arc<Thread>> {
    THREADS.lock().remove(&tid)
}

/// Looks a thread up by id.
pub fn get(tid: Tid) -> Option<Arc<Thread>> {
    THREADS.lock().get(&tid).cloned()
}

/// Returns the number of live (unreaped) threads.
pub fn count() -> usize {
    THREADS.lock().len()
}

/// Returns the ids of all live threads, in ascending order.
pub fn tids() -> Vec<Tid> {
    THREADS.lock().keys().copied().collect()
}

/// A point-in-time descriptor of one thread.
#[derive(Clone, Copy, Debug)]
pub struct ThreadSnapshot {
    pub tid: Tid,
    pub name: ThreadName,
    pub priority: u16,
    pub effective_priority: u16,
    pub kind: ThreadKind,
    pub state: ThreadState,
    pub affinity: u64,
    pub cpu: u32,
}

impl ThreadSnapshot {
    fn of(thread: &Thread) -> Self {
        let inner = thread.lock();
        Self {
            tid: thread.tid(),
            name: *thread.name(),
            priority: thread.static_priority().get(),
            effective_priority: inner.effective_priority.get(),
            kind: thread.kind(),
            state: inner.state,
            affinity: inner.affinity.to_bits(),
            cpu: inner.sched_cpu,
        }
    }
}

/// Atomically copies up to `buf.len()` thread descriptors into `buf` and
/// returns the number copied.
pub fn snapshot(buf: &mut [ThreadSnapshot]) -> usize {
    let threads = THREADS.lock();
    let mut copied = 0;
    for thread in threads.values() {
        if copied == buf.len() {
            break;
        }
        buf[copied] = ThreadSnapshot::of(thread);
        copied += 1;
    }
    copied
}

/// Snapshots a single thread by id.
pub fn snapshot_of(tid: Tid) -> Option<ThreadSnapshot> {
    let threads = THREADS.lock();
    threads.get(&tid).map(|t| ThreadSnapshot::of(t))
}
