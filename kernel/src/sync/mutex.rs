// SPDX-License-Identifier: MPL-2.0

//! Mutexes with optional recursion and priority inheritance.

use super::{dequeue_waiter, drain_waiters, enqueue_waiter, SyncFlags};
use crate::{
    prelude::*,
    sched,
    thread::{BlockKind, Thread},
};

struct MutexInner {
    owner: Option<Weak<Thread>>,
    depth: u32,
    // The owner's static priority, remembered for the inheritance
    // roll-back on unlock.
    saved_priority: Option<Priority>,
    destroyed: bool,
}

/// A mutex.
///
/// With [`SyncFlags::PRIORITY_INHERITANCE`], the owner's effective
/// priority tracks the highest static priority among itself and its
/// waiters for the whole time a waiter is enqueued. Inheritance is one
/// level deep: it does not propagate through the owner's own blocking
/// chain.
pub struct Mutex {
    inner: SpinLock<MutexInner>,
    waiters: PrioQueue<Weak<Thread>>,
    flags: SyncFlags,
}

impl Mutex {
    pub fn new(flags: SyncFlags) -> Result<Self> {
        flags.validate_queue_discipline()?;
        Ok(Self {
            inner: SpinLock::new(MutexInner {
                owner: None,
                depth: 0,
                saved_priority: None,
                destroyed: false,
            }),
            waiters: PrioQueue::new(),
            flags,
        })
    }

    fn inheritance(&self) -> bool {
        self.flags.contains(SyncFlags::PRIORITY_INHERITANCE)
    }

    /// Acquires the mutex, blocking while another thread owns it.
    ///
    /// Not allowed from an idle context. Re-acquiring is only allowed with
    /// [`SyncFlags::RECURSIVE`].
    pub fn lock(&self) -> Result<()> {
        let current = Thread::current().ok_or(Error::with_message(
            Errno::UnauthorizedAction,
            "idle cannot lock a mutex",
        ))?;
        {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return_errno!(Errno::Destroyed);
            }
            match inner.owner.as_ref().and_then(Weak::upgrade) {
                None => {
                    self.grant(&mut inner, &current);
                    return Ok(());
                }
                Some(owner) if Arc::ptr_eq(&owner, &current) => {
                    if !self.flags.contains(SyncFlags::RECURSIVE) {
                        return_errno_with_message!(
                            Errno::UnauthorizedAction,
                            "re-locking a non-recursive mutex"
                        );
                    }
                    inner.depth += 1;
                    return Ok(());
                }
                Some(owner) => {
                    // Contended. Elevate the owner first so the
                    // inheritance invariant holds from the instant we
                    // enqueue.
                    if self.inheritance() {
                        let mine = current.static_priority();
                        if mine.is_higher_than(owner.effective_priority()) {
                            sched::update_priority(&owner, mine);
                        }
                    }
                    super::mark_current_waiting(&current, BlockKind::Mutex);
                    enqueue_waiter(&self.waiters, &current, self.flags);
                }
            }
        }
        sched::schedule();
        // Woken: either the unlock made us the owner, or the mutex died.
        if self.inner.lock().destroyed {
            return_errno!(Errno::Destroyed);
        }
        debug_assert!(self.is_owned_by(&current));
        Ok(())
    }

    /// Acquires the mutex without blocking.
    ///
    /// Returns the new recursion depth, or [`Errno::WouldBlock`] if the
    /// mutex is owned by somebody else.
    pub fn try_lock(&self) -> Result<u32> {
        let current = Thread::current().ok_or(Error::with_message(
            Errno::UnauthorizedAction,
            "idle cannot lock a mutex",
        ))?;
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return_errno!(Errno::Destroyed);
        }
        match inner.owner.as_ref().and_then(Weak::upgrade) {
            None => {
                self.grant(&mut inner, &current);
                Ok(1)
            }
            Some(owner) if Arc::ptr_eq(&owner, &current) => {
                if !self.flags.contains(SyncFlags::RECURSIVE) {
                    return_errno_with_message!(
                        Errno::UnauthorizedAction,
                        "re-locking a non-recursive mutex"
                    );
                }
                inner.depth += 1;
                Ok(inner.depth)
            }
            Some(_) => return_errno!(Errno::WouldBlock),
        }
    }

    /// Releases the mutex. Must be called by the owner.
    ///
    /// On the last release the ownership transfers to the next waiter per
    /// the queue discipline, and with inheritance enabled the caller's
    /// effective priority rolls back to its static one.
    pub fn unlock(&self) -> Result<()> {
        let current = Thread::current().ok_or(Error::with_message(
            Errno::UnauthorizedAction,
            "idle cannot unlock a mutex",
        ))?;
        let (restore, next_owner) = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return_errno!(Errno::Destroyed);
            }
            let owner = inner.owner.as_ref().and_then(Weak::upgrade);
            if !owner.is_some_and(|owner| Arc::ptr_eq(&owner, &current)) {
                return_errno_with_message!(
                    Errno::UnauthorizedAction,
                    "unlocking a mutex the caller does not own"
                );
            }
            if inner.depth > 1 {
                debug_assert!(self.flags.contains(SyncFlags::RECURSIVE));
                inner.depth -= 1;
                return Ok(());
            }

            let restore = inner.saved_priority.take();
            match dequeue_waiter(&self.waiters) {
                Some(next) => {
                    self.grant(&mut inner, &next);
                    (restore, Some(next))
                }
                None => {
                    inner.owner = None;
                    inner.depth = 0;
                    (restore, None)
                }
            }
        };

        if let Some(saved) = restore {
            sched::update_priority(&current, saved);
        }
        if let Some(next) = next_owner {
            if self.inheritance() {
                // The new owner may still have higher-priority company in
                // the queue (possible under FIFO queuing).
                if let Some(top) = self.highest_waiter_priority() {
                    if top.is_higher_than(next.effective_priority()) {
                        sched::update_priority(&next, top);
                    }
                }
            }
            sched::release_thread(&next);
        }
        Ok(())
    }

    /// Destroys the mutex: every blocked waiter is released and observes
    /// [`Errno::Destroyed`] at its next scheduling point.
    pub fn destroy(&self) -> Result<()> {
        let waiters = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return_errno!(Errno::Destroyed);
            }
            inner.destroyed = true;
            drain_waiters(&self.waiters)
        };
        for waiter in waiters {
            sched::release_thread(&waiter);
        }
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// The number of blocked waiters.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    fn is_owned_by(&self, thread: &Arc<Thread>) -> bool {
        self.inner
            .lock()
            .owner
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|owner| Arc::ptr_eq(&owner, thread))
    }

    fn grant(&self, inner: &mut MutexInner, owner: &Arc<Thread>) {
        inner.owner = Some(Arc::downgrade(owner));
        inner.depth = 1;
        if self.inheritance() {
            inner.saved_priority = Some(owner.static_priority());
        }
    }

    fn highest_waiter_priority(&self) -> Option<Priority> {
        let mut best: Option<Priority> = None;
        self.waiters.for_each(|waiter| {
            if let Some(waiter) = waiter.upgrade() {
                let priority = waiter.static_priority();
                if best.map_or(true, |b| priority.is_higher_than(b)) {
                    best = Some(priority);
                }
            }
        });
        best
    }
}
