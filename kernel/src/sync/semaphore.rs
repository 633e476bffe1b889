// SPDX-License-Identifier: MPL-2.0

//! Counting semaphores.

use super::{dequeue_waiter, drain_waiters, enqueue_waiter, SyncFlags};
use crate::{
    prelude::*,
    sched,
    thread::{BlockKind, Thread},
};

struct SemInner {
    level: i32,
    // 0 means unbounded.
    max_level: i32,
    destroyed: bool,
}

/// A counting semaphore.
///
/// `post` wakes the highest-priority waiter under the (default) priority
/// discipline, the earliest-enqueued one under FIFO. Waiters blocked on a
/// destroyed semaphore return [`Errno::Destroyed`] exactly once.
pub struct Semaphore {
    inner: SpinLock<SemInner>,
    waiters: PrioQueue<Weak<Thread>>,
    flags: SyncFlags,
}

impl Semaphore {
    /// Creates a semaphore with `init_level` permits and no upper bound.
    pub fn new(init_level: i32, flags: SyncFlags) -> Result<Self> {
        Self::with_max_level(init_level, 0, flags)
    }

    /// Creates a semaphore bounded at `max_level` permits (0 = unbounded).
    pub fn with_max_level(init_level: i32, max_level: i32, flags: SyncFlags) -> Result<Self> {
        if init_level < 0 || max_level < 0 || (max_level > 0 && init_level > max_level) {
            return_errno_with_message!(Errno::IncorrectValue, "invalid semaphore level");
        }
        flags.validate_queue_discipline()?;
        Ok(Self {
            inner: SpinLock::new(SemInner {
                level: init_level,
                max_level,
                destroyed: false,
            }),
            waiters: PrioQueue::new(),
            flags,
        })
    }

    /// Takes a permit, blocking until one is posted.
    ///
    /// Not allowed from an idle context.
    pub fn wait(&self) -> Result<()> {
        let current = Thread::current().ok_or(Error::with_message(
            Errno::UnauthorizedAction,
            "idle cannot wait on a semaphore",
        ))?;
        {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return_errno!(Errno::Destroyed);
            }
            if inner.level > 0 {
                inner.level -= 1;
                return Ok(());
            }
            super::mark_current_waiting(&current, BlockKind::Semaphore);
            enqueue_waiter(&self.waiters, &current, self.flags);
        }
        sched::schedule();
        // Woken either by a post (the permit was handed to us directly)
        // or by destroy.
        if self.inner.lock().destroyed {
            return_errno!(Errno::Destroyed);
        }
        Ok(())
    }

    /// Takes a permit if one is available, without blocking.
    ///
    /// Returns the pre-decrement level on success and
    /// [`Errno::WouldBlock`] if the call would have had to wait.
    pub fn try_wait(&self) -> Result<i32> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return_errno!(Errno::Destroyed);
        }
        if inner.level > 0 {
            let observed = inner.level;
            inner.level -= 1;
            return Ok(observed);
        }
        return_errno!(Errno::WouldBlock);
    }

    /// Posts a permit: hands it to a waiter if any, otherwise increments
    /// the level, clamped at the configured maximum.
    pub fn post(&self) -> Result<()> {
        let waiter = {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return_errno!(Errno::Destroyed);
            }
            match dequeue_waiter(&self.waiters) {
                Some(waiter) => Some(waiter),
                None => {
                    if inner.max_level == 0 || inner.level < inner.max_level {
                        inner.level += 1;
                    }
                    None
                }
            }
        };
        if let Some(waiter) = waiter {
            sched::release_thread(&waiter);
        }
        Ok(())
    }

    /// Destroys the semaphore: every blocked waiter is released and
    /// observes [`Errno::Destroyed`] at its next scheduling point.
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

    /// The current level. Advisory: it may change before the caller acts
    /// on it.
    pub fn level(&self) -> i32 {
        self.inner.lock().level
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// The number of blocked waiters.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn try_wait_counts_down() {
        crate::init(1);
        let sem = Semaphore::new(2, SyncFlags::empty()).unwrap();
        assert_eq!(sem.try_wait().unwrap(), 2);
        assert_eq!(sem.try_wait().unwrap(), 1);
        assert_eq!(
            sem.try_wait().unwrap_err().error(),
            Errno::WouldBlock
        );
        assert_eq!(sem.level(), 0);
    }

    #[test]
    fn post_clamps_at_max_level() {
        crate::init(1);
        let sem = Semaphore::with_max_level(1, 2, SyncFlags::empty()).unwrap();
        sem.post().unwrap();
        assert_eq!(sem.level(), 2);
        // A post on a full semaphore succeeds and leaves the level alone.
        sem.post().unwrap();
        assert_eq!(sem.level(), 2);
    }

    #[test]
    fn invalid_levels_rejected() {
        crate::init(1);
        assert!(Semaphore::new(-1, SyncFlags::empty()).is_err());
        assert!(Semaphore::with_max_level(5, 2, SyncFlags::empty()).is_err());
        assert!(Semaphore::new(
            0,
            SyncFlags::QUEUE_FIFO | SyncFlags::QUEUE_PRIORITY
        )
        .is_err());
    }

    #[test]
    fn destroyed_semaphore_rejects_everything() {
        crate::init(1);
        let sem = Semaphore::new(1, SyncFlags::empty()).unwrap();
        sem.destroy().unwrap();
        assert_eq!(sem.destroy().unwrap_err().error(), Errno::Destroyed);
        assert_eq!(sem.try_wait().unwrap_err().error(), Errno::Destroyed);
        assert_eq!(sem.post().unwrap_err().error(), Errno::Destroyed);
    }
}
