// SPDX-License-Identifier: MPL-2.0

//! The intrusive priority queue.
//!
//! This is the one queue flavor shared by the scheduler (ready lists, the
//! sleep list, the zombie list), the synchronization primitives (waiter
//! lists) and the VFS (free descriptor slots). A [`PrioNode`] belongs to at
//! most one queue at a time; membership is tagged on the node and checked
//! on every mutation.
//!
//! The list is kept in descending key order from head to tail:
//!
//! - [`PrioQueue::push`] inserts at the head, ignoring keys. Paired with
//!   the tail-side [`PrioQueue::pop`] this yields plain FIFO service.
//! - [`PrioQueue::push_prio`] inserts in key order. Among equal keys the
//!   FIFO pop order is preserved: a new node goes in front of (headward of)
//!   the nodes already carrying its key.
//! - [`PrioQueue::pop`] removes the tail, i.e. the node with the smallest
//!   key, oldest first.
//!
//! All operations take the queue's internal spin lock for their duration;
//! consumers already running with interrupts masked nest it as a leaf lock.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use intrusive_collections::{intrusive_adapter, LinkedList, LinkedListAtomicLink};

use crate::{prelude::*, sync::SpinLock, Error};

/// A node that can be enlisted in one [`PrioQueue`].
pub struct PrioNode<T> {
    link: LinkedListAtomicLink,
    // The ordering key; doubles as a scheduling priority and as a wake-up
    // deadline depending on the queue.
    key: AtomicU64,
    // The id of the queue this node currently belongs to, or 0.
    home: AtomicUsize,
    payload: T,
}

intrusive_adapter!(pub PrioAdapter<T> = Arc<PrioNode<T>>: PrioNode<T> { link: LinkedListAtomicLink });

impl<T> PrioNode<T> {
    pub fn new(payload: T) -> Arc<Self> {
        Arc::new(Self {
            link: LinkedListAtomicLink::new(),
            key: AtomicU64::new(0),
            home: AtomicUsize::new(0),
            payload,
        })
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Returns the key assigned by the last `push_prio`.
    pub fn key(&self) -> u64 {
        self.key.load(Ordering::Relaxed)
    }

    /// Returns whether the node currently belongs to a queue.
    pub fn is_enlisted(&self) -> bool {
        self.home.load(Ordering::Relaxed) != 0
    }
}

struct Inner<T> {
    list: LinkedList<PrioAdapter<T>>,
    len: usize,
}

/// An intrusive queue of [`PrioNode`]s ordered by key.
pub struct PrioQueue<T> {
    id: usize,
    inner: SpinLock<Inner<T>>,
}

static NEXT_QUEUE_ID: AtomicUsize = AtomicUsize::new(1);

impl<T> PrioQueue<T> {
    pub fn new() -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            inner: SpinLock::new(Inner {
                list: LinkedList::new(PrioAdapter::new()),
                len: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `node` at the head of the queue.
    ///
    /// Fails with `InvalidArgs` if the node is already enlisted somewhere.
    pub fn push(&self, node: Arc<PrioNode<T>>) -> Result<()> {
        let mut inner = self.inner.lock();
        self.enlist(&node)?;
        inner.list.push_front(node);
        inner.len += 1;
        debug_assert!(self.consistent(&inner));
        Ok(())
    }

    /// Sets `node.key = key` and inserts the node in descending key order,
    /// keeping the FIFO pop order among nodes with equal keys.
    pub fn push_prio(&self, node: Arc<PrioNode<T>>, key: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        self.enlist(&node)?;
        node.key.store(key, Ordering::Relaxed);
        let mut cursor = inner.list.front_mut();
        while let Some(current) = cursor.get() {
            if current.key.load(Ordering::Relaxed) <= key {
                break;
            }
            cursor.move_next();
        }
        // A null cursor means every key was larger; `insert_before` then
        // appends at the tail.
        cursor.insert_before(node);
        inner.len += 1;
        debug_assert!(self.consistent(&inner));
        Ok(())
    }

    /// Removes and returns the tail node, or `None` on an empty queue.
    pub fn pop(&self) -> Option<Arc<PrioNode<T>>> {
        let mut inner = self.inner.lock();
        let node = inner.list.pop_back()?;
        node.home.store(0, Ordering::Relaxed);
        inner.len -= 1;
        debug_assert!(self.consistent(&inner));
        Some(node)
    }

    /// Removes and returns the tail node if `pred(key, payload)` accepts
    /// it. Used by deadline scans that stop at the first future deadline.
    pub fn pop_if<F>(&self, pred: F) -> Option<Arc<PrioNode<T>>>
    where
        F: FnOnce(u64, &T) -> bool,
    {
        let mut inner = self.inner.lock();
        {
            let back = inner.list.back();
            let node = back.get()?;
            if !pred(node.key.load(Ordering::Relaxed), &node.payload) {
                return None;
            }
        }
        let node = inner.list.pop_back().unwrap();
        node.home.store(0, Ordering::Relaxed);
        inner.len -= 1;
        Some(node)
    }

    /// Visits every payload, head to tail.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&T),
    {
        let inner = self.inner.lock();
        let mut cursor = inner.list.front();
        while let Some(node) = cursor.get() {
            visit(&node.payload);
            cursor.move_next();
        }
    }

    /// Linearly scans for a node whose payload matches `pred`.
    pub fn find_by<F>(&self, mut pred: F) -> Option<Arc<PrioNode<T>>>
    where
        F: FnMut(&T) -> bool,
    {
        let inner = self.inner.lock();
        let mut cursor = inner.list.front();
        while let Some(node) = cursor.get() {
            if pred(&node.payload) {
                return cursor.clone_pointer();
            }
            cursor.move_next();
        }
        None
    }

    /// Unlinks `node` from the queue.
    ///
    /// If the node does not belong to this queue, panics when
    /// `panic_if_absent` is set (an invariant violation) and returns
    /// `NotFound` otherwise.
    pub fn remove(&self, node: &Arc<PrioNode<T>>, panic_if_absent: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        if node.home.load(Ordering::Relaxed) != self.id {
            if panic_if_absent {
                panic!("removing a node that is absent from the queue");
            }
            return Err(Error::NotFound);
        }
        // SAFETY: the home tag says the node is in this list, the tag is
        // only ever changed under this queue's lock, and we hold the lock.
        let mut cursor = unsafe { inner.list.cursor_mut_from_ptr(node.as_ref()) };
        let removed = cursor.remove().expect("home-tagged node must be linked");
        removed.home.store(0, Ordering::Relaxed);
        inner.len -= 1;
        debug_assert!(self.consistent(&inner));
        Ok(())
    }

    fn enlist(&self, node: &Arc<PrioNode<T>>) -> Result<()> {
        if node.link.is_linked() || node.home.load(Ordering::Relaxed) != 0 {
            return Err(Error::InvalidArgs);
        }
        node.home.store(self.id, Ordering::Relaxed);
        Ok(())
    }

    // Head/tail/size consistency, checked after every mutation in debug
    // builds.
    fn consistent(&self, inner: &Inner<T>) -> bool {
        (inner.len == 0) == inner.list.is_empty()
    }
}

impl<T> Default for PrioQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for PrioQueue<T> {
    fn drop(&mut self) {
        // Dropping a non-empty queue would leave enlisted nodes pointing at
        // freed storage bookkeeping.
        assert!(
            self.inner.lock().list.is_empty(),
            "destroying a non-empty queue"
        );
    }
}
