// SPDX-License-Identifier: MPL-2.0

//! Per-process file-descriptor tables.
//!
//! A descriptor is an index into a dense slot vector; free slots are
//! chained through the intrusive queue so allocation is O(1) and
//! first-come. The state an open produced (path, driver, driver handle)
//! is shared between duplicated tables and reference counted explicitly,
//! so the driver's `close` runs exactly when the last descriptor pointing
//! at it goes away.

use super::driver::{Driver, DriverHandle, OpenFlags};
use crate::prelude::*;

/// The number of descriptors in every table.
pub const FD_TABLE_SIZE: usize = 128;

/// The state shared by every descriptor that refers to one open.
pub struct SharedFd {
    // The full absolute path of the opened object.
    path: String,
    driver: Arc<dyn Driver>,
    inner: SpinLock<SharedFdInner>,
}

impl core::fmt::Debug for SharedFd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedFd")
            .field("path", &self.path)
            .field("driver", &self.driver)
            .finish()
    }
}

struct SharedFdInner {
    handle: Option<DriverHandle>,
    ref_count: usize,
}

impl SharedFd {
    pub(crate) fn new(path: String, driver: Arc<dyn Driver>, handle: DriverHandle) -> Self {
        Self {
            path,
            driver,
            inner: SpinLock::new(SharedFdInner {
                handle: Some(handle),
                ref_count: 1,
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Clones out the driver handle for an I/O dispatch.
    pub(crate) fn handle(&self) -> Result<DriverHandle> {
        self.inner
            .lock()
            .handle
            .clone()
            .ok_or(Error::with_message(Errno::NullPointer, "the open is gone"))
    }

    fn retain(&self) {
        self.inner.lock().ref_count += 1;
    }

    /// Drops one reference; on the last one the handle comes back so the
    /// caller can run the driver's `close` outside any lock.
    fn release(&self) -> Option<DriverHandle> {
        let mut inner = self.inner.lock();
        debug_assert!(inner.ref_count > 0);
        inner.ref_count -= 1;
        if inner.ref_count == 0 {
            inner.handle.take()
        } else {
            None
        }
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.inner.lock().ref_count
    }
}

/// One descriptor of one process.
#[derive(Clone, Debug)]
pub struct FdEntry {
    flags: OpenFlags,
    mode: u32,
    shared: Arc<SharedFd>,
}

impl FdEntry {
    pub(crate) fn new(flags: OpenFlags, mode: u32, shared: Arc<SharedFd>) -> Self {
        Self {
            flags,
            mode,
            shared,
        }
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub(crate) fn shared(&self) -> &Arc<SharedFd> {
        &self.shared
    }
}

struct TableInner {
    slots: Vec<Option<FdEntry>>,
    // One permanent node per slot, moved between the free queue and
    // nowhere.
    nodes: Vec<Arc<PrioNode<usize>>>,
}

/// A per-process descriptor table.
pub struct FdTable {
    inner: SpinLock<TableInner>,
    free: PrioQueue<usize>,
}

impl FdTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(FD_TABLE_SIZE);
        let mut nodes = Vec::with_capacity(FD_TABLE_SIZE);
        let free = PrioQueue::new();
        for idx in 0..FD_TABLE_SIZE {
            slots.push(None);
            let node = PrioNode::new(idx);
            free.push(node.clone()).expect("fresh fd node enlisted");
            nodes.push(node);
        }
        Self {
            inner: SpinLock::new(TableInner { slots, nodes }),
            free,
        }
    }

    /// Installs `entry` in the next slot off the free pool and returns
    /// the descriptor.
    pub(crate) fn install(&self, entry: FdEntry) -> Result<usize> {
        let mut inner = self.inner.lock();
        let Some(node) = self.free.pop() else {
            return_errno_with_message!(Errno::OutOfMemory, "the fd table is exhausted");
        };
        let fd = *node.payload();
        debug_assert!(inner.slots[fd].is_none());
        inner.slots[fd] = Some(entry);
        Ok(fd)
    }

    /// Looks a descriptor up.
    pub fn get(&self, fd: usize) -> Result<FdEntry> {
        self.inner
            .lock()
            .slots
            .get(fd)
            .and_then(|slot| slot.clone())
            .ok_or(Error::with_message(Errno::NoSuchId, "no such descriptor"))
    }

    /// Closes a descriptor: the slot empties and returns to the free
    /// pool; the driver's `close` runs iff this was the last reference to
    /// the shared state.
    pub fn close(&self, fd: usize) -> Result<()> {
        let entry = {
            let mut inner = self.inner.lock();
            inner
                .slots
                .get_mut(fd)
                .and_then(Option::take)
                .ok_or(Error::with_message(Errno::NoSuchId, "no such descriptor"))?
        };
        let result = match entry.shared.release() {
            Some(handle) => entry.shared.driver().close(handle),
            None => Ok(()),
        };
        let node = self.inner.lock().nodes[fd].clone();
        self.free.push(node).expect("freed fd node already enlisted");
        result
    }

    /// Deep-copies the per-process entries while sharing (and retaining)
    /// the underlying opens; the fork-time duplication.
    pub fn duplicate(&self) -> FdTable {
        let table = FdTable::new();
        let source = self.inner.lock();
        {
            let mut target = table.inner.lock();
            for (fd, slot) in source.slots.iter().enumerate() {
                let Some(entry) = slot else { continue };
                entry.shared.retain();
                target.slots[fd] = Some(entry.clone());
                table
                    .free
                    .remove(&target.nodes[fd], true)
                    .expect("free node of an occupied slot is missing");
            }
        }
        drop(source);
        table
    }

    /// Closes every open descriptor.
    pub fn close_all(&self) {
        for fd in 0..FD_TABLE_SIZE {
            let _ = self.close(fd);
        }
    }

    pub fn open_count(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FdTable {
    fn drop(&mut self) {
        self.close_all();
        // Drain the free pool so the queue drops empty.
        while self.free.pop().is_some() {}
    }
}

#[cfg(test)]
mod test {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug)]
    struct CountingDriver {
        closes: AtomicUsize,
    }

    impl Driver for CountingDriver {
        fn close(&self, _handle: DriverHandle) -> Result<()> {
            self.closes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn entry_on(driver: &Arc<CountingDriver>) -> FdEntry {
        let shared = Arc::new(SharedFd::new(
            "/dev/null".to_string(),
            driver.clone() as Arc<dyn Driver>,
            Arc::new(()),
        ));
        FdEntry::new(OpenFlags::READ, 0, shared)
    }

    fn counting_driver() -> Arc<CountingDriver> {
        Arc::new(CountingDriver {
            closes: AtomicUsize::new(0),
        })
    }

    #[test]
    fn descriptors_allocate_lowest_first() {
        let table = FdTable::new();
        let driver = counting_driver();
        assert_eq!(table.install(entry_on(&driver)).unwrap(), 0);
        assert_eq!(table.install(entry_on(&driver)).unwrap(), 1);
        table.close(0).unwrap();
        // The freed slot recycles after the untouched tail of the pool.
        let next = table.install(entry_on(&driver)).unwrap();
        assert!(table.get(next).is_ok());
        assert_eq!(table.get(77).unwrap_err().error(), Errno::NoSuchId);
    }

    #[test]
    fn close_runs_driver_close_once() {
        let table = FdTable::new();
        let driver = counting_driver();
        let fd = table.install(entry_on(&driver)).unwrap();
        table.close(fd).unwrap();
        assert_eq!(driver.closes.load(Ordering::Relaxed), 1);
        assert_eq!(table.close(fd).unwrap_err().error(), Errno::NoSuchId);
        assert_eq!(driver.closes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn duplication_shares_the_open() {
        let table = FdTable::new();
        let driver = counting_driver();
        let fd = table.install(entry_on(&driver)).unwrap();

        let copy = table.duplicate();
        assert_eq!(copy.get(fd).unwrap().shared().ref_count(), 2);

        table.close(fd).unwrap();
        assert_eq!(driver.closes.load(Ordering::Relaxed), 0);
        copy.close(fd).unwrap();
        assert_eq!(driver.closes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn table_exhaustion_reports_out_of_memory() {
        let table = FdTable::new();
        let driver = counting_driver();
        for _ in 0..FD_TABLE_SIZE {
            table.install(entry_on(&driver)).unwrap();
        }
        assert_eq!(
            table.install(entry_on(&driver)).unwrap_err().error(),
            Errno::OutOfMemory
        );
        table.close_all();
        assert_eq!(driver.closes.load(Ordering::Relaxed), FD_TABLE_SIZE);
    }
}
