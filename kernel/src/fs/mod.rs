// SPDX-License-Identifier: MPL-2.0

//! The virtual file system.
//!
//! A mount-point tree multiplexes pluggable drivers behind one
//! open/close/read/write/readdir/ioctl surface. Descriptors live in
//! per-process tables; opens that land on a pure directory of the tree
//! are served by the built-in directory driver.

mod dir_driver;
mod driver;
mod file_table;
mod mount_tree;
mod registry;
mod threadfs;

pub use crate::error::Result;
pub use driver::{DirEntry, DirEntryType, Driver, DriverHandle, OpenFlags, MAX_NAME_LEN};
pub use file_table::{FdEntry, FdTable, SharedFd, FD_TABLE_SIZE};
pub use mount_tree::clean_path;
pub use registry::{register_filesystem, FileSystemType};

use self::{
    dir_driver::DirDriver,
    file_table::FdEntry as Entry,
    mount_tree::{MountTree, OpenTarget},
};
use crate::{prelude::*, thread::Thread};

lazy_static! {
    static ref MOUNT_TREE: SpinLock<MountTree> = SpinLock::new(MountTree::new());
    static ref DIR_DRIVER: Arc<dyn Driver> = Arc::new(DirDriver);
    // The descriptor table used from contexts that belong to no thread
    // (early boot, the idle loops).
    static ref KERNEL_FD_TABLE: Arc<FdTable> = Arc::new(FdTable::new());
}

pub(crate) fn init() {
    lazy_static::initialize(&MOUNT_TREE);
    lazy_static::initialize(&KERNEL_FD_TABLE);
    threadfs::register();
}

/// Returns the calling context's descriptor table: the current thread's,
/// or the kernel table from an idle context.
pub fn current_fd_table() -> Arc<FdTable> {
    Thread::current()
        .map(|thread| thread.fd_table().clone())
        .unwrap_or_else(|| KERNEL_FD_TABLE.clone())
}

/// Attaches `driver` at `path`, creating transient intermediates as
/// needed. Fails if the exact path already mounts a driver.
pub fn register_driver(path: &str, driver: Arc<dyn Driver>) -> Result<()> {
    let cleaned = clean_path(path)?;
    MOUNT_TREE.lock().register(&cleaned, driver)
}

/// Detaches the driver at `path` and prunes subtrees left driverless.
pub fn unregister_driver(path: &str) -> Result<()> {
    let cleaned = clean_path(path)?;
    MOUNT_TREE.lock().unregister(&cleaned).map(|_| ())
}

/// Mounts the registered file system named `fstype` at `path`.
pub fn mount(fstype: &str, path: &str, args: &str) -> Result<()> {
    let fs = registry::find(fstype)?;
    let driver = fs.mount(args)?;
    register_driver(path, driver)
}

/// Unmounts whatever is mounted at exactly `path`, notifying its driver
/// first.
pub fn unmount(path: &str) -> Result<()> {
    let cleaned = clean_path(path)?;
    let driver = {
        let tree = MOUNT_TREE.lock();
        tree.driver_at(&cleaned)
            .ok_or(Error::with_message(Errno::NoSuchId, "no such mount point"))?
    };
    driver.unmount()?;
    unregister_driver(&cleaned)
}

/// Opens `path` and returns a descriptor in the caller's table.
pub fn open(path: &str, flags: OpenFlags, mode: u32) -> Result<usize> {
    let cleaned = clean_path(path)?;
    let target = MOUNT_TREE.lock().resolve_open(&cleaned)?;
    let (driver, handle) = match target {
        OpenTarget::Driver { driver, relpath } => {
            let handle = driver.open(&relpath, flags, mode)?;
            (driver, handle)
        }
        OpenTarget::Directory { entries } => {
            (DIR_DRIVER.clone(), DirDriver::open_entries(entries))
        }
    };
    let shared = Arc::new(SharedFd::new(cleaned, driver, handle));
    current_fd_table().install(Entry::new(flags, mode, shared))
}

/// Closes a descriptor of the caller's table.
pub fn close(fd: usize) -> Result<()> {
    current_fd_table().close(fd)
}

/// Reads from an open descriptor. Requires the read permission bit.
pub fn read(fd: usize, buf: &mut [u8]) -> Result<usize> {
    let (driver, handle) = checked_dispatch(fd, OpenFlags::READ)?;
    driver.read(&handle, buf)
}

/// Writes to an open descriptor. Requires the write permission bit.
pub fn write(fd: usize, buf: &[u8]) -> Result<usize> {
    let (driver, handle) = checked_dispatch(fd, OpenFlags::WRITE)?;
    driver.write(&handle, buf)
}

/// Produces the next directory entry of an open descriptor, or `None` at
/// the end of the stream. Requires the read permission bit.
pub fn readdir(fd: usize) -> Result<Option<DirEntry>> {
    let (driver, handle) = checked_dispatch(fd, OpenFlags::READ)?;
    driver.readdir(&handle)
}

/// Dispatches an opaque ioctl to the driver behind the descriptor.
/// Requires the read permission bit.
pub fn ioctl(fd: usize, cmd: u32, arg: usize) -> Result<usize> {
    let (driver, handle) = checked_dispatch(fd, OpenFlags::READ)?;
    driver.ioctl(&handle, cmd, arg)
}

fn checked_dispatch(fd: usize, required: OpenFlags) -> Result<(Arc<dyn Driver>, DriverHandle)> {
    let entry = current_fd_table().get(fd)?;
    if !entry.flags().contains(required) {
        return_errno_with_message!(
            Errno::UnauthorizedAction,
            "the descriptor lacks the required permission"
        );
    }
    let driver = entry.shared().driver().clone();
    let handle = entry.shared().handle()?;
    Ok((driver, handle))
}
