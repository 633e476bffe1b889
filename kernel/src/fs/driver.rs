// SPDX-License-Identifier: MPL-2.0

//! The driver interface of the VFS.

use crate::prelude::*;

/// The maximum length of a directory entry name, in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// An opaque per-open handle a driver hands back from [`Driver::open`] and
/// receives in every subsequent operation. Drivers downcast it to their
/// own cursor or file state.
pub type DriverHandle = Arc<dyn Any + Send + Sync>;

bitflags! {
    /// Open flags.
    ///
    /// `READ` permits read, readdir and ioctl; `WRITE` permits write.
    /// Unrecognized bits are ignored but preserved on the descriptor.
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READWRITE = Self::READ.bits | Self::WRITE.bits;
    }
}

/// The type of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirEntryType {
    File,
    Directory,
}

/// One entry produced by a readdir.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    name: String,
    entry_type: DirEntryType,
}

impl DirEntry {
    /// Creates an entry, truncating the name to [`MAX_NAME_LEN`] bytes.
    pub fn new(name: &str, entry_type: DirEntryType) -> Self {
        let mut end = name.len().min(MAX_NAME_LEN);
        while end > 0 && !name.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            name: name[..end].to_string(),
            entry_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_type(&self) -> DirEntryType {
        self.entry_type
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == DirEntryType::Directory
    }
}

/// The operations a file-system or device driver plugs into the VFS.
///
/// A missing operation keeps its default body and surfaces as
/// [`Errno::NotSupported`] to callers. `relpath` is the opened path with
/// the driver's mount prefix stripped; the mount point itself arrives as
/// an empty string.
pub trait Driver: Send + Sync + core::fmt::Debug {
    fn open(&self, relpath: &str, flags: OpenFlags, mode: u32) -> Result<DriverHandle> {
        let (_, _, _) = (relpath, flags, mode);
        return_errno_with_message!(Errno::NotSupported, "the driver cannot open");
    }

    fn close(&self, handle: DriverHandle) -> Result<()> {
        let _ = handle;
        Ok(())
    }

    fn read(&self, handle: &DriverHandle, buf: &mut [u8]) -> Result<usize> {
        let (_, _) = (handle, buf);
        return_errno_with_message!(Errno::NotSupported, "the driver cannot read");
    }

    fn write(&self, handle: &DriverHandle, buf: &[u8]) -> Result<usize> {
        let (_, _) = (handle, buf);
        return_errno_with_message!(Errno::NotSupported, "the driver cannot write");
    }

    /// Produces the next entry, or `Ok(None)` at the end of the stream.
    fn readdir(&self, handle: &DriverHandle) -> Result<Option<DirEntry>> {
        let _ = handle;
        return_errno_with_message!(Errno::NotSupported, "the driver cannot readdir");
    }

    fn ioctl(&self, handle: &DriverHandle, cmd: u32, arg: usize) -> Result<usize> {
        let (_, _, _) = (handle, cmd, arg);
        return_errno_with_message!(Errno::NotSupported, "the driver has no ioctls");
    }

    /// Called right before the driver is unregistered from its mount
    /// point.
    fn unmount(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug)]
    struct NullDriver;
    impl Driver for NullDriver {}

    #[test]
    fn defaults_surface_not_supported() {
        let driver = NullDriver;
        let handle: DriverHandle = Arc::new(());
        assert_eq!(
            driver.open("", OpenFlags::READ, 0).unwrap_err().error(),
            Errno::NotSupported
        );
        assert_eq!(
            driver.read(&handle, &mut []).unwrap_err().error(),
            Errno::NotSupported
        );
        assert_eq!(
            driver.readdir(&handle).unwrap_err().error(),
            Errno::NotSupported
        );
        assert!(driver.close(handle).is_ok());
    }

    #[test]
    fn dir_entry_name_bounded() {
        let entry = DirEntry::new(&"n".repeat(100), DirEntryType::File);
        assert_eq!(entry.name().len(), MAX_NAME_LEN);
        assert!(!entry.is_dir());
    }
}
