// SPDX-License-Identifier: MPL-2.0

//! The file-system registry.
//!
//! Named file-system types register themselves once at boot; `mount` and
//! `unmount` are a thin layer that asks the named type for a driver and
//! attaches it to the mount tree.

use super::driver::Driver;
use crate::prelude::*;

/// A named file system that can be mounted.
pub trait FileSystemType: Send + Sync + core::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Produces the driver (and its private mount data) for one mount.
    fn mount(&self, args: &str) -> Result<Arc<dyn Driver>>;
}

lazy_static! {
    static ref FS_TYPES: SpinLock<Vec<&'static dyn FileSystemType>> = SpinLock::new(Vec::new());
}

/// Registers a file-system type under its name.
pub fn register_filesystem(fs: &'static dyn FileSystemType) -> Result<()> {
    let mut types = FS_TYPES.lock();
    if types.iter().any(|t| t.name() == fs.name()) {
        return_errno_with_message!(Errno::IncorrectValue, "the filesystem name is taken");
    }
    types.push(fs);
    Ok(())
}

pub(crate) fn find(name: &str) -> Result<&'static dyn FileSystemType> {
    FS_TYPES
        .lock()
        .iter()
        .copied()
        .find(|t| t.name() == name)
        .ok_or(Error::with_message(Errno::NoSuchId, "no such filesystem"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fs::driver::Driver;

    #[derive(Debug)]
    struct NopFs;
    #[derive(Debug)]
    struct NopDriver;
    impl Driver for NopDriver {}
    impl FileSystemType for NopFs {
        fn name(&self) -> &'static str {
            "nopfs"
        }
        fn mount(&self, _args: &str) -> Result<Arc<dyn Driver>> {
            Ok(Arc::new(NopDriver))
        }
    }

    static NOPFS: NopFs = NopFs;

    #[test]
    fn registration_is_unique_by_name() {
        register_filesystem(&NOPFS).unwrap();
        assert_eq!(
            register_filesystem(&NOPFS).unwrap_err().error(),
            Errno::IncorrectValue
        );
        assert!(find("nopfs").is_ok());
        assert_eq!(find("missing").unwrap_err().error(), Errno::NoSuchId);
    }
}
