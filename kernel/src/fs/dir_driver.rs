// SPDX-License-Identifier: MPL-2.0

//! The generic VFS driver.
//!
//! Serves opens that land on a pure directory of the mount tree (a
//! transient node with children but no driver of its own). It answers
//! `open`, `close` and `readdir` only; everything else keeps the trait
//! defaults and surfaces as unsupported.

use super::driver::{DirEntry, Driver, DriverHandle};
use crate::prelude::*;

/// A cursor over a snapshot of directory entries.
pub(crate) struct DirCursor {
    entries: Vec<DirEntry>,
    pos: SpinLock<usize>,
}

impl DirCursor {
    pub(crate) fn new(entries: Vec<DirEntry>) -> Self {
        Self {
            entries,
            pos: SpinLock::new(0),
        }
    }

    pub(crate) fn next(&self) -> Option<DirEntry> {
        let mut pos = self.pos.lock();
        let entry = self.entries.get(*pos).cloned()?;
        *pos += 1;
        Some(entry)
    }
}

#[derive(Debug)]
pub(crate) struct DirDriver;

impl DirDriver {
    /// Opens a cursor over a ready-made snapshot of children. The VFS
    /// resolves the node and takes the snapshot; the driver itself never
    /// touches the tree.
    pub(crate) fn open_entries(entries: Vec<DirEntry>) -> DriverHandle {
        Arc::new(DirCursor::new(entries))
    }
}

impl Driver for DirDriver {
    fn readdir(&self, handle: &DriverHandle) -> Result<Option<DirEntry>> {
        let cursor = handle
            .downcast_ref::<DirCursor>()
            .ok_or(Error::with_message(
                Errno::IncorrectValue,
                "foreign handle passed to the directory driver",
            ))?;
        Ok(cursor.next())
    }
}
