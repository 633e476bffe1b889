// SPDX-License-Identifier: MPL-2.0

//! The thread-info filesystem.
//!
//! A read-only directory registered at `/sys/threads`: one entry per live
//! thread, named by its decimal tid. Reading an entry produces a fixed
//! text block describing the thread. Writes and ioctls are not supported.

use core::fmt::Write;

use super::{
    dir_driver::DirCursor,
    driver::{DirEntry, DirEntryType, Driver, DriverHandle, OpenFlags},
};
use crate::{
    prelude::*,
    thread::{thread_table, ThreadKind, ThreadSnapshot},
};

pub(crate) const THREADS_PATH: &str = "/sys/threads";

#[derive(Debug)]
pub(crate) struct ThreadFs;

struct TextFile {
    content: String,
}

fn render(snapshot: &ThreadSnapshot) -> String {
    let mut text = String::new();
    let kind = match snapshot.kind {
        ThreadKind::Kernel => "kernel",
        ThreadKind::User => "user",
    };
    let _ = writeln!(text, "id: {}", snapshot.tid);
    let _ = writeln!(text, "name: {}", snapshot.name.as_str());
    let _ = writeln!(text, "priority: {}", snapshot.priority);
    let _ = writeln!(text, "type: {}", kind);
    let _ = writeln!(text, "state: {}", snapshot.state.as_str());
    let _ = writeln!(text, "affinity: {:#x}", snapshot.affinity);
    let _ = writeln!(text, "cpu: {}", snapshot.cpu);
    text
}

impl Driver for ThreadFs {
    fn open(&self, relpath: &str, _flags: OpenFlags, _mode: u32) -> Result<DriverHandle> {
        if relpath.is_empty() {
            let entries = thread_table::tids()
                .into_iter()
                .map(|tid| DirEntry::new(&format!("{}", tid), DirEntryType::File))
                .collect();
            return Ok(Arc::new(DirCursor::new(entries)));
        }
        let tid = relpath
            .parse()
            .map_err(|_| Error::with_message(Errno::IncorrectValue, "not a thread id"))?;
        let snapshot = thread_table::snapshot_of(tid)
            .ok_or(Error::with_message(Errno::NoSuchId, "no such thread"))?;
        Ok(Arc::new(TextFile {
            content: render(&snapshot),
        }))
    }

    fn read(&self, handle: &DriverHandle, buf: &mut [u8]) -> Result<usize> {
        let file = handle.downcast_ref::<TextFile>().ok_or(Error::with_message(
            Errno::IncorrectValue,
            "reading a directory of threadfs",
        ))?;
        let bytes = file.content.as_bytes();
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }

    fn readdir(&self, handle: &DriverHandle) -> Result<Option<DirEntry>> {
        let cursor = handle.downcast_ref::<DirCursor>().ok_or(Error::with_message(
            Errno::IncorrectValue,
            "listing a file of threadfs",
        ))?;
        Ok(cursor.next())
    }
}

pub(crate) fn register() {
    super::register_driver(THREADS_PATH, Arc::new(ThreadFs))
        .expect("registering threadfs at boot cannot fail");
}
