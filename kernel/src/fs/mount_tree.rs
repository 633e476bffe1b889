// SPDX-License-Identifier: MPL-2.0

//! The mount-point tree.
//!
//! A rooted tree of path-segment nodes. A node carrying a driver is a
//! mount point; a node without one is a transient intermediate (a pure
//! directory). Siblings are ordered by (segment length, lexicographic
//! segment), and every node caches the absolute offset from the root
//! through the end of its own segment, which makes peeling the mount
//! prefix off an opened path a slice operation.

use super::driver::{DirEntry, DirEntryType, Driver};
use crate::prelude::*;

/// The path delimiter.
pub const DELIMITER: char = '/';

/// Canonicalizes `path`: the leading delimiter is required, consecutive
/// delimiters collapse, trailing delimiters are stripped. `.` and `..`
/// components are not part of the path language.
pub fn clean_path(path: &str) -> Result<String> {
    if !path.starts_with(DELIMITER) {
        return_errno_with_message!(Errno::IncorrectValue, "a path must be absolute");
    }
    let mut cleaned = String::with_capacity(path.len());
    for segment in path.split(DELIMITER).filter(|s| !s.is_empty()) {
        cleaned.push(DELIMITER);
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        cleaned.push(DELIMITER);
    }
    Ok(cleaned)
}

struct Node {
    segment: String,
    // Absolute offset from the root through the end of this segment.
    offset: usize,
    driver: Option<Arc<dyn Driver>>,
    // Ordered by (segment length, lexicographic segment).
    children: Vec<Node>,
}

impl Node {
    fn new(segment: &str, offset: usize) -> Self {
        Self {
            segment: segment.to_string(),
            offset,
            driver: None,
            children: Vec::new(),
        }
    }

    fn find_child(&self, segment: &str) -> Option<usize> {
        self.children
            .binary_search_by(|child| {
                (child.segment.len(), child.segment.as_str()).cmp(&(segment.len(), segment))
            })
            .ok()
    }

    fn child_slot(&self, segment: &str) -> core::result::Result<usize, usize> {
        self.children.binary_search_by(|child| {
            (child.segment.len(), child.segment.as_str()).cmp(&(segment.len(), segment))
        })
    }

    // A node survives pruning if it still mounts a driver or any
    // descendant does.
    fn prune(&mut self) -> bool {
        self.children.retain_mut(Node::prune);
        self.driver.is_some() || !self.children.is_empty()
    }

    fn entries(&self) -> Vec<DirEntry> {
        self.children
            .iter()
            .map(|child| {
                let entry_type = if child.driver.is_some() || !child.children.is_empty() {
                    DirEntryType::Directory
                } else {
                    DirEntryType::File
                };
                DirEntry::new(&child.segment, entry_type)
            })
            .collect()
    }
}

/// What an `open` resolves to.
#[derive(Debug)]
pub(crate) enum OpenTarget {
    /// The deepest driver whose mount prefix matches, plus the remainder
    /// of the path (no leading delimiter; empty for the mount point
    /// itself).
    Driver {
        driver: Arc<dyn Driver>,
        relpath: String,
    },
    /// No driver on the way, but the exact path is a pure directory;
    /// served by the generic VFS driver.
    Directory { entries: Vec<DirEntry> },
}

pub(crate) struct MountTree {
    root: Node,
}

impl MountTree {
    pub(crate) fn new() -> Self {
        Self {
            root: Node::new("", 0),
        }
    }

    fn segments(path: &str) -> impl Iterator<Item = &str> {
        path.split(DELIMITER).filter(|s| !s.is_empty())
    }

    /// Attaches `driver` at `path` (already cleaned), creating the chain
    /// of transient intermediates on the way.
    pub(crate) fn register(&mut self, path: &str, driver: Arc<dyn Driver>) -> Result<()> {
        let mut node = &mut self.root;
        for segment in Self::segments(path) {
            let offset = node.offset + 1 + segment.len();
            match node.child_slot(segment) {
                Ok(idx) => node = &mut node.children[idx],
                Err(idx) => {
                    node.children.insert(idx, Node::new(segment, offset));
                    node = &mut node.children[idx];
                }
            }
        }
        if node.driver.is_some() {
            return_errno_with_message!(Errno::IncorrectValue, "the path already has a driver");
        }
        node.driver = Some(driver);
        Ok(())
    }

    /// Detaches the driver at exactly `path` and prunes every subtree
    /// left without any driver. Returns the detached driver.
    pub(crate) fn unregister(&mut self, path: &str) -> Result<Arc<dyn Driver>> {
        let mut node = &mut self.root;
        for segment in Self::segments(path) {
            let Some(idx) = node.find_child(segment) else {
                return_errno_with_message!(Errno::NoSuchId, "no such mount point");
            };
            node = &mut node.children[idx];
        }
        let Some(driver) = node.driver.take() else {
            return_errno_with_message!(Errno::NoSuchId, "the path mounts no driver");
        };
        self.root.prune();
        Ok(driver)
    }

    /// Returns the driver mounted at exactly `path`, if any.
    pub(crate) fn driver_at(&self, path: &str) -> Option<Arc<dyn Driver>> {
        let mut node = &self.root;
        for segment in Self::segments(path) {
            node = &node.children[node.find_child(segment)?];
        }
        node.driver.clone()
    }

    /// Resolves `path` (already cleaned) for an open: the deepest
    /// driver-bearing prefix wins; failing that, an exact pure-directory
    /// match is served by the generic driver.
    pub(crate) fn resolve_open(&self, path: &str) -> Result<OpenTarget> {
        let mut node = &self.root;
        let mut deepest: Option<(&Arc<dyn Driver>, usize)> = None;
        let mut exact = true;
        if let Some(driver) = &node.driver {
            deepest = Some((driver, node.offset));
        }
        for segment in Self::segments(path) {
            match node.find_child(segment) {
                Some(idx) => {
                    node = &node.children[idx];
                    if let Some(driver) = &node.driver {
                        deepest = Some((driver, node.offset));
                    }
                }
                None => {
                    exact = false;
                    break;
                }
            }
        }
        if let Some((driver, offset)) = deepest {
            let relpath = path[offset..].trim_start_matches(DELIMITER).to_string();
            return Ok(OpenTarget::Driver {
                driver: driver.clone(),
                relpath,
            });
        }
        if exact && !node.children.is_empty() {
            return Ok(OpenTarget::Directory {
                entries: node.entries(),
            });
        }
        return_errno_with_message!(Errno::NoSuchId, "nothing is mounted along the path");
    }

    /// Lists the children of the node at exactly `path` (the root
    /// included), for the generic directory driver.
    pub(crate) fn entries_at(&self, path: &str) -> Option<Vec<DirEntry>> {
        let mut node = &self.root;
        for segment in Self::segments(path) {
            node = &node.children[node.find_child(segment)?];
        }
        Some(node.entries())
    }

    /// Whether any driver is mounted at or below `path`.
    pub(crate) fn has_mounts(&self, path: &str) -> bool {
        let mut node = &self.root;
        for segment in Self::segments(path) {
            let Some(idx) = node.find_child(segment) else {
                return false;
            };
            node = &node.children[idx];
        }
        fn any_driver(node: &Node) -> bool {
            node.driver.is_some() || node.children.iter().any(any_driver)
        }
        any_driver(node)
    }
}
