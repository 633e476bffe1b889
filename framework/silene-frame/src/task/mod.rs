// SPDX-License-Identifier: MPL-2.0

//! Task contexts, kernel stacks, and scheduling priorities.

mod context;
mod priority;

pub use self::{
    context::{context_switch, TaskContext},
    priority::Priority,
};

use crate::{config::KERNEL_STACK_SIZE, prelude::*, Error};

/// A kernel stack.
///
/// The stack grows downwards from [`Self::top`]. The top is aligned down to
/// 16 bytes, which both supported architectures require of a fresh stack
/// pointer.
pub struct KernelStack {
    storage: Box<[u8]>,
}

impl KernelStack {
    /// Allocates a stack of the default size.
    pub fn new() -> Result<Self> {
        Self::with_size(KERNEL_STACK_SIZE)
    }

    /// Allocates a stack of `size` bytes.
    pub fn with_size(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidArgs);
        }
        let mut storage = Vec::new();
        storage.try_reserve_exact(size).map_err(|_| Error::NoMemory)?;
        storage.resize(size, 0);
        Ok(Self {
            storage: storage.into_boxed_slice(),
        })
    }

    /// Returns the (aligned) top of the stack.
    pub fn top(&self) -> usize {
        let end = self.storage.as_ptr() as usize + self.storage.len();
        end & !15
    }

    pub fn size(&self) -> usize {
        self.storage.len()
    }
}
