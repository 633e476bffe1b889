// SPDX-License-Identifier: MPL-2.0

//! CPU identification and affinity sets.

use bitvec::prelude::*;
use spin::Once;

use crate::config::MAX_CPUS;

static NUM_CPUS: Once<u32> = Once::new();

pub(crate) fn init(num_cpus: u32) {
    assert!(num_cpus >= 1 && num_cpus <= MAX_CPUS);
    NUM_CPUS.call_once(|| num_cpus);
}

/// Returns the number of logical CPUs.
pub fn num_cpus() -> u32 {
    *NUM_CPUS.get().expect("CPU subsystem is not initialized")
}

/// Returns the id of the current CPU.
pub fn this_cpu() -> u32 {
    crate::arch::this_cpu_id()
}

/// A subset of the logical CPUs, used as a thread affinity mask.
///
/// An empty set is treated by consumers as "no restriction".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuSet {
    bitset: BitVec,
}

impl CpuSet {
    /// Creates a set containing every CPU.
    pub fn new_full() -> Self {
        let num_cpus = num_cpus();
        let mut bitset = BitVec::with_capacity(num_cpus as usize);
        bitset.resize(num_cpus as usize, true);
        Self { bitset }
    }

    /// Creates an empty set.
    pub fn new_empty() -> Self {
        let num_cpus = num_cpus();
        let mut bitset = BitVec::with_capacity(num_cpus as usize);
        bitset.resize(num_cpus as usize, false);
        Self { bitset }
    }

    /// Creates a set containing only `cpu_id`.
    pub fn single(cpu_id: u32) -> Self {
        let mut set = Self::new_empty();
        set.add(cpu_id);
        set
    }

    pub fn add(&mut self, cpu_id: u32) {
        self.bitset.set(cpu_id as usize, true);
    }

    pub fn remove(&mut self, cpu_id: u32) {
        self.bitset.set(cpu_id as usize, false);
    }

    pub fn contains(&self, cpu_id: u32) -> bool {
        self.bitset.get(cpu_id as usize).as_deref() == Some(&true)
    }

    pub fn is_empty(&self) -> bool {
        self.bitset.not_any()
    }

    /// Returns the ids of the CPUs in the set, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bitset.iter_ones().map(|id| id as u32)
    }

    /// Packs the first 64 CPUs of the set into a bitmap.
    pub fn to_bits(&self) -> u64 {
        let mut bits = 0u64;
        for id in self.iter().take(64) {
            bits |= 1 << id;
        }
        bits
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_membership() {
        crate::init(4);
        let mut set = CpuSet::new_empty();
        assert!(set.is_empty());
        set.add(1);
        set.add(3);
        assert!(set.contains(1));
        assert!(!set.contains(2));
        assert_eq!(set.iter().collect::<alloc::vec::Vec<_>>(), [1, 3]);
        assert_eq!(set.to_bits(), 0b1010);
        set.remove(1);
        assert!(!set.contains(1));
    }
}
