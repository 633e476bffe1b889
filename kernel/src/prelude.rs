// SPDX-License-Identifier: MPL-2.0

#![allow(unused)]

pub(crate) use alloc::{
    boxed::Box,
    collections::BTreeMap,
    format,
    string::{String, ToString},
    sync::{Arc, Weak},
    vec,
    vec::Vec,
};
pub(crate) use core::{any::Any, fmt::Debug};

pub(crate) use bitflags::bitflags;
pub(crate) use lazy_static::lazy_static;
pub(crate) use log::{debug, info, trace, warn};
pub(crate) use silene_frame::{
    collections::prio_queue::{PrioNode, PrioQueue},
    cpu::CpuSet,
    sync::{SpinLock, SpinLockGuard},
    task::Priority,
};

pub(crate) use crate::error::{Errno, Error, Result};
pub(crate) use crate::{return_errno, return_errno_with_message};
