// SPDX-License-Identifier: MPL-2.0

//! The error taxonomy shared across the kernel core.
//!
//! Policy errors are returned to callers; invariant violations inside the
//! scheduler, the queues or the mutexes escalate to a panic instead,
//! because continued execution would risk silent corruption.

/// Error number.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Errno {
    /// An allocation failed.
    OutOfMemory = 1,
    /// A required pointer or handle was absent.
    NullPointer = 2,
    /// An argument failed validation.
    IncorrectValue = 3,
    /// The referenced entity does not exist.
    NoSuchId = 4,
    /// The call is forbidden in the current state.
    UnauthorizedAction = 5,
    /// The driver or subsystem lacks the capability.
    NotSupported = 6,
    /// The synchronization object was destroyed while waiting.
    Destroyed = 7,
    /// The try-variant would have had to wait.
    WouldBlock = 8,
}

/// The result type returned by the kernel APIs.
pub type Result<T> = core::result::Result<T, Error>;

/// The error type returned by the kernel APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    errno: Errno,
    msg: Option<&'static str>,
}

impl Error {
    pub const fn new(errno: Errno) -> Self {
        Self { errno, msg: None }
    }

    pub const fn with_message(errno: Errno, msg: &'static str) -> Self {
        Self {
            errno,
            msg: Some(msg),
        }
    }

    pub const fn error(&self) -> Errno {
        self.errno
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Self::new(errno)
    }
}

impl From<silene_frame::Error> for Error {
    fn from(err: silene_frame::Error) -> Self {
        match err {
            silene_frame::Error::NoMemory => Error::new(Errno::OutOfMemory),
            silene_frame::Error::InvalidArgs => Error::new(Errno::IncorrectValue),
            silene_frame::Error::NotFound => Error::new(Errno::NoSuchId),
        }
    }
}

#[macro_export]
macro_rules! return_errno {
    ($errno: expr) => {
        return Err($crate::error::Error::new($errno))
    };
}

#[macro_export]
macro_rules! return_errno_with_message {
    ($errno: expr, $message: expr) => {
        return Err($crate::error::Error::with_message($errno, $message))
    };
}

#[cfg(test)]
mod test {
    use super::*;

    fn fails() -> crate::prelude::Result<()> {
        return_errno_with_message!(Errno::NotSupported, "missing capability");
    }

    #[test]
    fn errno_round_trip() {
        let err = fails().unwrap_err();
        assert_eq!(err.error(), Errno::NotSupported);
        let converted: Error = silene_frame::Error::NoMemory.into();
        assert_eq!(converted.error(), Errno::OutOfMemory);
    }
}
