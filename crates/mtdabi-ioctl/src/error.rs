//! Error types for MTD ioctl operations

use core::fmt;
use std::io;
use thiserror::Error;

use crate::ioctl::Request;

/// Kernel-internal "operation not supported" code
///
/// Not part of the userspace errno set, but the MTD core returns it from
/// `MEMLOCK`/`MEMUNLOCK` on chips without lock support.
const ENOTSUPP: i32 = 524;

/// Raw errno returned by a failed ioctl
///
/// Kept as the raw number rather than `nix::errno::Errno`, which folds codes it
/// does not know (such as `ENOTSUPP`) into `UnknownErrno` and would make
/// "not supported" and "unknown" indistinguishable.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    pub const EPERM: Errno = Errno(libc::EPERM);
    pub const EIO: Errno = Errno(libc::EIO);
    pub const EFAULT: Errno = Errno(libc::EFAULT);
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const ENOTTY: Errno = Errno(libc::ENOTTY);
    pub const EROFS: Errno = Errno(libc::EROFS);
    pub const EOPNOTSUPP: Errno = Errno(libc::EOPNOTSUPP);
    pub const ENOTSUPP: Errno = Errno(ENOTSUPP);

    /// Wrap a raw errno value
    pub const fn from_raw(code: i32) -> Self {
        Errno(code)
    }

    /// The raw errno value
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Errno left behind by the last failed system call on this thread
    pub fn last() -> Self {
        Errno(io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    fn name(self) -> Option<String> {
        if self.0 == ENOTSUPP {
            return Some("ENOTSUPP".to_string());
        }
        match nix::errno::Errno::from_raw(self.0) {
            nix::errno::Errno::UnknownErrno => None,
            known => Some(format!("{:?}", known)),
        }
    }

    fn description(self) -> &'static str {
        if self.0 == ENOTSUPP {
            return "Operation is not supported";
        }
        nix::errno::Errno::from_raw(self.0).desc()
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "errno {}", self.0),
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}: {}", name, self.description()),
            None => write!(f, "unknown errno {}", self.0),
        }
    }
}

impl std::error::Error for Errno {}

impl From<Errno> for io::Error {
    fn from(errno: Errno) -> Self {
        io::Error::from_raw_os_error(errno.raw())
    }
}

/// MTD binding errors
#[derive(Debug, Error)]
pub enum MtdError {
    /// Failed to open the device node
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    /// An ioctl request was rejected by the kernel
    #[error("{request} failed: {errno}")]
    Ioctl { request: Request, errno: Errno },

    /// Positioned read failed
    #[error("Read of {len} bytes at offset {offset:#x} failed: {source}")]
    Read {
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },

    /// Positioned write failed
    #[error("Write of {len} bytes at offset {offset:#x} failed: {source}")]
    Write {
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },

    /// Buffer length does not fit the length field of the request
    #[error("Buffer of {len} bytes does not fit the {request} length field")]
    BufferTooLarge { request: Request, len: usize },

    /// A numeric value reported by the kernel has no known meaning
    #[error("Unknown {what}: {value:#x}")]
    UnknownValue { what: &'static str, value: u32 },
}

impl MtdError {
    /// The errno behind a rejected ioctl, if that is what this error is
    pub fn errno(&self) -> Option<Errno> {
        match self {
            MtdError::Ioctl { errno, .. } => Some(*errno),
            MtdError::Read { source, .. } | MtdError::Write { source, .. } => {
                source.raw_os_error().map(Errno::from_raw)
            }
            _ => None,
        }
    }
}

/// Result type for MTD operations
pub type Result<T> = std::result::Result<T, MtdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enotsupp_survives() {
        let errno = Errno::from_raw(524);
        assert_eq!(errno, Errno::ENOTSUPP);
        assert_ne!(errno, Errno::EOPNOTSUPP);
        assert_eq!(format!("{:?}", errno), "ENOTSUPP (524)");
    }

    #[test]
    fn test_known_errno_formatting() {
        assert_eq!(format!("{:?}", Errno::EINVAL), "EINVAL (22)");
        assert!(Errno::EIO.to_string().starts_with("EIO: "));
        assert_eq!(Errno::from_raw(9999).to_string(), "unknown errno 9999");
    }

    #[test]
    fn test_ioctl_error_exposes_errno() {
        let err = MtdError::Ioctl {
            request: Request::MemErase,
            errno: Errno::EIO,
        };
        assert_eq!(err.errno(), Some(Errno::EIO));
        assert!(err.to_string().starts_with("MEMERASE failed: EIO"));

        let err = MtdError::UnknownValue {
            what: "MTD type",
            value: 5,
        };
        assert_eq!(err.errno(), None);
    }
}
