//! Kernel Error Codes
//!
//! Every recoverable failure in the process and syscall layers is an
//! `Errno`. The discriminants are the negative values placed in the
//! return register, so `Errno as i64` is the user-visible result.

use core::fmt;

/// System call error codes
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted
    Eperm = -1,
    /// No such file or directory
    Enoent = -2,
    /// No such process
    Esrch = -3,
    /// Interrupted while blocked
    Eintr = -4,
    /// Bad file descriptor
    Ebadf = -9,
    /// No child processes
    Echild = -10,
    /// Out of memory
    Enomem = -12,
    /// Permission denied
    Eacces = -13,
    /// Bad address (invalid pointer)
    Efault = -14,
    /// File exists
    Eexist = -17,
    /// No such filesystem type
    Enodev = -19,
    /// Not a directory
    Enotdir = -20,
    /// Is a directory
    Eisdir = -21,
    /// Invalid argument
    Einval = -22,
    /// Illegal seek
    Espipe = -29,
    /// Name too long
    Enametoolong = -36,
    /// Operation not supported by the node
    Enotsup = -95,
}

impl Errno {
    const ALL: [Errno; 17] = [
        Errno::Eperm,
        Errno::Enoent,
        Errno::Esrch,
        Errno::Eintr,
        Errno::Ebadf,
        Errno::Echild,
        Errno::Enomem,
        Errno::Eacces,
        Errno::Efault,
        Errno::Eexist,
        Errno::Enodev,
        Errno::Enotdir,
        Errno::Eisdir,
        Errno::Einval,
        Errno::Espipe,
        Errno::Enametoolong,
        Errno::Enotsup,
    ];

    /// The value returned to user space.
    #[inline]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    /// Map a negative return word back to an error, if it is one we know.
    pub fn from_i64(value: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.as_i64() == value)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Eperm => "operation not permitted",
            Self::Enoent => "no such file or directory",
            Self::Esrch => "no such process",
            Self::Eintr => "interrupted",
            Self::Ebadf => "bad file descriptor",
            Self::Echild => "no child processes",
            Self::Enomem => "out of memory",
            Self::Eacces => "permission denied",
            Self::Efault => "bad address",
            Self::Eexist => "file exists",
            Self::Enodev => "no such device",
            Self::Enotdir => "not a directory",
            Self::Eisdir => "is a directory",
            Self::Einval => "invalid argument",
            Self::Espipe => "illegal seek",
            Self::Enametoolong => "name too long",
            Self::Enotsup => "not supported",
        };
        f.write_str(msg)
    }
}

/// Result type used by syscall handlers.
pub type SysResult = Result<i64, Errno>;
