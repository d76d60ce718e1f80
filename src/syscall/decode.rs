//! Syscall numbers and request decoding.
//!
//! A trapped frame is decoded into a [`Syscall`] that carries only the
//! arguments its handler takes. Numbers past the end of the table, and
//! holes inside it, are rejected with `Einval` before anything runs.

use crate::errno::Errno;
use crate::proc::{Pid, TrapFrame};
use crate::vfs::{OpenFlags, Uid};

/// System call numbers
pub mod numbers {
    pub const SYS_EXT: u64 = 0;
    pub const SYS_GETEUID: u64 = 1;
    pub const SYS_OPEN: u64 = 2;
    pub const SYS_READ: u64 = 3;
    pub const SYS_WRITE: u64 = 4;
    pub const SYS_CLOSE: u64 = 5;
    pub const SYS_GETTIMEOFDAY: u64 = 6;
    pub const SYS_EXECVE: u64 = 7;
    pub const SYS_FORK: u64 = 8;
    pub const SYS_GETPID: u64 = 9;
    pub const SYS_SBRK: u64 = 10;
    pub const SYS_UNAME: u64 = 12;
    pub const SYS_OPENPTY: u64 = 13;
    pub const SYS_SEEK: u64 = 14;
    pub const SYS_STAT: u64 = 15;
    pub const SYS_MKPIPE: u64 = 21;
    pub const SYS_DUP2: u64 = 22;
    pub const SYS_GETUID: u64 = 23;
    pub const SYS_SETUID: u64 = 24;
    pub const SYS_REBOOT: u64 = 26;
    pub const SYS_READDIR: u64 = 27;
    pub const SYS_CHDIR: u64 = 28;
    pub const SYS_GETCWD: u64 = 29;
    pub const SYS_CLONE: u64 = 30;
    pub const SYS_SETHOSTNAME: u64 = 31;
    pub const SYS_GETHOSTNAME: u64 = 32;
    pub const SYS_MKDIR: u64 = 34;
    pub const SYS_SHM_OBTAIN: u64 = 35;
    pub const SYS_SHM_RELEASE: u64 = 36;
    pub const SYS_KILL: u64 = 37;
    pub const SYS_SIGNAL: u64 = 38;
    pub const SYS_GETTID: u64 = 41;
    pub const SYS_YIELD: u64 = 42;
    pub const SYS_SYSFUNC: u64 = 43;
    pub const SYS_SLEEPABS: u64 = 45;
    pub const SYS_SLEEP: u64 = 46;
    pub const SYS_IOCTL: u64 = 47;
    pub const SYS_ACCESS: u64 = 48;
    pub const SYS_STATF: u64 = 49;
    pub const SYS_CHMOD: u64 = 50;
    pub const SYS_UMASK: u64 = 51;
    pub const SYS_UNLINK: u64 = 52;
    pub const SYS_WAITPID: u64 = 53;
    pub const SYS_PIPE: u64 = 54;
    pub const SYS_MOUNT: u64 = 55;
    pub const SYS_SYMLINK: u64 = 56;
    pub const SYS_READLINK: u64 = 57;
    pub const SYS_LSTAT: u64 = 58;
    pub const SYS_FSWAIT: u64 = 59;
    pub const SYS_FSWAIT2: u64 = 60;
    pub const SYS_CHOWN: u64 = 61;
    pub const SYS_SETSID: u64 = 62;
    pub const SYS_SETPGID: u64 = 63;
    pub const SYS_GETPGID: u64 = 64;
    pub const SYS_FSWAIT3: u64 = 65;

    /// One past the highest assigned number.
    pub const NUM_SYSCALLS: u64 = 66;

    /// `sysfunc` sub-functions
    pub mod func {
        pub const SYNC: i64 = 3;
        pub const LOGHERE: i64 = 4;
        pub const SETFDS: i64 = 5;
        pub const WRITESDB: i64 = 6;
        pub const KDEBUG: i64 = 7;
        pub const INSMOD: i64 = 8;
        pub const SETHEAP: i64 = 9;
        pub const MMAP: i64 = 10;
        pub const THREADNAME: i64 = 11;
        pub const DEBUGPRINT: i64 = 12;
        pub const SETVGACURSOR: i64 = 13;
        pub const SETGSBASE: i64 = 14;
    }

    /// Name of a syscall number, for log lines.
    pub fn name(number: u64) -> &'static str {
        match number {
            SYS_EXT => "exit",
            SYS_GETEUID => "geteuid",
            SYS_OPEN => "open",
            SYS_READ => "read",
            SYS_WRITE => "write",
            SYS_CLOSE => "close",
            SYS_GETTIMEOFDAY => "gettimeofday",
            SYS_EXECVE => "execve",
            SYS_FORK => "fork",
            SYS_GETPID => "getpid",
            SYS_SBRK => "sbrk",
            SYS_UNAME => "uname",
            SYS_OPENPTY => "openpty",
            SYS_SEEK => "seek",
            SYS_STAT => "stat",
            SYS_MKPIPE => "mkpipe",
            SYS_DUP2 => "dup2",
            SYS_GETUID => "getuid",
            SYS_SETUID => "setuid",
            SYS_REBOOT => "reboot",
            SYS_READDIR => "readdir",
            SYS_CHDIR => "chdir",
            SYS_GETCWD => "getcwd",
            SYS_CLONE => "clone",
            SYS_SETHOSTNAME => "sethostname",
            SYS_GETHOSTNAME => "gethostname",
            SYS_MKDIR => "mkdir",
            SYS_SHM_OBTAIN => "shm_obtain",
            SYS_SHM_RELEASE => "shm_release",
            SYS_KILL => "kill",
            SYS_SIGNAL => "signal",
            SYS_GETTID => "gettid",
            SYS_YIELD => "yield",
            SYS_SYSFUNC => "sysfunc",
            SYS_SLEEPABS => "sleepabs",
            SYS_SLEEP => "sleep",
            SYS_IOCTL => "ioctl",
            SYS_ACCESS => "access",
            SYS_STATF => "statf",
            SYS_CHMOD => "chmod",
            SYS_UMASK => "umask",
            SYS_UNLINK => "unlink",
            SYS_WAITPID => "waitpid",
            SYS_PIPE => "pipe",
            SYS_MOUNT => "mount",
            SYS_SYMLINK => "symlink",
            SYS_READLINK => "readlink",
            SYS_LSTAT => "lstat",
            SYS_FSWAIT => "fswait",
            SYS_FSWAIT2 => "fswait2",
            SYS_CHOWN => "chown",
            SYS_SETSID => "setsid",
            SYS_SETPGID => "setpgid",
            SYS_GETPGID => "getpgid",
            SYS_FSWAIT3 => "fswait3",
            _ => "(invalid)",
        }
    }
}

use numbers::*;

/// A decoded system call request.
///
/// Pointer arguments are raw user addresses; handlers validate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Exit { code: i64 },
    GetEuid,
    Open { path: usize, flags: OpenFlags, mode: u32 },
    Read { fd: i64, buf: usize, len: usize },
    Write { fd: i64, buf: usize, len: usize },
    Close { fd: i64 },
    GetTimeOfDay { tv: usize, tz: usize },
    Fork,
    GetPid,
    Sbrk { size: i64 },
    Uname { buf: usize },
    Seek { fd: i64, offset: i64, whence: i64 },
    Stat { fd: i64, st: usize },
    Dup2 { src: i64, dest: i64 },
    GetUid,
    SetUid { uid: Uid },
    Readdir { fd: i64, index: u64, entry: usize },
    Chdir { path: usize },
    GetCwd { buf: usize, size: usize },
    Clone { stack: usize, func: usize, arg: usize },
    SetHostname { name: usize },
    GetHostname { buf: usize },
    Mkdir { path: usize, mode: u32 },
    GetTid,
    Yield,
    SysFunc { func: i64, args: usize },
    SleepAbs { ticks: u64, subticks: u64 },
    Sleep { ticks: u64, subticks: u64 },
    Ioctl { fd: i64, request: u64, argp: usize },
    Access { path: usize, mode: i64 },
    StatF { path: usize, st: usize },
    Chmod { path: usize, mode: u32 },
    Umask { mode: u32 },
    Unlink { path: usize },
    WaitPid { pid: Pid, status: usize, options: i64 },
    Mount { source: usize, target: usize, fs_type: usize },
    Symlink { target: usize, name: usize },
    Readlink { path: usize, buf: usize, len: usize },
    Lstat { path: usize, st: usize },
    Chown { path: usize, uid: Uid, gid: Uid },
    SetSid,
    SetPgid { pid: Pid, pgid: Pid },
    GetPgid { pid: Pid },
    /// Assigned number with no handler in this kernel
    Unimplemented { number: u64 },
}

impl Syscall {
    /// Decode the request in `frame`.
    pub fn decode(frame: &TrapFrame) -> Result<Self, Errno> {
        let number = frame.syscall_number();
        let a = |n: usize| frame.arg(n);
        let int = |n: usize| frame.arg(n) as i64;
        let ptr = |n: usize| frame.arg(n) as usize;

        let call = match number {
            SYS_EXT => Syscall::Exit { code: int(0) },
            SYS_GETEUID => Syscall::GetEuid,
            SYS_OPEN => Syscall::Open {
                path: ptr(0),
                flags: OpenFlags::from_bits_retain(a(1)),
                mode: a(2) as u32,
            },
            SYS_READ => Syscall::Read { fd: int(0), buf: ptr(1), len: ptr(2) },
            SYS_WRITE => Syscall::Write { fd: int(0), buf: ptr(1), len: ptr(2) },
            SYS_CLOSE => Syscall::Close { fd: int(0) },
            SYS_GETTIMEOFDAY => Syscall::GetTimeOfDay { tv: ptr(0), tz: ptr(1) },
            SYS_FORK => Syscall::Fork,
            SYS_GETPID => Syscall::GetPid,
            SYS_SBRK => Syscall::Sbrk { size: int(0) },
            SYS_UNAME => Syscall::Uname { buf: ptr(0) },
            SYS_SEEK => Syscall::Seek { fd: int(0), offset: int(1), whence: int(2) },
            SYS_STAT => Syscall::Stat { fd: int(0), st: ptr(1) },
            SYS_DUP2 => Syscall::Dup2 { src: int(0), dest: int(1) },
            SYS_GETUID => Syscall::GetUid,
            SYS_SETUID => Syscall::SetUid { uid: a(0) as Uid },
            SYS_READDIR => Syscall::Readdir { fd: int(0), index: a(1), entry: ptr(2) },
            SYS_CHDIR => Syscall::Chdir { path: ptr(0) },
            SYS_GETCWD => Syscall::GetCwd { buf: ptr(0), size: ptr(1) },
            SYS_CLONE => Syscall::Clone { stack: ptr(0), func: ptr(1), arg: ptr(2) },
            SYS_SETHOSTNAME => Syscall::SetHostname { name: ptr(0) },
            SYS_GETHOSTNAME => Syscall::GetHostname { buf: ptr(0) },
            SYS_MKDIR => Syscall::Mkdir { path: ptr(0), mode: a(1) as u32 },
            SYS_GETTID => Syscall::GetTid,
            SYS_YIELD => Syscall::Yield,
            SYS_SYSFUNC => Syscall::SysFunc { func: int(0), args: ptr(1) },
            SYS_SLEEPABS => Syscall::SleepAbs { ticks: a(0), subticks: a(1) },
            SYS_SLEEP => Syscall::Sleep { ticks: a(0), subticks: a(1) },
            SYS_IOCTL => Syscall::Ioctl { fd: int(0), request: a(1), argp: ptr(2) },
            SYS_ACCESS => Syscall::Access { path: ptr(0), mode: int(1) },
            SYS_STATF => Syscall::StatF { path: ptr(0), st: ptr(1) },
            SYS_CHMOD => Syscall::Chmod { path: ptr(0), mode: a(1) as u32 },
            SYS_UMASK => Syscall::Umask { mode: a(0) as u32 },
            SYS_UNLINK => Syscall::Unlink { path: ptr(0) },
            SYS_WAITPID => Syscall::WaitPid {
                pid: a(0) as i32,
                status: ptr(1),
                options: int(2),
            },
            SYS_MOUNT => Syscall::Mount { source: ptr(0), target: ptr(1), fs_type: ptr(2) },
            SYS_SYMLINK => Syscall::Symlink { target: ptr(0), name: ptr(1) },
            SYS_READLINK => Syscall::Readlink { path: ptr(0), buf: ptr(1), len: ptr(2) },
            SYS_LSTAT => Syscall::Lstat { path: ptr(0), st: ptr(1) },
            SYS_CHOWN => Syscall::Chown { path: ptr(0), uid: a(1) as Uid, gid: a(2) as Uid },
            SYS_SETSID => Syscall::SetSid,
            SYS_SETPGID => Syscall::SetPgid { pid: a(0) as i32, pgid: a(1) as i32 },
            SYS_GETPGID => Syscall::GetPgid { pid: a(0) as i32 },
            SYS_EXECVE | SYS_OPENPTY | SYS_MKPIPE | SYS_REBOOT | SYS_SHM_OBTAIN
            | SYS_SHM_RELEASE | SYS_KILL | SYS_SIGNAL | SYS_PIPE | SYS_FSWAIT | SYS_FSWAIT2
            | SYS_FSWAIT3 => Syscall::Unimplemented { number },
            _ if number >= NUM_SYSCALLS => {
                log::debug!("[SYSCALL] number {} out of range", number);
                return Err(Errno::Einval);
            }
            _ => {
                log::debug!("[SYSCALL] no handler for {}", number);
                return Err(Errno::Einval);
            }
        };
        Ok(call)
    }
}
