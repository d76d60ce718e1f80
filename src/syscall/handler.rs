//! System Call Handler
//!
//! Dispatches decoded system calls and implements the process, identity,
//! time, and system handlers. File handlers live in `fs.rs`.
//!
//! # Security Considerations
//! - Unknown and out-of-range numbers are rejected with EINVAL
//! - Every user pointer passes the window guard before use; a pointer
//!   outside the window is handled per [`PointerPolicy`]
//! - Privileged operations check the effective uid before touching
//!   global state

use alloc::string::String;
use alloc::vec::Vec;

use super::decode::numbers::{self, func};
use super::decode::Syscall;
use super::fs;
use super::validate::{UserBuffer, UserBufferMut, UserSpace};
use crate::config::{PointerPolicy, CODENAME, KERNEL_NAME, MACHINE, PAGE_SIZE, USER_ROOT_UID, VERSION};
use crate::errno::{Errno, SysResult};
use crate::kernel::{Kernel, SIGSEGV};
use crate::proc::{Pid, ProcessRef, SharedFdTable, TrapFrame};
use crate::vfs::Uid;

/// Upper bound on `THREADNAME` argument vectors.
const MAX_ARGS: usize = 256;

/// State a handler needs: the kernel, the calling process, and its user
/// address window.
pub struct SyscallContext<'k> {
    pub kernel: &'k Kernel,
    pub proc: ProcessRef,
    pub space: UserSpace,
    name: &'static str,
}

impl<'k> SyscallContext<'k> {
    pub fn new(kernel: &'k Kernel, proc: ProcessRef, number: u64) -> Self {
        let entry = proc.lock().image.entry;
        Self {
            kernel,
            proc,
            space: UserSpace::new(entry, kernel.config.user_split),
            name: numbers::name(number),
        }
    }

    /// Apply the pointer guard to `ptr`. Null passes.
    pub fn check_ptr(&self, ptr: usize) -> Result<(), Errno> {
        if self.space.permits(ptr) {
            return Ok(());
        }
        self.pointer_fault(ptr)
    }

    fn pointer_fault(&self, ptr: usize) -> Result<(), Errno> {
        match self.kernel.config.pointer_policy {
            PointerPolicy::Halt => {
                log::error!(
                    "[SYSCALL] invalid pointer passed to {} ({:#x} outside {:#x}..{:#x})",
                    self.name,
                    ptr,
                    self.space.entry(),
                    self.space.split()
                );
                self.kernel
                    .platform
                    .halt(format_args!("invalid pointer passed to {} ({:#x})", self.name, ptr))
            }
            PointerPolicy::KillProcess => {
                let pid = self.pid();
                log::warn!(
                    "[SYSCALL] {}: invalid pointer {:#x}, killing {}",
                    self.name,
                    ptr,
                    pid
                );
                self.kernel.terminate(&self.proc, SIGSEGV);
                Err(Errno::Efault)
            }
        }
    }

    /// Guarded copy of a user string.
    pub fn string(&self, ptr: usize) -> Result<String, Errno> {
        self.check_ptr(ptr)?;
        self.space.read_cstr(ptr)
    }

    /// Guarded read-only view of `[ptr, ptr + len)`.
    pub fn buffer(&self, ptr: usize, len: usize) -> Result<UserBuffer, Errno> {
        self.check_range(ptr, len)?;
        self.space.validate_read(ptr, len)
    }

    /// Guarded writable view of `[ptr, ptr + len)`.
    pub fn buffer_mut(&self, ptr: usize, len: usize) -> Result<UserBufferMut, Errno> {
        self.check_range(ptr, len)?;
        self.space.validate_write(ptr, len)
    }

    fn check_range(&self, ptr: usize, len: usize) -> Result<(), Errno> {
        self.check_ptr(ptr)?;
        if ptr != 0 && !self.space.range_ok(ptr, len) {
            return self.pointer_fault(ptr.saturating_add(len));
        }
        Ok(())
    }

    /// Guarded copy of `value` out to user memory.
    pub fn put<T: Copy>(&self, ptr: usize, value: &T) -> Result<(), Errno> {
        self.check_range(ptr, core::mem::size_of::<T>())?;
        self.space.write_value(ptr, value)
    }

    pub fn pid(&self) -> Pid {
        self.proc.lock().id
    }

    /// Effective uid of the caller.
    pub fn uid(&self) -> Uid {
        self.proc.lock().user
    }

    /// Working directory path.
    pub fn cwd(&self) -> String {
        self.proc.lock().wd_name.clone()
    }

    /// The caller's descriptor table.
    pub fn fds(&self) -> Result<SharedFdTable, Errno> {
        self.proc.lock().fd_table().ok_or(Errno::Ebadf)
    }

    fn invoke(&self, call: Syscall) -> SysResult {
        match call {
            Syscall::Exit { code } => sys_exit(self, code),
            Syscall::GetEuid => Ok(self.uid() as i64),
            Syscall::Open { path, flags, mode } => fs::sys_open(self, path, flags, mode),
            Syscall::Read { fd, buf, len } => fs::sys_read(self, fd, buf, len),
            Syscall::Write { fd, buf, len } => fs::sys_write(self, fd, buf, len),
            Syscall::Close { fd } => fs::sys_close(self, fd),
            Syscall::GetTimeOfDay { tv, tz } => sys_gettimeofday(self, tv, tz),
            Syscall::Fork => self.kernel.fork().map(i64::from),
            Syscall::GetPid => sys_getpid(self),
            Syscall::Sbrk { size } => sys_sbrk(self, size),
            Syscall::Uname { buf } => sys_uname(self, buf),
            Syscall::Seek { fd, offset, whence } => fs::sys_seek(self, fd, offset, whence),
            Syscall::Stat { fd, st } => fs::sys_stat(self, fd, st),
            Syscall::Dup2 { src, dest } => fs::sys_dup2(self, src, dest),
            Syscall::GetUid => Ok(self.proc.lock().real_user as i64),
            Syscall::SetUid { uid } => sys_setuid(self, uid),
            Syscall::Readdir { fd, index, entry } => fs::sys_readdir(self, fd, index, entry),
            Syscall::Chdir { path } => fs::sys_chdir(self, path),
            Syscall::GetCwd { buf, size } => fs::sys_getcwd(self, buf, size),
            Syscall::Clone { stack, func, arg } => sys_clone(self, stack, func, arg),
            Syscall::SetHostname { name } => sys_sethostname(self, name),
            Syscall::GetHostname { buf } => sys_gethostname(self, buf),
            Syscall::Mkdir { path, mode } => fs::sys_mkdir(self, path, mode),
            Syscall::GetTid => Ok(self.pid() as i64),
            Syscall::Yield => {
                self.kernel.switch_task(true);
                Ok(1)
            }
            Syscall::SysFunc { func, args } => sys_sysfunc(self, func, args),
            Syscall::SleepAbs { ticks, subticks } => sys_sleepabs(self, ticks, subticks),
            Syscall::Sleep { ticks, subticks } => {
                let (t, s) = self.kernel.sched.relative_time(ticks, subticks);
                self.kernel.sleep_until(t, s);
                Ok(0)
            }
            Syscall::Ioctl { fd, request, argp } => fs::sys_ioctl(self, fd, request, argp),
            Syscall::Access { path, mode } => fs::sys_access(self, path, mode),
            Syscall::StatF { path, st } => fs::sys_statf(self, path, st),
            Syscall::Chmod { path, mode } => fs::sys_chmod(self, path, mode),
            Syscall::Umask { mode } => {
                self.proc.lock().mask = mode & 0o777;
                Ok(0)
            }
            Syscall::Unlink { path } => fs::sys_unlink(self, path),
            Syscall::WaitPid { pid, status, options } => sys_waitpid(self, pid, status, options),
            Syscall::Mount { source, target, fs_type } => fs::sys_mount(self, source, target, fs_type),
            Syscall::Symlink { target, name } => fs::sys_symlink(self, target, name),
            Syscall::Readlink { path, buf, len } => fs::sys_readlink(self, path, buf, len),
            Syscall::Lstat { path, st } => fs::sys_lstat(self, path, st),
            Syscall::Chown { path, uid, gid } => fs::sys_chown(self, path, uid, gid),
            Syscall::SetSid => sys_setsid(self),
            Syscall::SetPgid { pid, pgid } => sys_setpgid(self, pid, pgid),
            Syscall::GetPgid { pid } => sys_getpgid(self, pid),
            Syscall::Unimplemented { number } => {
                log::warn!(
                    "[SYSCALL] unimplemented system call {} ({})",
                    numbers::name(number),
                    number
                );
                Err(Errno::Einval)
            }
        }
    }
}

/// Dispatch the system call trapped in `frame` for the current process.
///
/// The frame is saved as the caller's syscall registers, the request is
/// decoded and run, and the result is stored back in the frame.
///
/// # Returns
/// The signed return word: a non-negative result or a negative errno.
pub fn dispatch(kernel: &Kernel, frame: &mut TrapFrame) -> i64 {
    let number = frame.syscall_number();
    let result = match (Syscall::decode(frame), kernel.current()) {
        (Err(e), _) => Err(e),
        (Ok(_), None) => {
            log::warn!("[SYSCALL] {} with no current process", numbers::name(number));
            Err(Errno::Einval)
        }
        (Ok(call), Some(proc)) => {
            proc.lock().syscall_registers = *frame;
            log::trace!("[SYSCALL] {:?}", call);
            SyscallContext::new(kernel, proc, number).invoke(call)
        }
    };
    let ret = match result {
        Ok(value) => value,
        Err(e) => e.as_i64(),
    };
    frame.set_return(ret);
    ret
}

fn sys_exit(cx: &SyscallContext, code: i64) -> SysResult {
    log::debug!("[SYSCALL] exit({}) from {}", code, cx.pid());
    cx.kernel.exit_process(&cx.proc, code as i32);
    Ok(0)
}

/// The pid user code sees is the thread group leader's.
fn sys_getpid(cx: &SyscallContext) -> SysResult {
    let p = cx.proc.lock();
    Ok(if p.group != 0 { p.group } else { p.id } as i64)
}

/// Only the superuser may change identity; both ids change together.
fn sys_setuid(cx: &SyscallContext, uid: Uid) -> SysResult {
    let mut p = cx.proc.lock();
    if p.user != USER_ROOT_UID {
        return Err(Errno::Eperm);
    }
    p.user = uid;
    p.real_user = uid;
    Ok(0)
}

fn sys_setsid(cx: &SyscallContext) -> SysResult {
    let mut p = cx.proc.lock();
    if p.job == p.group {
        return Err(Errno::Eperm);
    }
    p.session = p.group;
    p.job = p.group;
    Ok(p.session as i64)
}

/// Target of a job-control call: the caller for pid 0, otherwise the
/// caller itself or one of its children.
fn job_target(cx: &SyscallContext, pid: Pid) -> Result<ProcessRef, Errno> {
    let me = cx.pid();
    if pid == 0 || pid == me {
        return Ok(cx.proc.clone());
    }
    if cx.kernel.table.parent_of(pid) != Some(me) {
        return Err(Errno::Esrch);
    }
    cx.kernel.lookup_by_pid(pid).ok_or(Errno::Esrch)
}

fn sys_setpgid(cx: &SyscallContext, pid: Pid, pgid: Pid) -> SysResult {
    if pgid < 0 {
        return Err(Errno::Einval);
    }
    let my_session = cx.proc.lock().session;
    let target = job_target(cx, pid)?;
    let (session, group, leader) = {
        let t = target.lock();
        (t.session, t.group, t.is_session_leader())
    };
    if session != my_session || leader {
        return Err(Errno::Eperm);
    }
    if pgid == 0 {
        target.lock().job = group;
        return Ok(0);
    }
    let leader = cx.kernel.lookup_by_pid(pgid).ok_or(Errno::Eperm)?;
    let leader_session = leader.lock().session;
    if leader_session != session {
        return Err(Errno::Eperm);
    }
    target.lock().job = pgid;
    Ok(0)
}

fn sys_getpgid(cx: &SyscallContext, pid: Pid) -> SysResult {
    let target = if pid == 0 {
        cx.proc.clone()
    } else {
        cx.kernel.lookup_by_pid(pid).ok_or(Errno::Esrch)?
    };
    let job = target.lock().job;
    Ok(job as i64)
}

fn sys_clone(cx: &SyscallContext, stack: usize, func: usize, arg: usize) -> SysResult {
    cx.check_ptr(stack)?;
    cx.check_ptr(func)?;
    cx.kernel.clone_thread(stack, func, arg).map(i64::from)
}

fn sys_waitpid(cx: &SyscallContext, pid: Pid, status: usize, options: i64) -> SysResult {
    cx.check_ptr(status)?;
    let (child, code) = cx.kernel.waitpid(pid, options)?;
    if status != 0 && child != 0 {
        cx.put(status, &code)?;
    }
    Ok(child as i64)
}

/// Returns the remaining whole ticks if woken before the deadline.
fn sys_sleepabs(cx: &SyscallContext, ticks: u64, subticks: u64) -> SysResult {
    cx.kernel.sleep_until(ticks, subticks);
    let (now, _) = cx.kernel.sched.now();
    Ok(ticks.saturating_sub(now) as i64)
}

/// Grow the heap by a page-aligned `size`; returns the old break.
fn sys_sbrk(cx: &SyscallContext, size: i64) -> SysResult {
    if size & (PAGE_SIZE as i64 - 1) != 0 {
        return Err(Errno::Einval);
    }
    let out = cx.proc.lock().image.heap;
    if size > 0 {
        cx.kernel.platform.map_user_range(out, size as usize)?;
    }
    cx.proc.lock().image.heap = out.wrapping_add_signed(size as isize);
    Ok(out as i64)
}

fn sys_sysfunc(cx: &SyscallContext, function: i64, args: usize) -> SysResult {
    match function {
        func::SETHEAP => {
            let words = cx.words(args, 1)?;
            cx.proc.lock().image.heap = words[0];
            Ok(0)
        }
        func::MMAP => {
            let words = cx.words(args, 2)?;
            cx.kernel.platform.map_user_range(words[0], words[1])?;
            Ok(0)
        }
        func::THREADNAME => {
            let cmdline = cx.string_vector(args)?;
            cx.proc.lock().cmdline = cmdline;
            Ok(0)
        }
        func::SETGSBASE => {
            let words = cx.words(args, 1)?;
            cx.proc.lock().thread.context.tls_base = words[0];
            cx.kernel.platform.set_tls_base(words[0]);
            Ok(0)
        }
        func::SYNC
        | func::LOGHERE
        | func::SETFDS
        | func::WRITESDB
        | func::KDEBUG
        | func::INSMOD
        | func::DEBUGPRINT
        | func::SETVGACURSOR => {
            log::warn!("[SYSCALL] sysfunc {}: not implemented", function);
            Err(Errno::Einval)
        }
        _ => {
            log::warn!("[SYSCALL] bad system function: {}", function);
            Err(Errno::Einval)
        }
    }
}

impl SyscallContext<'_> {
    /// Guarded read of `count` words at `ptr`.
    fn words(&self, ptr: usize, count: usize) -> Result<Vec<usize>, Errno> {
        self.check_range(ptr, count * core::mem::size_of::<usize>())?;
        self.space.read_words(ptr, count)
    }

    /// A NULL-terminated array of string pointers.
    fn string_vector(&self, ptr: usize) -> Result<Vec<String>, Errno> {
        let mut out = Vec::new();
        for i in 0..MAX_ARGS {
            let slot = ptr
                .checked_add(i * core::mem::size_of::<usize>())
                .ok_or(Errno::Efault)?;
            let word = self.words(slot, 1)?[0];
            if word == 0 {
                return Ok(out);
            }
            out.push(self.string(word)?);
        }
        Err(Errno::Einval)
    }
}

/// `struct utsname`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Utsname {
    pub sysname: [u8; 65],
    pub nodename: [u8; 65],
    pub release: [u8; 65],
    pub version: [u8; 65],
    pub machine: [u8; 65],
    pub domainname: [u8; 65],
}

fn field(s: &[u8]) -> [u8; 65] {
    let mut out = [0u8; 65];
    let len = s.len().min(64);
    out[..len].copy_from_slice(&s[..len]);
    out
}

fn sys_uname(cx: &SyscallContext, buf: usize) -> SysResult {
    let hostname = cx.kernel.hostname();
    let name = Utsname {
        sysname: field(KERNEL_NAME.as_bytes()),
        nodename: field(&hostname),
        release: field(VERSION.as_bytes()),
        version: field(CODENAME.as_bytes()),
        machine: field(MACHINE.as_bytes()),
        domainname: field(b""),
    };
    cx.put(buf, &name)?;
    Ok(0)
}

/// `struct timeval`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeval {
    pub tv_sec: i64,
    pub tv_usec: i64,
}

fn sys_gettimeofday(cx: &SyscallContext, tv: usize, tz: usize) -> SysResult {
    cx.check_ptr(tv)?;
    cx.check_ptr(tz)?;
    if tv != 0 {
        let (ticks, subticks) = cx.kernel.sched.now();
        let now = Timeval {
            tv_sec: (cx.kernel.config.boot_time + ticks) as i64,
            tv_usec: subticks as i64,
        };
        cx.put(tv, &now)?;
    }
    Ok(0)
}

fn sys_sethostname(cx: &SyscallContext, name: usize) -> SysResult {
    if cx.uid() != USER_ROOT_UID {
        return Err(Errno::Eperm);
    }
    let name = cx.string(name)?;
    cx.kernel.set_hostname(name.as_bytes())?;
    Ok(0)
}

/// Copies the hostname and its terminator; returns the bytes written.
fn sys_gethostname(cx: &SyscallContext, buf: usize) -> SysResult {
    cx.check_ptr(buf)?;
    let hostname = cx.kernel.hostname();
    if hostname.is_empty() {
        return Ok(0);
    }
    let mut out = cx.buffer_mut(buf, hostname.len() + 1)?;
    let bytes = out.as_bytes_mut();
    bytes[..hostname.len()].copy_from_slice(&hostname);
    bytes[hostname.len()] = 0;
    Ok(bytes.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::numbers::*;
    use super::*;
    use crate::config::KernelConfig;
    use crate::kernel::testing::*;
    use crate::proc::ProcessState;

    fn call(kernel: &Kernel, number: u64, args: &[u64]) -> i64 {
        let mut frame = TrapFrame::syscall(number, args);
        dispatch(kernel, &mut frame)
    }

    fn ptr<T>(value: &T) -> u64 {
        value as *const T as u64
    }

    fn cstr(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    }

    fn user(kernel: &Kernel, uid: Uid) {
        let p = kernel.current().unwrap();
        let mut p = p.lock();
        p.user = uid;
        p.real_user = uid;
    }

    #[test]
    fn test_out_of_range_number_is_einval() {
        let (kernel, _fs, _) = booted();
        assert_eq!(call(&kernel, 1000, &[]), Errno::Einval.as_i64());
        assert_eq!(call(&kernel, SYS_EXECVE, &[]), Errno::Einval.as_i64());
    }

    #[test]
    fn test_dispatch_saves_registers_and_sets_return() {
        let (kernel, _fs, _) = booted();
        let mut frame = TrapFrame::syscall(SYS_GETTID, &[]);
        frame.rip = 0x4000;
        assert_eq!(dispatch(&kernel, &mut frame), 1);
        assert_eq!(frame.return_value(), 1);
        assert_eq!(kernel.current().unwrap().lock().syscall_registers.rip, 0x4000);
    }

    #[test]
    fn test_setuid_requires_root() {
        let (kernel, _fs, _) = booted();
        user(&kernel, 1000);
        assert_eq!(call(&kernel, SYS_SETUID, &[0]), Errno::Eperm.as_i64());
        {
            let p = kernel.current().unwrap();
            let p = p.lock();
            assert_eq!((p.user, p.real_user), (1000, 1000));
        }

        user(&kernel, 0);
        assert_eq!(call(&kernel, SYS_SETUID, &[42]), 0);
        assert_eq!(call(&kernel, SYS_GETUID, &[]), 42);
        assert_eq!(call(&kernel, SYS_GETEUID, &[]), 42);
    }

    #[test]
    #[should_panic(expected = "invalid pointer passed to open")]
    fn test_bad_pointer_halts_by_default() {
        let (kernel, _fs, _) = booted();
        kernel.current().unwrap().lock().image.entry = 0x1000;
        call(&kernel, SYS_OPEN, &[0x10, 0, 0]);
    }

    #[test]
    fn test_bad_pointer_kills_caller_when_configured() {
        let config = KernelConfig {
            pointer_policy: PointerPolicy::KillProcess,
            ..KernelConfig::default()
        };
        let (kernel, _fs, _) = kernel_with(config);
        kernel.spawn_init().unwrap();
        kernel.spawn_idle().unwrap();
        let child = fork_child(&kernel);
        let pid = child.lock().id;
        kernel.set_current(&child);
        let above_split = kernel.config().user_split as u64 + 8;
        assert_eq!(call(&kernel, SYS_STATF, &[above_split, 0]), Errno::Efault.as_i64());
        assert_eq!(kernel.state_of(pid), Some(ProcessState::Finished));
        assert_eq!(child.lock().status, SIGSEGV);
        assert_ne!(kernel.current_pid(), Some(pid));
    }

    #[test]
    fn test_null_path_is_efault_not_fatal() {
        let (kernel, _fs, _) = booted();
        assert_eq!(call(&kernel, SYS_CHDIR, &[0]), Errno::Efault.as_i64());
    }

    #[test]
    fn test_getpid_reports_thread_group() {
        let (kernel, _fs, _) = booted();
        let tid = kernel.clone_thread(0x9000, 0x7000, 0).unwrap();
        let thread = kernel.lookup_by_pid(tid).unwrap();
        kernel.set_current(&thread);
        assert_eq!(call(&kernel, SYS_GETPID, &[]), 1);
        assert_eq!(call(&kernel, SYS_GETTID, &[]), tid as i64);
    }

    #[test]
    fn test_setsid_rejects_group_leader() {
        let (kernel, _fs, _) = booted();
        assert_eq!(call(&kernel, SYS_SETSID, &[]), Errno::Eperm.as_i64());
        let child = fork_child(&kernel);
        let pid = child.lock().id;
        child.lock().job = 1;
        kernel.set_current(&child);
        assert_eq!(call(&kernel, SYS_SETSID, &[]), pid as i64);
        let c = child.lock();
        assert_eq!((c.session, c.job), (pid, pid));
    }

    #[test]
    fn test_setpgid_job_control() {
        let (kernel, _fs, _) = booted();
        let a = fork_child(&kernel);
        let b = fork_child(&kernel);
        let (a_pid, b_pid) = (a.lock().id, b.lock().id);

        // init is its own session leader and may not move.
        assert_eq!(call(&kernel, SYS_SETPGID, &[0, 0]), Errno::Eperm.as_i64());
        assert_eq!(call(&kernel, SYS_SETPGID, &[4242, 0]), Errno::Esrch.as_i64());
        assert_eq!(call(&kernel, SYS_SETPGID, &[a_pid as u64, (-3i64) as u64]), Errno::Einval.as_i64());

        // Child joins a group led by a process in the same session.
        assert_eq!(call(&kernel, SYS_SETPGID, &[b_pid as u64, a_pid as u64]), 0);
        assert_eq!(b.lock().job, a_pid);
        assert_eq!(call(&kernel, SYS_GETPGID, &[b_pid as u64]), a_pid as i64);

        // pgid 0 puts it back in its own group.
        assert_eq!(call(&kernel, SYS_SETPGID, &[b_pid as u64, 0]), 0);
        assert_eq!(b.lock().job, b_pid);

        // A group in another session cannot be joined.
        a.lock().session = 99;
        assert_eq!(call(&kernel, SYS_SETPGID, &[b_pid as u64, a_pid as u64]), Errno::Eperm.as_i64());

        // Only own children can be moved.
        kernel.set_current(&a);
        assert_eq!(call(&kernel, SYS_SETPGID, &[b_pid as u64, 0]), Errno::Esrch.as_i64());
    }

    #[test]
    fn test_getpgid_unknown_pid() {
        let (kernel, _fs, _) = booted();
        assert_eq!(call(&kernel, SYS_GETPGID, &[0]), 1);
        assert_eq!(call(&kernel, SYS_GETPGID, &[777]), Errno::Esrch.as_i64());
    }

    #[test]
    fn test_hostname_roundtrip_and_privilege() {
        let (kernel, _fs, _) = booted();
        let name = cstr("panther");
        assert_eq!(call(&kernel, SYS_SETHOSTNAME, &[name.as_ptr() as u64]), 0);
        let mut buf = [0xffu8; 16];
        assert_eq!(call(&kernel, SYS_GETHOSTNAME, &[buf.as_mut_ptr() as u64]), 8);
        assert_eq!(&buf[..8], b"panther\0");

        let long = cstr(&"x".repeat(300));
        assert_eq!(call(&kernel, SYS_SETHOSTNAME, &[long.as_ptr() as u64]), Errno::Enametoolong.as_i64());

        user(&kernel, 5);
        assert_eq!(call(&kernel, SYS_SETHOSTNAME, &[name.as_ptr() as u64]), Errno::Eperm.as_i64());
    }

    #[test]
    fn test_uname() {
        let (kernel, _fs, _) = booted();
        kernel.set_hostname(b"box").unwrap();
        let mut out = core::mem::MaybeUninit::<Utsname>::zeroed();
        assert_eq!(call(&kernel, SYS_UNAME, &[out.as_mut_ptr() as u64]), 0);
        // SAFETY: zero-initialised and then filled by the syscall
        let out = unsafe { out.assume_init() };
        assert_eq!(&out.sysname[..9], KERNEL_NAME.as_bytes());
        assert_eq!(&out.nodename[..4], b"box\0");
    }

    #[test]
    fn test_gettimeofday() {
        let config = KernelConfig {
            boot_time: 1_000,
            ..KernelConfig::default()
        };
        let (kernel, _fs, _) = kernel_with(config);
        kernel.spawn_init().unwrap();
        kernel.scheduler().set_now(5, 250);
        let mut tv = Timeval::default();
        let tv_ptr = &mut tv as *mut Timeval as u64;
        assert_eq!(call(&kernel, SYS_GETTIMEOFDAY, &[tv_ptr, 0]), 0);
        assert_eq!(tv, Timeval { tv_sec: 1_005, tv_usec: 250 });
    }

    #[test]
    fn test_sbrk_page_aligned() {
        let (kernel, _fs, _) = booted();
        kernel.current().unwrap().lock().image.heap = 0x10_0000;
        assert_eq!(call(&kernel, SYS_SBRK, &[0x123]), Errno::Einval.as_i64());
        assert_eq!(call(&kernel, SYS_SBRK, &[0x2000]), 0x10_0000);
        assert_eq!(kernel.current().unwrap().lock().image.heap, 0x10_2000);
    }

    #[test]
    fn test_sysfunc() {
        let (kernel, _fs, _) = booted();
        let heap = [0x5000usize];
        assert_eq!(call(&kernel, SYS_SYSFUNC, &[func::SETHEAP as u64, ptr(&heap)]), 0);
        assert_eq!(kernel.current().unwrap().lock().image.heap, 0x5000);

        let sh = cstr("sh");
        let arg = cstr("-c");
        let argv = [sh.as_ptr() as usize, arg.as_ptr() as usize, 0];
        assert_eq!(call(&kernel, SYS_SYSFUNC, &[func::THREADNAME as u64, ptr(&argv)]), 0);
        assert_eq!(kernel.current().unwrap().lock().cmdline, ["sh", "-c"]);

        assert_eq!(call(&kernel, SYS_SYSFUNC, &[func::SYNC as u64, 0]), Errno::Einval.as_i64());
        assert_eq!(call(&kernel, SYS_SYSFUNC, &[99, 0]), Errno::Einval.as_i64());
    }

    #[test]
    fn test_sleep_with_huge_duration_stays_asleep() {
        let (kernel, _fs, _) = booted();
        kernel.scheduler().set_now(1, 1);
        assert_eq!(call(&kernel, SYS_SLEEP, &[u64::MAX, 0]), 0);
        assert_eq!(kernel.scheduler().sleeping_len(), 1);
        assert_eq!(kernel.scheduler().wakeup_sleepers(u64::MAX - 1, 0), 0);
        assert_eq!(kernel.state_of(1), Some(ProcessState::Sleeping));
    }

    #[test]
    fn test_umask_and_yield() {
        let (kernel, _fs, _) = booted();
        assert_eq!(call(&kernel, SYS_UMASK, &[0o7077]), 0);
        assert_eq!(kernel.current().unwrap().lock().mask, 0o077);
        assert_eq!(call(&kernel, SYS_YIELD, &[]), 1);
    }

    #[test]
    fn test_fork_and_waitpid_syscalls() {
        let (kernel, _fs, _) = booted();
        let child_pid = call(&kernel, SYS_FORK, &[]);
        assert!(child_pid > 1);
        let child = kernel.lookup_by_pid(child_pid as Pid).unwrap();
        kernel.exit_process(&child, 7);

        let mut status = 0i32;
        let got = call(
            &kernel,
            SYS_WAITPID,
            &[(-1i64) as u64, &mut status as *mut i32 as u64, 0],
        );
        assert_eq!(got, child_pid);
        assert_eq!(status, 7 << 8);
        assert_eq!(call(&kernel, SYS_WAITPID, &[(-1i64) as u64, 0, 1]), Errno::Echild.as_i64());
    }

    #[test]
    fn test_exit_syscall_finishes_caller() {
        let (kernel, _fs, _) = booted();
        let child = fork_child(&kernel);
        let pid = child.lock().id;
        kernel.set_current(&child);
        call(&kernel, SYS_EXT, &[3]);
        assert_eq!(kernel.state_of(pid), Some(ProcessState::Finished));
        assert_eq!(child.lock().status, 3 << 8);
    }
}
