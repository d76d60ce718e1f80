//! File System Calls
//!
//! Descriptor I/O, path lookups, and metadata changes. Every node access
//! goes through the [`FsNode`](crate::vfs::FsNode) hooks, so these
//! handlers work the same on any backend.

use alloc::string::String;

use super::handler::SyscallContext;
use crate::config::USER_ROOT_UID;
use crate::errno::{Errno, SysResult};
use crate::proc::{AccessMode, FdEntry};
use crate::vfs::{has_permission, perm, NodeFlags, NodeHandle, OpenFlags, RawDirent, Stat, Uid};

const SEEK_SET: i64 = 0;
const SEEK_CUR: i64 = 1;
const SEEK_END: i64 = 2;

impl SyscallContext<'_> {
    /// Snapshot of descriptor `fd`.
    fn entry(&self, fd: i64) -> Result<FdEntry, Errno> {
        let table = self.fds()?;
        let entry = table.lock().get(fd)?.clone();
        Ok(entry)
    }

    fn handle(&self, fd: i64) -> Result<NodeHandle, Errno> {
        let table = self.fds()?;
        let handle = table.lock().handle(fd)?;
        Ok(handle)
    }

    /// Advance `fd`'s offset by `n` if it still names `node`.
    fn advance(&self, fd: i64, node: &NodeHandle, n: usize) -> Result<(), Errno> {
        let table = self.fds()?;
        let mut table = table.lock();
        let entry = table.get_mut(fd)?;
        if entry.node.as_ref().map_or(false, |h| h.same_open(node)) {
            entry.offset += n as u64;
        }
        Ok(())
    }

    /// Caller's working directory, effective uid and creation mask.
    fn identity(&self) -> (String, Uid, u32) {
        let p = self.proc.lock();
        (p.wd_name.clone(), p.user, p.mask)
    }
}

/// Open `path`, creating it under `O_CREAT`, and install a descriptor.
///
/// Permission is checked against the existing node for each access the
/// flags ask for. A fresh node gets `mode` less the caller's umask.
pub fn sys_open(cx: &SyscallContext, path: usize, flags: OpenFlags, mode: u32) -> SysResult {
    let path = cx.string(path)?;
    let (cwd, uid, mask) = cx.identity();
    log::trace!("[SYSCALL] open({}, {:?})", path, flags);

    let mut node = cx.kernel.vfs.kopen(&cwd, &path, flags);
    if node.is_some() && flags.contains(OpenFlags::CREAT | OpenFlags::EXCL) {
        return Err(Errno::Eexist);
    }

    let mut access = AccessMode::empty();
    if !flags.contains(OpenFlags::WRONLY) || flags.contains(OpenFlags::RDWR) {
        if let Some(n) = &node {
            if !has_permission(&n.meta(), perm::READ, uid) {
                return Err(Errno::Eacces);
            }
        }
        access |= AccessMode::READ;
    }
    if flags.intersects(OpenFlags::RDWR | OpenFlags::WRONLY) {
        if let Some(n) = &node {
            let meta = n.meta();
            if !has_permission(&meta, perm::WRITE, uid) {
                return Err(Errno::Eacces);
            }
            if meta.is_dir() {
                return Err(Errno::Eisdir);
            }
        }
        access |= AccessMode::WRITE;
    }

    if node.is_none() && flags.contains(OpenFlags::CREAT) {
        cx.kernel.vfs.create_file(&cwd, &path, mode & !mask & 0o7777, uid)?;
        node = cx.kernel.vfs.kopen(&cwd, &path, flags);
    }

    if flags.contains(OpenFlags::DIRECTORY) {
        if let Some(n) = &node {
            if !n.meta().is_dir() {
                return Err(Errno::Enotdir);
            }
        }
    }
    if let Some(n) = node.as_ref().filter(|_| flags.contains(OpenFlags::TRUNC)) {
        if !access.contains(AccessMode::WRITE) {
            return Err(Errno::Einval);
        }
        n.truncate();
    }

    let node = node.ok_or(Errno::Enoent)?;
    if flags.contains(OpenFlags::CREAT) && node.meta().is_dir() {
        return Err(Errno::Eisdir);
    }

    let offset = if flags.contains(OpenFlags::APPEND) {
        node.size()
    } else {
        0
    };
    let table = cx.fds()?;
    let mut table = table.lock();
    let fd = table.append(node);
    let entry = table.get_mut(fd as i64)?;
    entry.mode = access;
    entry.offset = offset;
    Ok(fd as i64)
}

pub fn sys_close(cx: &SyscallContext, fd: i64) -> SysResult {
    cx.fds()?.lock().close(fd)?;
    Ok(0)
}

pub fn sys_read(cx: &SyscallContext, fd: i64, buf: usize, len: usize) -> SysResult {
    let entry = cx.entry(fd)?;
    let mut out = cx.buffer_mut(buf, len)?;
    if !entry.mode.contains(AccessMode::READ) {
        return Err(Errno::Eacces);
    }
    let node = entry.node.ok_or(Errno::Ebadf)?;
    let n = node.read(entry.offset, out.as_bytes_mut())?;
    cx.advance(fd, &node, n)?;
    Ok(n as i64)
}

pub fn sys_write(cx: &SyscallContext, fd: i64, buf: usize, len: usize) -> SysResult {
    let entry = cx.entry(fd)?;
    let data = cx.buffer(buf, len)?;
    if !entry.mode.contains(AccessMode::WRITE) {
        return Err(Errno::Eacces);
    }
    let node = entry.node.ok_or(Errno::Ebadf)?;
    let n = node.write(entry.offset, data.as_bytes())?;
    cx.advance(fd, &node, n)?;
    Ok(n as i64)
}

/// Reposition `fd`. Pipes and character devices cannot seek.
pub fn sys_seek(cx: &SyscallContext, fd: i64, offset: i64, whence: i64) -> SysResult {
    let table = cx.fds()?;
    let mut table = table.lock();
    let entry = table.get_mut(fd)?;
    let node = entry.node.as_ref().ok_or(Errno::Ebadf)?;
    if node.meta().flags.intersects(NodeFlags::PIPE | NodeFlags::CHARDEVICE) {
        return Err(Errno::Espipe);
    }
    let base = match whence {
        SEEK_SET => 0,
        SEEK_CUR => entry.offset as i64,
        SEEK_END => node.size() as i64,
        _ => return Err(Errno::Einval),
    };
    let target = base.checked_add(offset).ok_or(Errno::Einval)?;
    if target < 0 {
        return Err(Errno::Einval);
    }
    entry.offset = target as u64;
    Ok(target)
}

pub fn sys_dup2(cx: &SyscallContext, src: i64, dest: i64) -> SysResult {
    let fd = cx.fds()?.lock().move_fd(src, dest)?;
    Ok(fd as i64)
}

pub fn sys_stat(cx: &SyscallContext, fd: i64, st: usize) -> SysResult {
    cx.check_ptr(st)?;
    let node = cx.handle(fd)?;
    cx.put(st, &Stat::from_handle(&node))?;
    Ok(0)
}

/// Stat by path. A missing node zeroes `st` and reports `Enoent`.
fn stat_path(cx: &SyscallContext, path: usize, st: usize, flags: OpenFlags) -> SysResult {
    let path = cx.string(path)?;
    cx.check_ptr(st)?;
    let (cwd, _, _) = cx.identity();
    match cx.kernel.vfs.kopen(&cwd, &path, flags) {
        Some(node) => {
            cx.put(st, &Stat::from_handle(&node))?;
            Ok(0)
        }
        None => {
            cx.put(st, &Stat::default())?;
            Err(Errno::Enoent)
        }
    }
}

pub fn sys_statf(cx: &SyscallContext, path: usize, st: usize) -> SysResult {
    stat_path(cx, path, st, OpenFlags::empty())
}

pub fn sys_lstat(cx: &SyscallContext, path: usize, st: usize) -> SysResult {
    stat_path(cx, path, st, OpenFlags::PATH | OpenFlags::NOFOLLOW)
}

/// Entry `index` of directory `fd`: 1 if written, 0 past the end.
pub fn sys_readdir(cx: &SyscallContext, fd: i64, index: u64, entry: usize) -> SysResult {
    cx.check_ptr(entry)?;
    let node = cx.handle(fd)?;
    match node.readdir(index) {
        Some(dirent) => {
            cx.put(entry, &RawDirent::from(&dirent))?;
            Ok(1)
        }
        None => Ok(0),
    }
}

pub fn sys_ioctl(cx: &SyscallContext, fd: i64, request: u64, argp: usize) -> SysResult {
    cx.check_ptr(argp)?;
    let node = cx.handle(fd)?;
    node.ioctl(request, argp)
}

/// Check the R/W/X bits of `mode` (4/2/1) against `path`. Zero only
/// tests that the path exists.
pub fn sys_access(cx: &SyscallContext, path: usize, mode: i64) -> SysResult {
    let path = cx.string(path)?;
    let (cwd, uid, _) = cx.identity();
    let node = cx.kernel.vfs.kopen(&cwd, &path, OpenFlags::empty()).ok_or(Errno::Enoent)?;
    let meta = node.meta();
    for bit in [perm::READ, perm::WRITE, perm::EXEC] {
        if mode & bit as i64 != 0 && !has_permission(&meta, bit, uid) {
            return Err(Errno::Eacces);
        }
    }
    Ok(0)
}

/// Only root or the owner may change permission bits.
pub fn sys_chmod(cx: &SyscallContext, path: usize, mode: u32) -> SysResult {
    let path = cx.string(path)?;
    let (cwd, uid, _) = cx.identity();
    let node = cx.kernel.vfs.kopen(&cwd, &path, OpenFlags::empty()).ok_or(Errno::Enoent)?;
    if uid != USER_ROOT_UID && uid != node.meta().uid {
        return Err(Errno::Eacces);
    }
    node.chmod(mode)?;
    Ok(0)
}

pub fn sys_chown(cx: &SyscallContext, path: usize, owner: Uid, group: Uid) -> SysResult {
    let path = cx.string(path)?;
    let (cwd, uid, _) = cx.identity();
    let node = cx.kernel.vfs.kopen(&cwd, &path, OpenFlags::empty()).ok_or(Errno::Enoent)?;
    if uid != USER_ROOT_UID {
        return Err(Errno::Eacces);
    }
    node.chown(owner, group)?;
    Ok(0)
}

pub fn sys_mkdir(cx: &SyscallContext, path: usize, mode: u32) -> SysResult {
    let path = cx.string(path)?;
    let (cwd, uid, mask) = cx.identity();
    cx.kernel.vfs.mkdir(&cwd, &path, mode & !mask & 0o7777, uid)?;
    Ok(0)
}

pub fn sys_unlink(cx: &SyscallContext, path: usize) -> SysResult {
    let path = cx.string(path)?;
    let (cwd, uid, _) = cx.identity();
    cx.kernel.vfs.unlink(&cwd, &path, uid)?;
    Ok(0)
}

pub fn sys_symlink(cx: &SyscallContext, target: usize, name: usize) -> SysResult {
    let target = cx.string(target)?;
    let name = cx.string(name)?;
    let (cwd, uid, _) = cx.identity();
    cx.kernel.vfs.symlink(&cwd, &target, &name, uid)?;
    Ok(0)
}

/// Copy the target of symlink `path` into `buf`; returns its length.
pub fn sys_readlink(cx: &SyscallContext, path: usize, buf: usize, len: usize) -> SysResult {
    let path = cx.string(path)?;
    let mut out = cx.buffer_mut(buf, len)?;
    let (cwd, _, _) = cx.identity();
    let node = cx
        .kernel
        .vfs
        .kopen(&cwd, &path, OpenFlags::PATH | OpenFlags::NOFOLLOW)
        .ok_or(Errno::Enoent)?;
    let n = node.readlink(out.as_bytes_mut())?;
    Ok(n as i64)
}

pub fn sys_chdir(cx: &SyscallContext, path: usize) -> SysResult {
    let path = cx.string(path)?;
    let (cwd, uid, _) = cx.identity();
    let canonical = crate::vfs::canonicalize_path(&cwd, &path);
    let node = cx
        .kernel
        .vfs
        .kopen("/", &canonical, OpenFlags::empty())
        .ok_or(Errno::Enoent)?;
    let meta = node.meta();
    if !meta.is_dir() {
        return Err(Errno::Enotdir);
    }
    if !has_permission(&meta, perm::EXEC, uid) {
        return Err(Errno::Eacces);
    }
    let mut p = cx.proc.lock();
    p.wd_name = canonical;
    p.wd_node = Some(node);
    Ok(0)
}

/// Copy the working directory, truncated to `size`; returns `buf`.
pub fn sys_getcwd(cx: &SyscallContext, buf: usize, size: usize) -> SysResult {
    cx.check_ptr(buf)?;
    if buf == 0 {
        return Ok(0);
    }
    let (cwd, _, _) = cx.identity();
    let len = size.min(cwd.len() + 1);
    let mut out = cx.buffer_mut(buf, len)?;
    let out = out.as_bytes_mut();
    let copied = len.min(cwd.len());
    out[..copied].copy_from_slice(&cwd.as_bytes()[..copied]);
    if len > cwd.len() {
        out[cwd.len()] = 0;
    }
    Ok(buf as i64)
}

/// Mount `source` at `target` with a registered filesystem type.
///
/// Root only. All three strings must lie inside the user window; a bad
/// pointer fails the call without the pointer guard.
pub fn sys_mount(cx: &SyscallContext, source: usize, target: usize, fs_type: usize) -> SysResult {
    if cx.uid() != USER_ROOT_UID {
        return Err(Errno::Eperm);
    }
    if ![source, target, fs_type].iter().all(|&p| cx.space.in_range(p)) {
        return Err(Errno::Efault);
    }
    let source = cx.space.read_cstr(source)?;
    let target = cx.space.read_cstr(target)?;
    let fs_type = cx.space.read_cstr(fs_type)?;
    log::info!("[VFS] mount {} ({}) on {}", source, fs_type, target);
    cx.kernel.vfs.mount_type(&fs_type, &source, &target)?;
    Ok(0)
}
