//! Virtual Filesystem Boundary
//!
//! The process layer never knows which backend a file lives on. Concrete
//! filesystems (tmpfs, procfs, device nodes) implement [`FsNode`]; the
//! syscall layer calls the hooks uniformly through [`NodeHandle`] and
//! [`Vfs`].
//!
//! # Node Lifetime
//! - Opening a node runs its `open` hook and yields a `NodeHandle`
//! - Cloning a handle is the filesystem-level clone: the same open file
//! - When the last clone of a handle is dropped, the `close` hook runs

mod mount;
mod path;
#[cfg(test)]
pub(crate) mod testfs;

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;

use crate::config::USER_ROOT_UID;
use crate::errno::Errno;

pub use mount::{MountCallback, MountInfo, Vfs};
pub use path::{canonicalize_path, split_parent};

/// User id
pub type Uid = u32;
/// Group id
pub type Gid = u32;

bitflags! {
    /// Node type flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u64 {
        const FILE        = 0x01;
        const DIRECTORY   = 0x02;
        const CHARDEVICE  = 0x04;
        const BLOCKDEVICE = 0x08;
        const PIPE        = 0x10;
        const SYMLINK     = 0x20;
        const MOUNTPOINT  = 0x40;
    }
}

bitflags! {
    /// Flags accepted by `open`. Read-only is the absence of both
    /// `WRONLY` and `RDWR`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u64 {
        const WRONLY    = 0x0001;
        const RDWR      = 0x0002;
        const APPEND    = 0x0008;
        const CREAT     = 0x0200;
        const TRUNC     = 0x0400;
        const EXCL      = 0x0800;
        const NOFOLLOW  = 0x1000;
        const PATH      = 0x2000;
        const NONBLOCK  = 0x4000;
        const DIRECTORY = 0x8000;
    }
}

/// Permission bits as used by [`has_permission`].
pub mod perm {
    pub const EXEC: u32 = 0o1;
    pub const WRITE: u32 = 0o2;
    pub const READ: u32 = 0o4;
}

/// Mode bits reported by `stat`
pub mod mode {
    pub const IFMT: u32 = 0o170000;
    pub const IFDIR: u32 = 0o040000;
    pub const IFCHR: u32 = 0o020000;
    pub const IFBLK: u32 = 0o060000;
    pub const IFREG: u32 = 0o100000;
    pub const IFLNK: u32 = 0o120000;
    pub const IFIFO: u32 = 0o010000;
}

/// Snapshot of a node's attributes.
#[derive(Debug, Clone)]
pub struct NodeMeta {
    pub name: String,
    pub device: u64,
    /// Permission bits (0o777 plus setuid/sticky)
    pub mask: u32,
    pub uid: Uid,
    pub gid: Gid,
    pub flags: NodeFlags,
    pub inode: u64,
    pub length: u64,
    pub nlink: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

impl NodeMeta {
    /// Metadata for a node of `flags` type with everything else zeroed.
    pub fn new(name: &str, flags: NodeFlags, mask: u32) -> Self {
        Self {
            name: String::from(name),
            device: 0,
            mask,
            uid: 0,
            gid: 0,
            flags,
            inode: 0,
            length: 0,
            nlink: 1,
            atime: 0,
            mtime: 0,
            ctime: 0,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.flags.contains(NodeFlags::DIRECTORY)
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.flags.contains(NodeFlags::SYMLINK)
    }
}

/// One directory entry returned by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u32,
    pub name: String,
}

/// Shared reference to a backend node.
pub type NodeRef = Arc<dyn FsNode>;

/// Capability interface every filesystem backend implements.
///
/// Hooks a backend does not support keep their default, which reports
/// `Enotsup` (or does nothing for notifications).
pub trait FsNode: Send + Sync {
    /// Current attributes.
    fn meta(&self) -> NodeMeta;

    fn read(&self, _offset: u64, _buf: &mut [u8]) -> Result<usize, Errno> {
        Err(Errno::Enotsup)
    }

    fn write(&self, _offset: u64, _buf: &[u8]) -> Result<usize, Errno> {
        Err(Errno::Enotsup)
    }

    /// Called every time the node is opened or a descriptor is duplicated.
    fn open(&self, _flags: OpenFlags) {}

    /// Called once the last handle to an open is released.
    fn close(&self) {}

    fn readdir(&self, _index: u64) -> Option<DirEntry> {
        None
    }

    fn finddir(&self, _name: &str) -> Option<NodeRef> {
        None
    }

    fn create(&self, _name: &str, _mode: u32, _owner: Uid) -> Result<(), Errno> {
        Err(Errno::Enotsup)
    }

    fn unlink(&self, _name: &str) -> Result<(), Errno> {
        Err(Errno::Enotsup)
    }

    fn mkdir(&self, _name: &str, _mode: u32, _owner: Uid) -> Result<(), Errno> {
        Err(Errno::Enotsup)
    }

    fn symlink(&self, _target: &str, _name: &str, _owner: Uid) -> Result<(), Errno> {
        Err(Errno::Enotsup)
    }

    fn readlink(&self, _buf: &mut [u8]) -> Result<usize, Errno> {
        Err(Errno::Enotsup)
    }

    fn chmod(&self, _mode: u32) -> Result<(), Errno> {
        Err(Errno::Enotsup)
    }

    fn chown(&self, _uid: Uid, _gid: Gid) -> Result<(), Errno> {
        Err(Errno::Enotsup)
    }

    fn truncate(&self) {}

    fn ioctl(&self, _request: u64, _arg: usize) -> Result<i64, Errno> {
        Err(Errno::Enotsup)
    }

    /// Dynamic size, for nodes whose `length` is not authoritative.
    fn get_size(&self) -> Option<u64> {
        None
    }
}

struct OpenNode {
    node: NodeRef,
}

impl Drop for OpenNode {
    fn drop(&mut self) {
        self.node.close();
    }
}

/// An opened node.
///
/// Clones share one open; the backend's `close` hook runs when the last
/// clone goes away.
#[derive(Clone)]
pub struct NodeHandle(Arc<OpenNode>);

impl NodeHandle {
    /// Open `node`, running its `open` hook.
    pub fn open(node: NodeRef, flags: OpenFlags) -> Self {
        node.open(flags);
        Self(Arc::new(OpenNode { node }))
    }

    /// Duplicate this open for another descriptor slot.
    ///
    /// Runs the `open` hook again, as `dup2` does.
    pub fn reopen(&self) -> Self {
        self.0.node.open(OpenFlags::empty());
        self.clone()
    }

    /// The backend node.
    #[inline]
    pub fn node(&self) -> &NodeRef {
        &self.0.node
    }

    /// True if both handles are the same open.
    #[inline]
    pub fn same_open(&self, other: &NodeHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live handles sharing this open.
    pub fn open_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    #[inline]
    pub fn meta(&self) -> NodeMeta {
        self.0.node.meta()
    }

    /// Size as reported by `get_size`, falling back to `length`.
    pub fn size(&self) -> u64 {
        self.0.node.get_size().unwrap_or_else(|| self.meta().length)
    }
}

impl core::ops::Deref for NodeHandle {
    type Target = dyn FsNode;

    fn deref(&self) -> &Self::Target {
        &*self.0.node
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = self.meta();
        write!(f, "NodeHandle({:?}, inode={})", meta.name, meta.inode)
    }
}

/// Check `permission` (one of [`perm`]) for `uid` against `meta`.
///
/// Root may read and write anything, and execute anything with at least
/// one execute bit. Everyone else gets the owner bits if they own the
/// node and the other bits otherwise.
pub fn has_permission(meta: &NodeMeta, permission: u32, uid: Uid) -> bool {
    if uid == USER_ROOT_UID {
        if permission == perm::EXEC {
            return meta.mask & 0o111 != 0;
        }
        return true;
    }
    let user_perm = (meta.mask >> 6) & 0o7;
    let other_perm = meta.mask & 0o7;
    if uid == meta.uid {
        user_perm & permission == permission
    } else {
        other_perm & permission == permission
    }
}

/// `struct stat` as written to user space.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub st_dev: u16,
    pub st_ino: u16,
    pub st_mode: u32,
    pub st_nlink: u16,
    pub st_uid: u16,
    pub st_gid: u16,
    pub st_rdev: u16,
    pub st_size: u32,
    pub st_atime: u64,
    pub st_mtime: u64,
    pub st_ctime: u64,
    pub st_blksize: u32,
    pub st_blocks: u32,
}

impl Stat {
    /// Build the user-visible stat record for an opened node.
    pub fn from_handle(handle: &NodeHandle) -> Self {
        let meta = handle.meta();
        let mut type_bits = 0;
        if meta.flags.contains(NodeFlags::FILE) {
            type_bits |= mode::IFREG;
        }
        if meta.flags.contains(NodeFlags::DIRECTORY) {
            type_bits |= mode::IFDIR;
        }
        if meta.flags.contains(NodeFlags::CHARDEVICE) {
            type_bits |= mode::IFCHR;
        }
        if meta.flags.contains(NodeFlags::BLOCKDEVICE) {
            type_bits |= mode::IFBLK;
        }
        if meta.flags.contains(NodeFlags::PIPE) {
            type_bits |= mode::IFIFO;
        }
        if meta.flags.contains(NodeFlags::SYMLINK) {
            type_bits |= mode::IFLNK;
        }
        Self {
            st_dev: ((meta.device & 0xFFFF0) >> 8) as u16,
            st_ino: meta.inode as u16,
            st_mode: meta.mask | type_bits,
            st_nlink: meta.nlink as u16,
            st_uid: meta.uid as u16,
            st_gid: meta.gid as u16,
            st_rdev: 0,
            st_size: handle.size() as u32,
            st_atime: meta.atime,
            st_mtime: meta.mtime,
            st_ctime: meta.ctime,
            st_blksize: 512,
            st_blocks: 0,
        }
    }
}

/// `struct dirent` as written to user space.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawDirent {
    pub ino: u32,
    pub name: [u8; 256],
}

impl From<&DirEntry> for RawDirent {
    fn from(entry: &DirEntry) -> Self {
        let mut name = [0u8; 256];
        let bytes = entry.name.as_bytes();
        let len = bytes.len().min(name.len() - 1);
        name[..len].copy_from_slice(&bytes[..len]);
        Self { ino: entry.ino, name }
    }
}

#[cfg(test)]
mod tests {
    use super::testfs::RamFs;
    use super::*;

    fn meta(mask: u32, uid: Uid) -> NodeMeta {
        let mut m = NodeMeta::new("f", NodeFlags::FILE, mask);
        m.uid = uid;
        m
    }

    #[test]
    fn test_owner_and_other_bits() {
        let m = meta(0o640, 100);
        assert!(has_permission(&m, perm::READ, 100));
        assert!(has_permission(&m, perm::WRITE, 100));
        assert!(!has_permission(&m, perm::READ, 200));
    }

    #[test]
    fn test_root_exec_needs_some_x_bit() {
        assert!(has_permission(&meta(0o000, 5), perm::WRITE, 0));
        assert!(!has_permission(&meta(0o644, 5), perm::EXEC, 0));
        assert!(has_permission(&meta(0o744, 5), perm::EXEC, 0));
    }

    #[test]
    fn test_close_hook_runs_after_last_clone() {
        let fs = RamFs::new();
        let file = fs.add_file("/a", b"hello", 0o644, 0);
        let handle = NodeHandle::open(file.clone(), OpenFlags::empty());
        let dup = handle.reopen();
        assert_eq!(file.opens(), 2);
        assert!(handle.same_open(&dup));
        drop(handle);
        assert_eq!(file.closes(), 0);
        drop(dup);
        assert_eq!(file.closes(), 1);
    }

    #[test]
    fn test_stat_reports_type_and_size() {
        let fs = RamFs::new();
        let file = fs.add_file("/a", b"hello", 0o644, 3);
        let st = Stat::from_handle(&NodeHandle::open(file, OpenFlags::empty()));
        assert_eq!(st.st_mode, mode::IFREG | 0o644);
        assert_eq!(st.st_size, 5);
        assert_eq!(st.st_uid, 3);
    }
}
