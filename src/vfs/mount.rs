//! Mount Table and Path Resolution
//!
//! `Vfs` maps absolute paths onto backend nodes: a longest-prefix mount
//! table, a registry of mountable filesystem types, and the path-level
//! operations (`kopen`, create, mkdir, unlink, symlink) the syscall layer
//! uses.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use super::path::{canonicalize_path, split_parent};
use super::{has_permission, perm, NodeFlags, NodeHandle, NodeRef, OpenFlags, Uid};
use crate::config::{MAX_SYMLINK_DEPTH, PATH_MAX};
use crate::errno::Errno;

/// Builds the root node of a filesystem from a device argument.
pub type MountCallback = fn(arg: &str, mountpoint: &str) -> Option<NodeRef>;

struct Mount {
    root: NodeRef,
    fs_type: String,
    device: String,
}

/// One row of the mount table, for `/proc/mounts`-style export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub path: String,
    pub fs_type: String,
    pub device: String,
}

/// The virtual filesystem switch.
pub struct Vfs {
    mounts: Mutex<BTreeMap<String, Mount>>,
    types: Mutex<BTreeMap<String, MountCallback>>,
}

impl Vfs {
    pub const fn new() -> Self {
        Self {
            mounts: Mutex::new(BTreeMap::new()),
            types: Mutex::new(BTreeMap::new()),
        }
    }

    /// Attach `root` at `path`, replacing any previous mount there.
    pub fn mount(&self, path: &str, root: NodeRef) {
        self.mount_as(path, root, "none", "none");
    }

    fn mount_as(&self, path: &str, root: NodeRef, fs_type: &str, device: &str) {
        let path = canonicalize_path("/", path);
        log::debug!("[VFS] mounted {} ({}) at {}", device, fs_type, path);
        self.mounts.lock().insert(
            path,
            Mount {
                root,
                fs_type: fs_type.to_string(),
                device: device.to_string(),
            },
        );
    }

    /// Register a mountable filesystem type.
    pub fn register(&self, name: &str, callback: MountCallback) -> Result<(), Errno> {
        let mut types = self.types.lock();
        if types.contains_key(name) {
            return Err(Errno::Eexist);
        }
        types.insert(name.to_string(), callback);
        Ok(())
    }

    /// Mount a filesystem of a registered type.
    pub fn mount_type(&self, fs_type: &str, arg: &str, mountpoint: &str) -> Result<(), Errno> {
        let callback = self.types.lock().get(fs_type).copied().ok_or(Errno::Enodev)?;
        let root = callback(arg, mountpoint).ok_or(Errno::Einval)?;
        self.mount_as(mountpoint, root, fs_type, arg);
        Ok(())
    }

    /// Snapshot of the mount table.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .lock()
            .iter()
            .map(|(path, m)| MountInfo {
                path: path.clone(),
                fs_type: m.fs_type.clone(),
                device: m.device.clone(),
            })
            .collect()
    }

    /// Deepest mount covering `path`, and the path remaining below it.
    fn mount_for<'p>(&self, path: &'p str) -> Option<(NodeRef, String, &'p str)> {
        let mounts = self.mounts.lock();
        let mut best: Option<(&String, &Mount)> = None;
        for (prefix, mount) in mounts.iter() {
            let covers = prefix == "/"
                || path == prefix
                || (path.starts_with(prefix.as_str()) && path[prefix.len()..].starts_with('/'));
            if covers && best.map_or(true, |(p, _)| prefix.len() > p.len()) {
                best = Some((prefix, mount));
            }
        }
        let (prefix, mount) = best?;
        let rest = if prefix == "/" { path } else { &path[prefix.len()..] };
        Some((mount.root.clone(), prefix.clone(), rest))
    }

    /// Resolve a canonical absolute path to a node.
    ///
    /// Symlinks in intermediate components are always followed; the final
    /// component is followed only when `follow_final` is set.
    pub fn resolve(&self, path: &str, follow_final: bool) -> Option<NodeRef> {
        self.resolve_depth(path, follow_final, 0)
    }

    fn resolve_depth(&self, path: &str, follow_final: bool, depth: usize) -> Option<NodeRef> {
        let (mut node, mut walked, rest) = self.mount_for(path)?;
        let components: Vec<&str> = rest.split('/').filter(|c| !c.is_empty()).collect();
        for (i, name) in components.iter().enumerate() {
            let child = node.finddir(name)?;
            let is_last = i + 1 == components.len();
            if child.meta().flags.contains(NodeFlags::SYMLINK) && (!is_last || follow_final) {
                if depth >= MAX_SYMLINK_DEPTH {
                    log::debug!("[VFS] symlink depth exceeded resolving {}", path);
                    return None;
                }
                let mut buf = vec![0u8; PATH_MAX];
                let len = child.readlink(&mut buf).ok()?;
                let target = core::str::from_utf8(&buf[..len]).ok()?;
                let mut next = canonicalize_path(&walked, target);
                for rest in &components[i + 1..] {
                    next.push('/');
                    next.push_str(rest);
                }
                let next = canonicalize_path("/", &next);
                return self.resolve_depth(&next, follow_final, depth + 1);
            }
            if !walked.ends_with('/') {
                walked.push('/');
            }
            walked.push_str(name);
            node = child;
        }
        Some(node)
    }

    /// Open `path` (relative to `cwd`), running the node's open hook.
    pub fn kopen(&self, cwd: &str, path: &str, flags: OpenFlags) -> Option<NodeHandle> {
        let path = canonicalize_path(cwd, path);
        let follow = !flags.contains(OpenFlags::NOFOLLOW);
        let node = self.resolve(&path, follow)?;
        Some(NodeHandle::open(node, flags))
    }

    /// Parent directory node of `path`, checked for write access by `uid`.
    fn writable_parent<'p>(&self, path: &'p str, uid: Uid) -> Result<(NodeRef, &'p str), Errno> {
        let (parent_path, name) = split_parent(path).ok_or(Errno::Eexist)?;
        let parent = self.resolve(parent_path, true).ok_or(Errno::Enoent)?;
        let meta = parent.meta();
        if !meta.is_dir() {
            return Err(Errno::Enotdir);
        }
        if !has_permission(&meta, perm::WRITE, uid) {
            return Err(Errno::Eacces);
        }
        Ok((parent, name))
    }

    /// Create a regular file.
    pub fn create_file(&self, cwd: &str, path: &str, mode: u32, uid: Uid) -> Result<(), Errno> {
        let path = canonicalize_path(cwd, path);
        let (parent, name) = self.writable_parent(&path, uid)?;
        parent.create(name, mode, uid)
    }

    /// Create a directory. Fails with `Eexist` if anything is at `path`.
    pub fn mkdir(&self, cwd: &str, path: &str, mode: u32, uid: Uid) -> Result<(), Errno> {
        let path = canonicalize_path(cwd, path);
        if self.resolve(&path, false).is_some() {
            return Err(Errno::Eexist);
        }
        let (parent, name) = self.writable_parent(&path, uid)?;
        parent.mkdir(name, mode, uid)
    }

    /// Remove a directory entry.
    pub fn unlink(&self, cwd: &str, path: &str, uid: Uid) -> Result<(), Errno> {
        let path = canonicalize_path(cwd, path);
        let (parent, name) = self.writable_parent(&path, uid)?;
        parent.unlink(name)
    }

    /// Create a symlink at `name` pointing to `target` (stored verbatim).
    pub fn symlink(&self, cwd: &str, target: &str, name: &str, uid: Uid) -> Result<(), Errno> {
        let path = canonicalize_path(cwd, name);
        let (parent, name) = self.writable_parent(&path, uid)?;
        parent.symlink(target, name, uid)
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testfs::RamFs;
    use super::*;

    fn vfs_with(fs: &RamFs) -> Vfs {
        let vfs = Vfs::new();
        vfs.mount("/", fs.root());
        vfs
    }

    #[test]
    fn test_kopen_relative_path() {
        let fs = RamFs::new();
        fs.add_dir("/home", 0o755, 0);
        fs.add_file("/home/notes", b"x", 0o644, 0);
        let vfs = vfs_with(&fs);
        let node = vfs.kopen("/home", "notes", OpenFlags::empty()).unwrap();
        assert_eq!(node.meta().name, "notes");
        assert!(vfs.kopen("/", "missing", OpenFlags::empty()).is_none());
    }

    #[test]
    fn test_symlink_follow_and_nofollow() {
        let fs = RamFs::new();
        fs.add_dir("/etc", 0o755, 0);
        fs.add_file("/etc/real", b"data", 0o644, 0);
        let vfs = vfs_with(&fs);
        vfs.symlink("/", "/etc/real", "/link", 0).unwrap();
        let followed = vfs.kopen("/", "/link", OpenFlags::empty()).unwrap();
        assert_eq!(followed.meta().name, "real");
        let raw = vfs.kopen("/", "/link", OpenFlags::NOFOLLOW | OpenFlags::PATH).unwrap();
        assert!(raw.meta().is_symlink());
    }

    #[test]
    fn test_relative_symlink_in_middle_of_path() {
        let fs = RamFs::new();
        fs.add_dir("/data", 0o755, 0);
        fs.add_dir("/data/v1", 0o755, 0);
        fs.add_file("/data/v1/file", b"1", 0o644, 0);
        let vfs = vfs_with(&fs);
        vfs.symlink("/", "v1", "/data/current", 0).unwrap();
        let node = vfs.kopen("/", "/data/current/file", OpenFlags::empty()).unwrap();
        assert_eq!(node.meta().name, "file");
    }

    #[test]
    fn test_symlink_loop_gives_up() {
        let fs = RamFs::new();
        let vfs = vfs_with(&fs);
        vfs.symlink("/", "/b", "/a", 0).unwrap();
        vfs.symlink("/", "/a", "/b", 0).unwrap();
        assert!(vfs.kopen("/", "/a", OpenFlags::empty()).is_none());
    }

    #[test]
    fn test_longest_prefix_mount_wins() {
        let root = RamFs::new();
        root.add_dir("/mnt", 0o755, 0);
        let other = RamFs::new();
        other.add_file("/inside", b"", 0o644, 0);
        let vfs = vfs_with(&root);
        vfs.mount("/mnt", other.root());
        assert!(vfs.kopen("/", "/mnt/inside", OpenFlags::empty()).is_some());
        assert_eq!(vfs.mounts().len(), 2);
    }

    #[test]
    fn test_mount_type_registry() {
        fn make(_arg: &str, _mp: &str) -> Option<NodeRef> {
            Some(RamFs::new().root())
        }
        let fs = RamFs::new();
        fs.add_dir("/tmp", 0o777, 0);
        let vfs = vfs_with(&fs);
        assert_eq!(vfs.mount_type("tmpfs", "x", "/tmp"), Err(Errno::Enodev));
        vfs.register("tmpfs", make).unwrap();
        assert_eq!(vfs.register("tmpfs", make), Err(Errno::Eexist));
        vfs.mount_type("tmpfs", "x", "/tmp").unwrap();
        assert!(vfs.mounts().iter().any(|m| m.path == "/tmp" && m.fs_type == "tmpfs"));
    }

    #[test]
    fn test_create_needs_parent_write_permission() {
        let fs = RamFs::new();
        fs.add_dir("/locked", 0o755, 0);
        let vfs = vfs_with(&fs);
        assert_eq!(vfs.create_file("/", "/locked/f", 0o644, 1000), Err(Errno::Eacces));
        assert!(vfs.create_file("/", "/locked/f", 0o644, 0).is_ok());
        assert_eq!(vfs.mkdir("/", "/locked", 0o755, 0), Err(Errno::Eexist));
    }
}
