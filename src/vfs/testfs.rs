//! In-memory filesystem used by the unit tests.
//!
//! Implements enough of [`FsNode`] to drive the syscall layer and counts
//! open/close hook invocations so descriptor lifetime can be checked.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use super::path::{canonicalize_path, split_parent};
use super::{DirEntry, FsNode, Gid, NodeFlags, NodeMeta, NodeRef, OpenFlags, Uid};
use crate::errno::Errno;

static NEXT_INODE: AtomicU64 = AtomicU64::new(1);

pub struct RamNode {
    meta: Mutex<NodeMeta>,
    data: Mutex<Vec<u8>>,
    children: Mutex<BTreeMap<String, Arc<RamNode>>>,
    target: Option<String>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    ioctls: AtomicUsize,
}

impl RamNode {
    fn new(name: &str, flags: NodeFlags, mask: u32, uid: Uid, target: Option<String>) -> Arc<Self> {
        let mut meta = NodeMeta::new(name, flags, mask);
        meta.uid = uid;
        meta.gid = uid;
        meta.inode = NEXT_INODE.fetch_add(1, Ordering::Relaxed);
        if let Some(t) = &target {
            meta.length = t.len() as u64;
        }
        Arc::new(Self {
            meta: Mutex::new(meta),
            data: Mutex::new(Vec::new()),
            children: Mutex::new(BTreeMap::new()),
            target,
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            ioctls: AtomicUsize::new(0),
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn insert(&self, node: Arc<RamNode>) -> Result<(), Errno> {
        let name = node.meta.lock().name.clone();
        let mut children = self.children.lock();
        if children.contains_key(&name) {
            return Err(Errno::Eexist);
        }
        children.insert(name, node);
        Ok(())
    }

    pub fn ioctls(&self) -> usize {
        self.ioctls.load(Ordering::SeqCst)
    }
}

impl FsNode for RamNode {
    fn meta(&self) -> NodeMeta {
        self.meta.lock().clone()
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Errno> {
        if self.meta.lock().is_dir() {
            return Err(Errno::Eisdir);
        }
        let data = self.data.lock();
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<usize, Errno> {
        let mut data = self.data.lock();
        let end = offset as usize + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset as usize..end].copy_from_slice(buf);
        self.meta.lock().length = data.len() as u64;
        Ok(buf.len())
    }

    fn open(&self, _flags: OpenFlags) {
        self.opens.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn readdir(&self, index: u64) -> Option<DirEntry> {
        let children = self.children.lock();
        let (name, node) = children.iter().nth(index as usize)?;
        let ino = node.meta.lock().inode as u32;
        Some(DirEntry {
            ino,
            name: name.clone(),
        })
    }

    fn finddir(&self, name: &str) -> Option<NodeRef> {
        let child = self.children.lock().get(name).cloned()?;
        Some(child as NodeRef)
    }

    fn create(&self, name: &str, mode: u32, owner: Uid) -> Result<(), Errno> {
        self.insert(RamNode::new(name, NodeFlags::FILE, mode, owner, None))
    }

    fn unlink(&self, name: &str) -> Result<(), Errno> {
        self.children.lock().remove(name).map(|_| ()).ok_or(Errno::Enoent)
    }

    fn mkdir(&self, name: &str, mode: u32, owner: Uid) -> Result<(), Errno> {
        self.insert(RamNode::new(name, NodeFlags::DIRECTORY, mode, owner, None))
    }

    fn symlink(&self, target: &str, name: &str, owner: Uid) -> Result<(), Errno> {
        self.insert(RamNode::new(name, NodeFlags::SYMLINK, 0o777, owner, Some(target.to_string())))
    }

    fn readlink(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        let target = self.target.as_ref().ok_or(Errno::Einval)?;
        let n = buf.len().min(target.len());
        buf[..n].copy_from_slice(&target.as_bytes()[..n]);
        Ok(n)
    }

    fn chmod(&self, mode: u32) -> Result<(), Errno> {
        let mut meta = self.meta.lock();
        meta.mask = mode & 0o7777;
        Ok(())
    }

    fn chown(&self, uid: Uid, gid: Gid) -> Result<(), Errno> {
        let mut meta = self.meta.lock();
        meta.uid = uid;
        meta.gid = gid;
        Ok(())
    }

    fn truncate(&self) {
        self.data.lock().clear();
        self.meta.lock().length = 0;
    }

    fn ioctl(&self, request: u64, _arg: usize) -> Result<i64, Errno> {
        self.ioctls.fetch_add(1, Ordering::SeqCst);
        Ok(request as i64)
    }
}

/// A tree of [`RamNode`]s rooted at `/`.
pub struct RamFs {
    root: Arc<RamNode>,
}

impl RamFs {
    pub fn new() -> Self {
        Self {
            root: RamNode::new("/", NodeFlags::DIRECTORY, 0o755, 0, None),
        }
    }

    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }

    fn dir_of(&self, path: &str) -> Arc<RamNode> {
        let mut node = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let next = node.children.lock().get(part).cloned().expect("test path exists");
            node = next;
        }
        node
    }

    fn add(&self, path: &str, flags: NodeFlags, mask: u32, uid: Uid) -> Arc<RamNode> {
        let path = canonicalize_path("/", path);
        let (parent, name) = split_parent(&path).expect("not root");
        let node = RamNode::new(name, flags, mask, uid, None);
        self.dir_of(parent).insert(node.clone()).expect("fresh name");
        node
    }

    pub fn add_dir(&self, path: &str, mask: u32, uid: Uid) -> Arc<RamNode> {
        self.add(path, NodeFlags::DIRECTORY, mask, uid)
    }

    pub fn add_file(&self, path: &str, data: &[u8], mask: u32, uid: Uid) -> Arc<RamNode> {
        let node = self.add(path, NodeFlags::FILE, mask, uid);
        node.write(0, data).expect("ram write");
        node
    }

    pub fn add_device(&self, path: &str, mask: u32) -> Arc<RamNode> {
        self.add(path, NodeFlags::CHARDEVICE, mask, 0)
    }

    /// Look up an existing node by absolute path.
    pub fn get(&self, path: &str) -> Option<Arc<RamNode>> {
        let path = canonicalize_path("/", path);
        match split_parent(&path) {
            None => Some(self.root.clone()),
            Some((parent, name)) => self.dir_of(parent).children.lock().get(name).cloned(),
        }
    }
}
