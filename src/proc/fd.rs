//! File Descriptor Tables
//!
//! A table maps small integers to open nodes. Closed slots become holes
//! that `append` fills lowest-first before the table grows; growth
//! doubles the capacity.
//!
//! # Sharing
//! Tables are held through [`SharedFdTable`]. A thread-like child stores
//! another reference to its parent's table, so offsets and modes changed
//! through one are seen by all sharers. The table is freed, and its nodes
//! closed, when the last reference is dropped.

use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use spin::Mutex;

use crate::errno::Errno;
use crate::vfs::NodeHandle;

bitflags! {
    /// Access granted to a descriptor at open time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AccessMode: u32 {
        const READ  = 0o1;
        const WRITE = 0o2;
    }
}

/// One descriptor slot. A slot without a node is a hole.
#[derive(Debug, Clone, Default)]
pub struct FdEntry {
    pub node: Option<NodeHandle>,
    pub offset: u64,
    pub mode: AccessMode,
}

/// A descriptor table shared by reference.
pub type SharedFdTable = Arc<Mutex<FdTable>>;

/// Per-process descriptor array.
#[derive(Debug)]
pub struct FdTable {
    entries: Vec<FdEntry>,
    capacity: usize,
}

impl FdTable {
    /// Empty table with room for `capacity` descriptors.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Empty table wrapped for sharing.
    pub fn new_shared(capacity: usize) -> SharedFdTable {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Logical length: one past the highest slot ever used.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Physical capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots holding a node.
    pub fn open_count(&self) -> usize {
        self.entries.iter().filter(|e| e.node.is_some()).count()
    }

    /// Place `node` in the lowest hole, or at the end if there is none.
    ///
    /// The slot's mode and offset are reset to zero; callers set them.
    pub fn append(&mut self, node: NodeHandle) -> usize {
        let entry = FdEntry {
            node: Some(node),
            offset: 0,
            mode: AccessMode::empty(),
        };
        if let Some(idx) = self.entries.iter().position(|e| e.node.is_none()) {
            self.entries[idx] = entry;
            return idx;
        }
        if self.entries.len() == self.capacity {
            self.capacity *= 2;
            self.entries.reserve_exact(self.capacity - self.entries.len());
        }
        self.entries.push(entry);
        self.entries.len() - 1
    }

    fn index(&self, fd: i64) -> Result<usize, Errno> {
        if fd < 0 || fd as usize >= self.entries.len() {
            return Err(Errno::Ebadf);
        }
        Ok(fd as usize)
    }

    /// A live descriptor, or `Ebadf` for out-of-range fds and holes.
    pub fn get(&self, fd: i64) -> Result<&FdEntry, Errno> {
        let idx = self.index(fd)?;
        let entry = &self.entries[idx];
        if entry.node.is_none() {
            return Err(Errno::Ebadf);
        }
        Ok(entry)
    }

    pub fn get_mut(&mut self, fd: i64) -> Result<&mut FdEntry, Errno> {
        let idx = self.index(fd)?;
        let entry = &mut self.entries[idx];
        if entry.node.is_none() {
            return Err(Errno::Ebadf);
        }
        Ok(entry)
    }

    /// Clone of the handle behind `fd`.
    pub fn handle(&self, fd: i64) -> Result<NodeHandle, Errno> {
        self.get(fd)?.node.clone().ok_or(Errno::Ebadf)
    }

    /// Turn `fd` into a hole, releasing its handle.
    pub fn close(&mut self, fd: i64) -> Result<(), Errno> {
        let entry = self.get_mut(fd)?;
        entry.node = None;
        entry.offset = 0;
        entry.mode = AccessMode::empty();
        Ok(())
    }

    /// `dup2`: make `dest` refer to what `src` refers to.
    ///
    /// `dest == -1` allocates a fresh slot through `append`. A different
    /// node already at `dest` is closed first. Nothing happens when both
    /// slots already hold the same open.
    pub fn move_fd(&mut self, src: i64, dest: i64) -> Result<usize, Errno> {
        let src = self.index(src)?;
        if dest != -1 {
            self.index(dest)?;
        }
        let source = self.entries[src].clone();
        let node = source.node.as_ref().ok_or(Errno::Ebadf)?;

        if dest == -1 {
            let idx = self.append(node.reopen());
            self.entries[idx].mode = source.mode;
            self.entries[idx].offset = source.offset;
            return Ok(idx);
        }

        let dest = dest as usize;
        if let Some(existing) = &self.entries[dest].node {
            if existing.same_open(node) {
                return Ok(dest);
            }
        }
        // Drop the old handle before installing the new one.
        self.entries[dest].node = None;
        self.entries[dest] = FdEntry {
            node: Some(node.reopen()),
            offset: source.offset,
            mode: source.mode,
        };
        Ok(dest)
    }

    /// Independent copy for a forked child: every live node is cloned,
    /// mode and offset are copied verbatim.
    pub fn deep_clone(&self) -> Self {
        let mut entries = Vec::with_capacity(self.capacity);
        entries.extend(self.entries.iter().cloned());
        Self {
            entries,
            capacity: self.capacity,
        }
    }

    /// Iterate live descriptors as `(fd, entry)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &FdEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.node.is_some())
    }
}

/// Number of processes holding `table`.
pub fn table_refs(table: &SharedFdTable) -> usize {
    Arc::strong_count(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::testfs::RamFs;
    use crate::vfs::{OpenFlags, NodeRef};

    fn handle(node: NodeRef) -> NodeHandle {
        NodeHandle::open(node, OpenFlags::empty())
    }

    fn table_with(n: usize) -> (RamFs, FdTable) {
        let fs = RamFs::new();
        let mut table = FdTable::new(2);
        for i in 0..n {
            let name = alloc::format!("/f{}", i);
            let node = fs.add_file(&name, b"", 0o644, 0);
            table.append(handle(node));
        }
        (fs, table)
    }

    #[test]
    fn test_append_reuses_smallest_hole() {
        let (fs, mut table) = table_with(6);
        table.close(4).unwrap();
        table.close(1).unwrap();
        table.close(3).unwrap();
        let extra = fs.add_file("/extra", b"", 0o644, 0);
        assert_eq!(table.append(handle(extra.clone())), 1);
        assert_eq!(table.append(handle(extra.clone())), 3);
        assert_eq!(table.append(handle(extra.clone())), 4);
        assert_eq!(table.append(handle(extra)), 6);
    }

    #[test]
    fn test_capacity_doubles() {
        let (_fs, table) = table_with(5);
        assert_eq!(table.len(), 5);
        assert_eq!(table.capacity(), 8);
    }

    #[test]
    fn test_append_resets_mode_and_offset() {
        let (fs, mut table) = table_with(1);
        {
            let e = table.get_mut(0).unwrap();
            e.offset = 99;
            e.mode = AccessMode::READ | AccessMode::WRITE;
        }
        table.close(0).unwrap();
        let node = fs.add_file("/g", b"", 0o644, 0);
        let fd = table.append(handle(node));
        assert_eq!(fd, 0);
        let e = table.get(0).unwrap();
        assert_eq!((e.offset, e.mode), (0, AccessMode::empty()));
    }

    #[test]
    fn test_holes_and_out_of_range_are_ebadf() {
        let (_fs, mut table) = table_with(2);
        table.close(1).unwrap();
        assert_eq!(table.get(1).err(), Some(Errno::Ebadf));
        assert_eq!(table.get(2).err(), Some(Errno::Ebadf));
        assert_eq!(table.get(-1).err(), Some(Errno::Ebadf));
        assert_eq!(table.close(1), Err(Errno::Ebadf));
    }

    #[test]
    fn test_move_to_new_slot_copies_mode_and_offset() {
        let (fs, mut table) = table_with(3);
        {
            let e = table.get_mut(1).unwrap();
            e.offset = 42;
            e.mode = AccessMode::READ;
        }
        let node = fs.get("/f1").unwrap();
        let opens = node.opens();
        let fd = table.move_fd(1, -1).unwrap();
        assert_eq!(fd, 3);
        assert_ne!(fd, 1);
        let e = table.get(fd as i64).unwrap();
        assert_eq!((e.offset, e.mode), (42, AccessMode::READ));
        assert!(e.node.as_ref().unwrap().same_open(table.get(1).unwrap().node.as_ref().unwrap()));
        assert_eq!(node.opens(), opens + 1);
    }

    #[test]
    fn test_move_closes_previous_destination() {
        let (fs, mut table) = table_with(3);
        let victim = fs.get("/f2").unwrap();
        assert_eq!(table.move_fd(0, 2).unwrap(), 2);
        assert_eq!(victim.closes(), 1);
        let same = table.get(0).unwrap().node.clone().unwrap();
        assert!(table.get(2).unwrap().node.as_ref().unwrap().same_open(&same));
    }

    #[test]
    fn test_move_same_open_is_noop() {
        let (fs, mut table) = table_with(2);
        table.move_fd(0, 1).unwrap();
        let node = fs.get("/f0").unwrap();
        let opens = node.opens();
        assert_eq!(table.move_fd(0, 1).unwrap(), 1);
        assert_eq!(node.opens(), opens);
    }

    #[test]
    fn test_move_bounds() {
        let (_fs, mut table) = table_with(2);
        assert_eq!(table.move_fd(5, 0), Err(Errno::Ebadf));
        assert_eq!(table.move_fd(0, 2), Err(Errno::Ebadf));
        assert_eq!(table.move_fd(0, -2), Err(Errno::Ebadf));
    }

    #[test]
    fn test_deep_clone_is_isolated() {
        let (_fs, table) = table_with(2);
        let mut copy = table.deep_clone();
        copy.get_mut(0).unwrap().offset = 7;
        copy.close(1).unwrap();
        assert_eq!(table.get(0).unwrap().offset, 0);
        assert!(table.get(1).is_ok());
    }

    #[test]
    fn test_nodes_closed_when_last_reference_drops() {
        let (fs, table) = table_with(1);
        let node = fs.get("/f0").unwrap();
        let shared = Arc::new(Mutex::new(table));
        let sharer = shared.clone();
        assert_eq!(table_refs(&shared), 2);
        drop(shared);
        assert_eq!(node.closes(), 0);
        drop(sharer);
        assert_eq!(node.closes(), 1);
    }
}
