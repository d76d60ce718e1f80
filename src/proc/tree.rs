//! Process hierarchy and the flat process list.
//!
//! The tree records parent/child links keyed by pid. The flat list holds
//! every registered process and is what validity checks consult. A
//! spawned process is linked into the tree immediately but only appears
//! in the list once it is registered.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use super::{Pid, ProcessRef};

struct TreeNode {
    process: ProcessRef,
    parent: Option<Pid>,
    children: Vec<Pid>,
}

/// Tree plus flat list, each behind its own lock.
pub struct ProcessTable {
    tree: Mutex<BTreeMap<Pid, TreeNode>>,
    root: Mutex<Option<Pid>>,
    list: Mutex<Vec<ProcessRef>>,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            tree: Mutex::new(BTreeMap::new()),
            root: Mutex::new(None),
            list: Mutex::new(Vec::new()),
        }
    }

    /// Link `process` under `parent`. Without a parent it becomes the root.
    pub fn link(&self, pid: Pid, process: ProcessRef, parent: Option<Pid>) {
        let mut tree = self.tree.lock();
        match parent {
            Some(parent) => {
                if let Some(node) = tree.get_mut(&parent) {
                    node.children.push(pid);
                }
            }
            None => *self.root.lock() = Some(pid),
        }
        tree.insert(
            pid,
            TreeNode {
                process,
                parent,
                children: Vec::new(),
            },
        );
    }

    /// Add to the flat list.
    pub fn register(&self, process: &ProcessRef) {
        let mut list = self.list.lock();
        if !list.iter().any(|p| Arc::ptr_eq(p, process)) {
            list.push(process.clone());
        }
    }

    /// Pid of the tree root (init).
    pub fn root(&self) -> Option<Pid> {
        *self.root.lock()
    }

    /// Find a process in the tree. Negative pids never match.
    pub fn lookup(&self, pid: Pid) -> Option<ProcessRef> {
        if pid < 0 {
            return None;
        }
        self.tree.lock().get(&pid).map(|n| n.process.clone())
    }

    /// True if `process` is in the flat list.
    pub fn is_valid(&self, process: &ProcessRef) -> bool {
        self.list.lock().iter().any(|p| Arc::ptr_eq(p, process))
    }

    pub fn parent_of(&self, pid: Pid) -> Option<Pid> {
        self.tree.lock().get(&pid).and_then(|n| n.parent)
    }

    /// Children of `pid` in creation order.
    pub fn children_of(&self, pid: Pid) -> Vec<ProcessRef> {
        let tree = self.tree.lock();
        let Some(node) = tree.get(&pid) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|c| tree.get(c).map(|n| n.process.clone()))
            .collect()
    }

    /// Move every child of `pid` under `new_parent`. Returns how many moved.
    pub fn reparent_children(&self, pid: Pid, new_parent: Pid) -> usize {
        if pid == new_parent {
            return 0;
        }
        let mut tree = self.tree.lock();
        let Some(children) = tree.get_mut(&pid).map(|n| core::mem::take(&mut n.children)) else {
            return 0;
        };
        for child in &children {
            if let Some(node) = tree.get_mut(child) {
                node.parent = Some(new_parent);
            }
        }
        let moved = children.len();
        if let Some(parent) = tree.get_mut(&new_parent) {
            parent.children.extend(children);
        }
        moved
    }

    /// Unlink `pid` from the tree and the list.
    ///
    /// Remaining children are handed to the root.
    pub fn remove(&self, pid: Pid) -> Option<ProcessRef> {
        if let Some(root) = self.root() {
            self.reparent_children(pid, root);
        }
        let node = {
            let mut tree = self.tree.lock();
            let node = tree.remove(&pid)?;
            if let Some(parent) = node.parent.and_then(|p| tree.get_mut(&p)) {
                parent.children.retain(|c| *c != pid);
            }
            node
        };
        {
            let mut root = self.root.lock();
            if *root == Some(pid) {
                *root = None;
            }
        }
        self.list.lock().retain(|p| !Arc::ptr_eq(p, &node.process));
        Some(node.process)
    }

    /// Every registered process, in registration order.
    pub fn all(&self) -> Vec<ProcessRef> {
        self.list.lock().clone()
    }

    /// Number of processes in the tree.
    pub fn len(&self) -> usize {
        self.tree.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
