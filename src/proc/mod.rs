//! Process Records
//!
//! A [`Process`] is the kernel's record of one schedulable task: its ids,
//! credentials, working directory, descriptor table, saved registers,
//! image layout, and scheduling bookkeeping. Records are shared as
//! [`ProcessRef`] handles; the [`ProcessTable`] owns the hierarchy and the
//! flat list used for validity checks.
//!
//! # Locking
//! Each record has its own lock. Code that needs a record and a queue
//! lock takes them one at a time; a record lock is never held while
//! another record is locked.

mod context;
mod fd;
mod tree;

pub use context::{FpRegs, Image, KThreadContext, Platform, Thread, TrapFrame};
pub use fd::{table_refs, AccessMode, FdEntry, FdTable, SharedFdTable};
pub use tree::ProcessTable;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use spin::Mutex;

use crate::mm::KernelStack;
use crate::sched::{Membership, WaitQueue};
use crate::vfs::{NodeHandle, Uid};

/// Process identifier. Positive for real processes.
pub type Pid = i32;

/// Shared handle to a process record.
pub type ProcessRef = Arc<Mutex<Process>>;

bitflags! {
    /// Lifecycle and scheduling flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProcessFlags: u32 {
        /// Kernel worker with no user image
        const TASKLET   = 0x01;
        /// Exited, waiting to be reaped
        const FINISHED  = 0x02;
        /// Has been scheduled at least once
        const STARTED   = 0x04;
        /// Currently on the CPU
        const RUNNING   = 0x08;
        /// Last wakeup was an interruption
        const SLEEP_INT = 0x10;
        /// Stopped by job control; skipped by the scheduler
        const SUSPENDED = 0x20;
    }
}

bitflags! {
    /// Options for [`crate::Kernel::spawn`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SpawnFlags: u32 {
        /// Share the parent's descriptor table instead of copying it
        const REUSE_FDS = 0x01;
    }
}

/// Observable lifecycle state, derived from flags and queue membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, never queued
    New,
    Ready,
    Running,
    /// Sleeping until a deadline
    Sleeping,
    /// Blocked on a wait queue
    Blocked,
    /// Exited, not yet reaped
    Finished,
}

/// Kernel record of one task.
pub struct Process {
    pub id: Pid,
    /// Thread group (the pid of the group leader)
    pub group: Pid,
    /// Process group for job control
    pub job: Pid,
    pub session: Pid,
    /// Exit status in wait format, valid once `FINISHED`
    pub status: i32,
    pub flags: ProcessFlags,

    pub user: Uid,
    pub real_user: Uid,
    /// File creation mask
    pub mask: u32,

    pub name: String,
    pub description: Option<String>,
    pub cmdline: Vec<String>,

    pub wd_name: String,
    pub wd_node: Option<NodeHandle>,
    /// Descriptor table; `None` once the process has been reaped
    pub fds: Option<SharedFdTable>,

    pub syscall_registers: TrapFrame,
    pub interrupt_registers: TrapFrame,
    pub thread: Thread,
    pub image: Image,
    pub kernel_stack: Option<KernelStack>,

    /// Processes blocked in `waitpid` on this one
    pub wait_queue: WaitQueue,
    /// `(ticks, subticks)` at creation
    pub start: (u64, u64),

    pub(crate) queue: Membership,
}

impl Process {
    /// Blank record with the given pid; callers fill in the rest.
    pub fn new(id: Pid, name: &str) -> Self {
        Self {
            id,
            group: id,
            job: id,
            session: id,
            status: 0,
            flags: ProcessFlags::empty(),
            user: 0,
            real_user: 0,
            mask: 0o022,
            name: String::from(name),
            description: None,
            cmdline: Vec::new(),
            wd_name: String::from("/"),
            wd_node: None,
            fds: None,
            syscall_registers: TrapFrame::default(),
            interrupt_registers: TrapFrame::default(),
            thread: Thread::default(),
            image: Image::default(),
            kernel_stack: None,
            wait_queue: WaitQueue::new(),
            start: (0, 0),
            queue: Membership::Detached,
        }
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.flags.contains(ProcessFlags::FINISHED)
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.flags.contains(ProcessFlags::SUSPENDED)
    }

    #[inline]
    pub fn is_tasklet(&self) -> bool {
        self.flags.contains(ProcessFlags::TASKLET)
    }

    /// A process leads its session when the session is named after its
    /// thread group.
    #[inline]
    pub fn is_session_leader(&self) -> bool {
        self.session == self.group
    }

    /// The shared descriptor table, if the process still has one.
    pub fn fd_table(&self) -> Option<SharedFdTable> {
        self.fds.clone()
    }
}

/// Snapshot of one process for listings such as `ps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub ppid: Option<Pid>,
    pub group: Pid,
    pub job: Pid,
    pub session: Pid,
    pub uid: Uid,
    pub name: String,
    pub state: ProcessState,
    pub suspended: bool,
    pub tasklet: bool,
}

impl ProcessInfo {
    /// One-letter state code: Z finished, T stopped, S waiting, R otherwise.
    pub fn state_letter(&self) -> char {
        match self.state {
            ProcessState::Finished => 'Z',
            _ if self.suspended => 'T',
            ProcessState::Sleeping | ProcessState::Blocked => 'S',
            _ => 'R',
        }
    }
}
