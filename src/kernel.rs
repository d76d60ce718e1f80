//! Kernel Instance
//!
//! [`Kernel`] ties together the process table, scheduler, VFS, stack pool,
//! and platform hooks, and implements the process lifecycle: spawning,
//! fork/clone, exit, wait and reap, and job-control suspension.
//!
//! # Lifecycle
//! ```text
//! spawn ──register──▶ (new) ──make_ready──▶ ready ◀──▶ running
//!                                              ▲          │
//!                                   wakeup     │          ├─ sleep_on / sleep_until
//!                                              └──────────┤
//!                                                         └─ exit ──▶ finished ──reap──▶ gone
//! ```

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicI32, Ordering};

use spin::Mutex;

use crate::config::{KernelConfig, CODENAME, HOSTNAME_MAX, KERNEL_NAME, VERSION};
use crate::errno::Errno;
use crate::mm::StackPool;
use crate::proc::{
    FdTable, Pid, Platform, Process, ProcessFlags, ProcessInfo, ProcessRef, ProcessState,
    ProcessTable, SpawnFlags,
};
use crate::sched::{wake_reason, Membership, Scheduler, WakeReason};
use crate::vfs::{OpenFlags, Vfs};

/// `waitpid` option: return immediately if no child has exited.
pub const WNOHANG: i64 = 1;

/// Termination status reported for a process killed by a bad pointer.
pub const SIGSEGV: i32 = 11;

/// One kernel instance.
pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) platform: Box<dyn Platform>,
    pub(crate) vfs: Vfs,
    pub(crate) table: ProcessTable,
    pub(crate) sched: Scheduler,
    pub(crate) stacks: StackPool,
    pub(crate) current: Mutex<Option<ProcessRef>>,
    pub(crate) idle: Mutex<Option<ProcessRef>>,
    next_pid: AtomicI32,
    hostname: Mutex<Vec<u8>>,
}

impl Kernel {
    /// Build a kernel over `stack_region`, which backs every kernel stack.
    pub fn new(
        config: KernelConfig,
        platform: Box<dyn Platform>,
        stack_region: &'static mut [u8],
    ) -> Self {
        let stacks = StackPool::new(stack_region, config.kernel_stack_size);
        let hostname = config.hostname.as_bytes().to_vec();
        Self {
            config,
            platform,
            vfs: Vfs::new(),
            table: ProcessTable::new(),
            sched: Scheduler::new(),
            stacks,
            current: Mutex::new(None),
            idle: Mutex::new(None),
            next_pid: AtomicI32::new(1),
            hostname: Mutex::new(hostname),
        }
    }

    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[inline]
    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    #[inline]
    pub fn processes_table(&self) -> &ProcessTable {
        &self.table
    }

    #[inline]
    pub fn platform(&self) -> &dyn Platform {
        &*self.platform
    }

    /// The process on the CPU.
    pub fn current(&self) -> Option<ProcessRef> {
        self.current.lock().clone()
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.current().map(|p| p.lock().id)
    }

    /// Make `process` the running one without a context switch.
    ///
    /// Used while bringing the system up.
    pub fn set_current(&self, process: &ProcessRef) {
        self.sched.unqueue(process);
        process
            .lock()
            .flags
            .insert(ProcessFlags::STARTED | ProcessFlags::RUNNING);
        let prev = self.current.lock().replace(process.clone());
        if let Some(prev) = prev {
            if !Arc::ptr_eq(&prev, process) {
                prev.lock().flags.remove(ProcessFlags::RUNNING);
            }
        }
    }

    pub fn idle(&self) -> Option<ProcessRef> {
        self.idle.lock().clone()
    }

    fn allocate_pid(&self) -> Pid {
        self.next_pid.fetch_add(1, Ordering::Relaxed)
    }

    /// Find a process in the tree. Negative pids never match.
    pub fn lookup_by_pid(&self, pid: Pid) -> Option<ProcessRef> {
        self.table.lookup(pid)
    }

    /// True if `process` is registered.
    pub fn is_valid_process(&self, process: &ProcessRef) -> bool {
        self.table.is_valid(process)
    }

    /// Create the root of the process tree and make it current.
    pub fn spawn_init(&self) -> Result<ProcessRef, Errno> {
        if self.table.root().is_some() {
            return Err(Errno::Eexist);
        }
        let pid = self.allocate_pid();
        let mut init = Process::new(pid, "init");
        init.description = Some(String::from("[init]"));
        init.fds = Some(FdTable::new_shared(self.config.fd_capacity));
        init.wd_node = self.vfs.kopen("/", "/", OpenFlags::empty());
        init.start = self.sched.now();
        self.attach_stack(&mut init)?;

        let init = Arc::new(Mutex::new(init));
        self.table.link(pid, init.clone(), None);
        self.table.register(&init);
        self.set_current(&init);
        crate::kprintln!("[BOOT] {} v{} ({}): init is pid {}", KERNEL_NAME, VERSION, CODENAME, pid);
        Ok(init)
    }

    /// Create the idle task, run when nothing else is ready.
    ///
    /// It is registered but never linked into the tree nor queued.
    pub fn spawn_idle(&self) -> Result<ProcessRef, Errno> {
        let mut idle = Process::new(self.allocate_pid(), "[kidle]");
        idle.flags = ProcessFlags::TASKLET;
        self.attach_stack(&mut idle)?;
        let idle = Arc::new(Mutex::new(idle));
        self.table.register(&idle);
        *self.idle.lock() = Some(idle.clone());
        Ok(idle)
    }

    fn attach_stack(&self, process: &mut Process) -> Result<(), Errno> {
        let stack = self.stacks.allocate()?;
        process.image.stack = stack.top();
        process.thread.context.sp = stack.top();
        process.thread.context.bp = stack.top();
        process.kernel_stack = Some(stack);
        Ok(())
    }

    /// Create a child of `parent`, linked into the tree but not yet
    /// registered or queued.
    ///
    /// The child inherits identity, credentials, working directory and
    /// image layout. Its descriptor table is shared with `REUSE_FDS`,
    /// copied otherwise.
    pub fn spawn(&self, parent: &ProcessRef, flags: SpawnFlags) -> Result<ProcessRef, Errno> {
        let pid = self.allocate_pid();
        let mut child = Process::new(pid, "");
        let parent_pid = {
            let p = parent.lock();
            child.name = p.name.clone();
            child.description = p.description.clone();
            child.cmdline = p.cmdline.clone();
            child.job = p.job;
            child.session = p.session;
            child.user = p.user;
            child.real_user = p.real_user;
            child.mask = p.mask;
            child.wd_name = p.wd_name.clone();
            child.wd_node = p.wd_node.as_ref().map(|wd| wd.reopen());
            child.image = p.image;
            child.thread.context.tls_base = p.thread.context.tls_base;
            child.thread.fp_regs = p.thread.fp_regs;
            child.fds = match &p.fds {
                Some(table) if flags.contains(SpawnFlags::REUSE_FDS) => Some(table.clone()),
                Some(table) => {
                    let copy = table.lock().deep_clone();
                    Some(Arc::new(Mutex::new(copy)))
                }
                None => Some(FdTable::new_shared(self.config.fd_capacity)),
            };
            p.id
        };
        child.start = self.sched.now();
        self.attach_stack(&mut child)?;

        let child = Arc::new(Mutex::new(child));
        self.table.link(pid, child.clone(), Some(parent_pid));
        log::debug!("[PROC] spawned {} from {}", pid, parent_pid);
        Ok(child)
    }

    /// Add a spawned process to the flat list.
    pub fn register(&self, process: &ProcessRef) {
        self.table.register(process);
    }

    /// Start a kernel worker running `entry(arg)`.
    pub fn spawn_worker(&self, name: &str, entry: usize, arg: usize) -> Result<Pid, Errno> {
        let parent = self
            .table
            .root()
            .and_then(|pid| self.lookup_by_pid(pid))
            .ok_or(Errno::Esrch)?;
        let worker = self.spawn(&parent, SpawnFlags::REUSE_FDS)?;
        let pid = {
            let mut w = worker.lock();
            w.flags.insert(ProcessFlags::TASKLET);
            w.name = String::from(name);
            w.description = None;
            w.cmdline.clear();
            w.thread.context.ip = entry;
            w.thread.context.saved[0] = arg;
            w.id
        };
        self.register(&worker);
        self.sched.make_ready(&worker);
        Ok(pid)
    }

    /// Duplicate the current process. The child sees a zero return.
    pub fn fork(&self) -> Result<Pid, Errno> {
        let parent = self.current().ok_or(Errno::Esrch)?;
        let child = self.spawn(&parent, SpawnFlags::empty())?;
        let regs = parent.lock().syscall_registers;
        let pid = {
            let mut c = child.lock();
            c.syscall_registers = regs;
            c.syscall_registers.set_return(0);
            c.interrupt_registers = c.syscall_registers;
            c.id
        };
        self.register(&child);
        self.sched.make_ready(&child);
        Ok(pid)
    }

    /// Start a thread of the current process at `func(arg)` on `stack`.
    ///
    /// The thread shares the descriptor table and joins the caller's
    /// thread group.
    pub fn clone_thread(&self, stack: usize, func: usize, arg: usize) -> Result<Pid, Errno> {
        let parent = self.current().ok_or(Errno::Esrch)?;
        let child = self.spawn(&parent, SpawnFlags::REUSE_FDS)?;
        let (group, regs) = {
            let p = parent.lock();
            (p.group, p.syscall_registers)
        };
        let pid = {
            let mut c = child.lock();
            c.group = group;
            c.syscall_registers = regs;
            c.syscall_registers.set_return(0);
            c.syscall_registers.rsp = stack as u64;
            c.syscall_registers.rip = func as u64;
            c.syscall_registers.rdi = arg as u64;
            c.interrupt_registers = c.syscall_registers;
            c.image.user_stack = stack;
            c.id
        };
        self.register(&child);
        self.sched.make_ready(&child);
        Ok(pid)
    }

    /// Terminate `process` with exit code `code`.
    ///
    /// The status becomes `(code & 0xff) << 8`. Children move to init and
    /// the parent's waiters are woken. If `process` is running, the CPU
    /// moves to the next ready process.
    pub fn exit_process(&self, process: &ProcessRef, code: i32) {
        self.terminate(process, (code & 0xff) << 8);
    }

    /// Terminate with a raw wait status.
    pub(crate) fn terminate(&self, process: &ProcessRef, status: i32) {
        let pid = {
            let mut p = process.lock();
            if p.is_finished() {
                return;
            }
            p.status = status;
            p.flags.insert(ProcessFlags::FINISHED);
            p.flags.remove(ProcessFlags::RUNNING);
            p.id
        };
        log::debug!("[PROC] {} exited with status {:#x}", pid, status);
        self.sched.unqueue(process);

        if let Some(init) = self.table.root() {
            if init != pid {
                self.table.reparent_children(pid, init);
            }
        }
        if let Some(parent) = self.table.parent_of(pid).and_then(|p| self.lookup_by_pid(p)) {
            let queue = parent.lock().wait_queue.clone();
            self.sched.wakeup_queue(&queue);
        }

        let running = self
            .current()
            .map_or(false, |c| Arc::ptr_eq(&c, process));
        if running {
            self.switch_task(false);
        }
    }

    /// Wait for a child of the current process to finish.
    ///
    /// `pid > 0` selects that child, `-1` any child, `0` children in the
    /// caller's process group, and `< -1` children in group `-pid`.
    /// Returns the reaped pid and its status, or `(0, 0)` under `WNOHANG`
    /// when no child is ready.
    pub fn waitpid(&self, pid: Pid, options: i64) -> Result<(Pid, i32), Errno> {
        let me = self.current().ok_or(Errno::Esrch)?;
        let (my_pid, my_job) = {
            let p = me.lock();
            (p.id, p.job)
        };
        let queue = me.lock().wait_queue.clone();
        loop {
            // Park before scanning so an exit after the scan still wakes us.
            me.lock().flags.remove(ProcessFlags::SLEEP_INT);
            self.sched.block_on(&queue, &me);
            let found = self.find_waitable(my_pid, my_job, pid);
            if !matches!(found, Ok(None)) || options & WNOHANG != 0 {
                self.sched.unqueue(&me);
            }
            match found {
                Err(e) => return Err(e),
                Ok(Some(child)) => {
                    let status = self.reap(child)?;
                    return Ok((child, status));
                }
                Ok(None) if options & WNOHANG != 0 => return Ok((0, 0)),
                Ok(None) => {}
            }
            self.switch_task(false);
            if wake_reason(&me) == WakeReason::Interrupted {
                self.sched.unqueue(&me);
                return Err(Errno::Eintr);
            }
        }
    }

    /// First finished child of `parent` matching the `waitpid` selector.
    /// `Echild` if nothing matches at all.
    fn find_waitable(&self, parent: Pid, job: Pid, pid: Pid) -> Result<Option<Pid>, Errno> {
        let mut candidates = 0;
        for child in self.table.children_of(parent) {
            let c = child.lock();
            let selected = match pid {
                -1 => true,
                0 => c.job == job,
                p if p < -1 => c.job == -p,
                p => c.id == p,
            };
            if !selected {
                continue;
            }
            candidates += 1;
            if c.is_finished() {
                return Ok(Some(c.id));
            }
        }
        if candidates == 0 {
            return Err(Errno::Echild);
        }
        Ok(None)
    }

    /// Release a finished process: its stack, descriptors, and entries in
    /// the tree and list. Returns its wait status.
    pub fn reap(&self, pid: Pid) -> Result<i32, Errno> {
        let process = self.lookup_by_pid(pid).ok_or(Errno::Esrch)?;
        if !process.lock().is_finished() {
            return Err(Errno::Einval);
        }
        self.table.remove(pid);
        self.sched.unqueue(&process);
        let (status, stack, fds, wd) = {
            let mut p = process.lock();
            (p.status, p.kernel_stack.take(), p.fds.take(), p.wd_node.take())
        };
        if let Some(stack) = stack {
            self.stacks.release(stack);
        }
        drop(fds);
        drop(wd);
        log::trace!("[PROC] reaped {}", pid);
        Ok(status)
    }

    /// Stop `pid`; the scheduler skips it until resumed.
    pub fn suspend(&self, pid: Pid) -> Result<(), Errno> {
        let process = self.lookup_by_pid(pid).ok_or(Errno::Esrch)?;
        process.lock().flags.insert(ProcessFlags::SUSPENDED);
        self.sched.remove_ready(&process);
        let running = self
            .current()
            .map_or(false, |c| Arc::ptr_eq(&c, &process));
        if running {
            self.switch_task(false);
        }
        Ok(())
    }

    /// Continue a suspended process.
    pub fn resume(&self, pid: Pid) -> Result<(), Errno> {
        let process = self.lookup_by_pid(pid).ok_or(Errno::Esrch)?;
        let parked = {
            let mut p = process.lock();
            if !p.is_suspended() {
                return Ok(());
            }
            p.flags.remove(ProcessFlags::SUSPENDED);
            !p.is_finished() && matches!(p.queue, Membership::Detached)
        };
        let running = self
            .current()
            .map_or(false, |c| Arc::ptr_eq(&c, &process));
        if parked && !running {
            self.sched.make_ready(&process);
        }
        Ok(())
    }

    fn state_of_ref(&self, process: &ProcessRef) -> ProcessState {
        let running = self
            .current()
            .map_or(false, |c| Arc::ptr_eq(&c, process));
        let p = process.lock();
        if p.is_finished() {
            return ProcessState::Finished;
        }
        if running {
            return ProcessState::Running;
        }
        match p.queue {
            Membership::Ready => ProcessState::Ready,
            Membership::Sleeping => ProcessState::Sleeping,
            Membership::Waiting(_) => ProcessState::Blocked,
            Membership::Detached if p.flags.contains(ProcessFlags::STARTED) => ProcessState::Ready,
            Membership::Detached => ProcessState::New,
        }
    }

    /// Lifecycle state of `pid`.
    pub fn state_of(&self, pid: Pid) -> Option<ProcessState> {
        self.lookup_by_pid(pid).map(|p| self.state_of_ref(&p))
    }

    fn info_of(&self, process: &ProcessRef) -> ProcessInfo {
        let state = self.state_of_ref(process);
        let p = process.lock();
        let pid = p.id;
        let info = ProcessInfo {
            pid,
            ppid: None,
            group: p.group,
            job: p.job,
            session: p.session,
            uid: p.user,
            name: p.name.clone(),
            state,
            suspended: p.is_suspended(),
            tasklet: p.is_tasklet(),
        };
        drop(p);
        ProcessInfo {
            ppid: self.table.parent_of(pid),
            ..info
        }
    }

    /// Snapshot of one process.
    pub fn process_info(&self, pid: Pid) -> Option<ProcessInfo> {
        self.lookup_by_pid(pid).map(|p| self.info_of(&p))
    }

    /// Snapshot of every registered process.
    pub fn processes(&self) -> Vec<ProcessInfo> {
        self.table.all().iter().map(|p| self.info_of(p)).collect()
    }

    /// Current hostname bytes.
    pub fn hostname(&self) -> Vec<u8> {
        self.hostname.lock().clone()
    }

    /// Replace the hostname. Names of `HOSTNAME_MAX` bytes or more are
    /// rejected.
    pub fn set_hostname(&self, name: &[u8]) -> Result<(), Errno> {
        if name.len() + 1 > HOSTNAME_MAX {
            return Err(Errno::Enametoolong);
        }
        *self.hostname.lock() = name.to_vec();
        Ok(())
    }
}
