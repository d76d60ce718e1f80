//! Scheduler Queues
//!
//! The ready queue, the sleep queue, and wait queues. A process is on at
//! most one of them at a time; the record's `queue` field says which, so
//! removal never has to search every queue.
//!
//! # Lock order
//! Sleep and wait queue locks are taken before the ready queue lock and
//! released before it is taken; the two are never held together. Entries
//! to wake are drained into a local list first and then made ready one by
//! one. Record locks are only held for short field updates.

mod switch;

use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use spin::Mutex;

use crate::config::SUBTICKS_PER_TICK;
use crate::proc::{Pid, ProcessFlags, ProcessRef};

type WaitList = Mutex<VecDeque<ProcessRef>>;

/// Which queue, if any, a process is currently on.
#[derive(Debug, Clone, Default)]
pub(crate) enum Membership {
    #[default]
    Detached,
    Ready,
    Sleeping,
    Waiting(Weak<WaitList>),
}

/// Why a blocked process resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Normal,
    Interrupted,
}

/// FIFO of processes blocked on some event.
#[derive(Clone, Default)]
pub struct WaitQueue(Arc<WaitList>);

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Pids of the waiters, oldest first.
    pub fn pids(&self) -> Vec<Pid> {
        let waiters: Vec<ProcessRef> = self.0.lock().iter().cloned().collect();
        waiters.iter().map(|p| p.lock().id).collect()
    }
}

struct Sleeper {
    end_tick: u64,
    end_subtick: u64,
    process: ProcessRef,
}

/// Ready and sleep queues plus the scheduler clock.
pub struct Scheduler {
    ready: Mutex<VecDeque<ProcessRef>>,
    sleepers: Mutex<Vec<Sleeper>>,
    clock: Mutex<(u64, u64)>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            sleepers: Mutex::new(Vec::new()),
            clock: Mutex::new((0, 0)),
        }
    }

    /// Current `(ticks, subticks)`.
    pub fn now(&self) -> (u64, u64) {
        *self.clock.lock()
    }

    pub fn set_now(&self, ticks: u64, subticks: u64) {
        *self.clock.lock() = (ticks, subticks);
    }

    /// Absolute deadline `ticks`/`subticks` from now, carrying subticks.
    ///
    /// Saturates at the end of time rather than wrapping into the past.
    pub fn relative_time(&self, ticks: u64, subticks: u64) -> (u64, u64) {
        let (now, now_sub) = self.now();
        let sub = now_sub % SUBTICKS_PER_TICK + subticks % SUBTICKS_PER_TICK;
        let carry = subticks / SUBTICKS_PER_TICK + sub / SUBTICKS_PER_TICK;
        let deadline = now.saturating_add(ticks).saturating_add(carry);
        if deadline == u64::MAX {
            return (u64::MAX, SUBTICKS_PER_TICK - 1);
        }
        (deadline, sub % SUBTICKS_PER_TICK)
    }

    /// Take `process` off whatever queue it is on.
    fn detach(&self, process: &ProcessRef) {
        let membership = core::mem::take(&mut process.lock().queue);
        match membership {
            Membership::Detached => {}
            Membership::Ready => self.ready.lock().retain(|p| !Arc::ptr_eq(p, process)),
            Membership::Sleeping => self
                .sleepers
                .lock()
                .retain(|s| !Arc::ptr_eq(&s.process, process)),
            Membership::Waiting(list) => {
                if let Some(list) = list.upgrade() {
                    list.lock().retain(|p| !Arc::ptr_eq(p, process));
                }
            }
        }
    }

    /// Append to the ready queue, first leaving any sleep or wait queue.
    ///
    /// A process already on the ready queue keeps its place. Finished
    /// processes are never queued.
    pub fn make_ready(&self, process: &ProcessRef) {
        {
            let p = process.lock();
            if matches!(p.queue, Membership::Ready) {
                return;
            }
            if p.is_finished() {
                log::warn!("[SCHED] refusing to queue finished process {}", p.id);
                return;
            }
        }
        self.detach(process);
        let mut ready = self.ready.lock();
        process.lock().queue = Membership::Ready;
        ready.push_back(process.clone());
    }

    /// Pop the next runnable process.
    ///
    /// Suspended processes are taken off the queue and left detached
    /// until resumed.
    pub fn next_ready(&self) -> Option<ProcessRef> {
        loop {
            let next = self.ready.lock().pop_front()?;
            let mut p = next.lock();
            p.queue = Membership::Detached;
            if p.is_suspended() {
                log::trace!("[SCHED] parking suspended process {}", p.id);
                continue;
            }
            drop(p);
            return Some(next);
        }
    }

    /// Remove from the ready queue. Returns whether it was queued.
    pub fn remove_ready(&self, process: &ProcessRef) -> bool {
        if !matches!(process.lock().queue, Membership::Ready) {
            return false;
        }
        self.detach(process);
        true
    }

    /// Take `process` off every queue.
    pub fn unqueue(&self, process: &ProcessRef) {
        self.detach(process);
    }

    /// Pids on the ready queue, front first.
    pub fn ready_pids(&self) -> Vec<Pid> {
        let ready: Vec<ProcessRef> = self.ready.lock().iter().cloned().collect();
        ready.iter().map(|p| p.lock().id).collect()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.lock().len()
    }

    pub fn sleeping_len(&self) -> usize {
        self.sleepers.lock().len()
    }

    /// Append `process` to `queue`, leaving any other queue.
    pub fn block_on(&self, queue: &WaitQueue, process: &ProcessRef) {
        self.detach(process);
        let mut list = queue.0.lock();
        process.lock().queue = Membership::Waiting(Arc::downgrade(&queue.0));
        list.push_back(process.clone());
    }

    /// Wake every waiter on `queue` in FIFO order. Returns how many woke.
    pub fn wakeup_queue(&self, queue: &WaitQueue) -> usize {
        self.wake_all(queue, WakeReason::Normal)
    }

    /// As [`Self::wakeup_queue`], marking each waiter as interrupted.
    pub fn wakeup_queue_interrupted(&self, queue: &WaitQueue) -> usize {
        self.wake_all(queue, WakeReason::Interrupted)
    }

    fn wake_all(&self, queue: &WaitQueue, reason: WakeReason) -> usize {
        let woken: Vec<ProcessRef> = queue.0.lock().drain(..).collect();
        for process in &woken {
            {
                let mut p = process.lock();
                p.queue = Membership::Detached;
                p.flags.set(ProcessFlags::SLEEP_INT, reason == WakeReason::Interrupted);
            }
            self.make_ready(process);
        }
        woken.len()
    }

    /// Sleep `process` until the absolute time `(ticks, subticks)`.
    pub fn sleep_until(&self, process: &ProcessRef, ticks: u64, subticks: u64) {
        self.detach(process);
        let mut sleepers = self.sleepers.lock();
        {
            let mut p = process.lock();
            p.queue = Membership::Sleeping;
            p.flags.remove(ProcessFlags::SLEEP_INT);
        }
        sleepers.push(Sleeper {
            end_tick: ticks,
            end_subtick: subticks,
            process: process.clone(),
        });
    }

    /// Make ready every sleeper whose deadline is at or before the given
    /// time. Returns how many woke.
    pub fn wakeup_sleepers(&self, ticks: u64, subticks: u64) -> usize {
        let mut due = Vec::new();
        self.sleepers.lock().retain(|s| {
            if (s.end_tick, s.end_subtick) <= (ticks, subticks) {
                due.push(s.process.clone());
                false
            } else {
                true
            }
        });
        for process in &due {
            process.lock().queue = Membership::Detached;
            self.make_ready(process);
        }
        due.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Reason recorded by the last wakeup of `process`.
pub fn wake_reason(process: &ProcessRef) -> WakeReason {
    if process.lock().flags.contains(ProcessFlags::SLEEP_INT) {
        WakeReason::Interrupted
    } else {
        WakeReason::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::Process;

    fn proc(pid: Pid) -> ProcessRef {
        Arc::new(Mutex::new(Process::new(pid, "t")))
    }

    #[test]
    fn test_sleepers_wake_at_deadline() {
        let sched = Scheduler::new();
        let p = proc(2);
        sched.sleep_until(&p, 10, 500);
        assert_eq!(sched.wakeup_sleepers(10, 499), 0);
        assert_eq!(sched.sleeping_len(), 1);
        assert_eq!(sched.wakeup_sleepers(10, 500), 1);
        assert_eq!(sched.ready_pids(), [2]);
        assert_eq!(sched.sleeping_len(), 0);
    }

    #[test]
    fn test_unordered_sleepers_all_checked() {
        let sched = Scheduler::new();
        sched.sleep_until(&proc(2), 20, 0);
        sched.sleep_until(&proc(3), 5, 0);
        sched.sleep_until(&proc(4), 9, 999);
        assert_eq!(sched.wakeup_sleepers(10, 0), 2);
        assert_eq!(sched.ready_pids(), [3, 4]);
    }

    #[test]
    fn test_wakeup_queue_is_fifo() {
        let sched = Scheduler::new();
        let queue = WaitQueue::new();
        for pid in [5, 3, 8] {
            sched.block_on(&queue, &proc(pid));
        }
        assert_eq!(queue.pids(), [5, 3, 8]);
        assert_eq!(sched.wakeup_queue(&queue), 3);
        assert!(queue.is_empty());
        assert_eq!(sched.ready_pids(), [5, 3, 8]);
    }

    #[test]
    fn test_interrupted_wakeup_sets_reason() {
        let sched = Scheduler::new();
        let queue = WaitQueue::new();
        let p = proc(2);
        sched.block_on(&queue, &p);
        sched.wakeup_queue_interrupted(&queue);
        assert_eq!(wake_reason(&p), WakeReason::Interrupted);
        sched.block_on(&queue, &p);
        sched.wakeup_queue(&queue);
        assert_eq!(wake_reason(&p), WakeReason::Normal);
    }

    #[test]
    fn test_single_queue_membership() {
        let sched = Scheduler::new();
        let queue = WaitQueue::new();
        let p = proc(2);
        sched.make_ready(&p);
        sched.block_on(&queue, &p);
        assert_eq!(sched.ready_len(), 0);
        sched.sleep_until(&p, 1, 0);
        assert!(queue.is_empty());
        sched.make_ready(&p);
        sched.make_ready(&p);
        assert_eq!(sched.sleeping_len(), 0);
        assert_eq!(sched.ready_pids(), [2]);
    }

    #[test]
    fn test_next_ready_skips_suspended() {
        let sched = Scheduler::new();
        let a = proc(2);
        let b = proc(3);
        a.lock().flags.insert(ProcessFlags::SUSPENDED);
        sched.make_ready(&a);
        sched.make_ready(&b);
        let next = sched.next_ready().unwrap();
        assert!(Arc::ptr_eq(&next, &b));
        assert!(sched.next_ready().is_none());
    }

    #[test]
    fn test_relative_time_carries() {
        let sched = Scheduler::new();
        sched.set_now(3, SUBTICKS_PER_TICK - 10);
        assert_eq!(sched.relative_time(1, 25), (5, 15));
    }

    #[test]
    fn test_relative_time_saturates() {
        let sched = Scheduler::new();
        sched.set_now(1, 1);
        let far = (u64::MAX, SUBTICKS_PER_TICK - 1);
        assert_eq!(sched.relative_time(u64::MAX, 0), far);
        assert_eq!(
            sched.relative_time(0, u64::MAX),
            (1 + u64::MAX / SUBTICKS_PER_TICK, 1 + u64::MAX % SUBTICKS_PER_TICK)
        );
        assert_eq!(sched.relative_time(u64::MAX - 1, SUBTICKS_PER_TICK), far);
    }
}
