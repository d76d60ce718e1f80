//! Context switching and the timer path.

use alloc::sync::Arc;

use super::{wake_reason, Membership, WaitQueue, WakeReason};
use crate::kernel::Kernel;
use crate::proc::{ProcessFlags, ProcessRef};

impl Kernel {
    /// True if `process` could keep the CPU: alive, not stopped, not
    /// queued anywhere.
    fn can_continue(process: &ProcessRef) -> bool {
        let p = process.lock();
        !p.is_finished() && !p.is_suspended() && matches!(p.queue, Membership::Detached)
    }

    /// Give up the CPU.
    ///
    /// With `reschedule` the running process goes to the back of the ready
    /// queue first; without it, the caller has already put it wherever it
    /// belongs (a wait queue, the sleep queue, or nowhere after exit). The
    /// next ready process runs, or the idle task if none is ready.
    pub fn switch_task(&self, reschedule: bool) {
        let prev = self.current();
        let idle = self.idle();
        if let Some(prev) = &prev {
            prev.lock().flags.remove(ProcessFlags::RUNNING);
            let is_idle = idle.as_ref().map_or(false, |i| Arc::ptr_eq(i, prev));
            if reschedule && !is_idle && Self::can_continue(prev) {
                self.sched.make_ready(prev);
            }
        }

        let next = match self.sched.next_ready().or(idle) {
            Some(next) => next,
            None => {
                // Nothing else to run; keep the current process if it can.
                match &prev {
                    Some(prev) if Self::can_continue(prev) => {
                        prev.lock().flags.insert(ProcessFlags::RUNNING);
                    }
                    _ => *self.current.lock() = None,
                }
                return;
            }
        };

        next.lock()
            .flags
            .insert(ProcessFlags::STARTED | ProcessFlags::RUNNING);
        *self.current.lock() = Some(next.clone());

        let same = prev.as_ref().map_or(false, |p| Arc::ptr_eq(p, &next));
        if !same {
            log::trace!("[SCHED] switch to {}", next.lock().id);
            self.platform.switch_context(prev.as_ref(), &next);
        }
    }

    /// Block the current process on `queue` until woken.
    pub fn sleep_on(&self, queue: &WaitQueue) -> WakeReason {
        let Some(me) = self.current() else {
            log::warn!("[SCHED] sleep_on with no current process");
            return WakeReason::Normal;
        };
        me.lock().flags.remove(ProcessFlags::SLEEP_INT);
        self.sched.block_on(queue, &me);
        self.switch_task(false);
        wake_reason(&me)
    }

    /// Sleep the current process until the absolute time given.
    pub fn sleep_until(&self, ticks: u64, subticks: u64) {
        if let Some(me) = self.current() {
            self.sched.sleep_until(&me, ticks, subticks);
            self.switch_task(false);
        }
    }

    /// Timer interrupt: advance the clock, wake due sleepers, preempt.
    pub fn timer_tick(&self, ticks: u64, subticks: u64) {
        self.sched.set_now(ticks, subticks);
        let woken = self.sched.wakeup_sleepers(ticks, subticks);
        if woken > 0 {
            log::trace!("[SCHED] {} sleepers woke at {}.{:06}", woken, ticks, subticks);
        }
        self.switch_task(true);
    }
}
