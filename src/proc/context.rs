//! Saved Execution State
//!
//! Register snapshots taken at trap entry, the kernel-thread context used
//! by the context switch, and the [`Platform`] hooks the architecture
//! layer provides. The switch itself (register save/restore assembly)
//! lives behind `Platform::switch_context`.

use core::fmt;

use super::ProcessRef;
use crate::errno::Errno;

/// Register state saved on trap entry (syscall or interrupt).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub int_no: u64,
    pub err_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    /// Build a frame for syscall `number` with up to five arguments.
    pub fn syscall(number: u64, args: &[u64]) -> Self {
        let mut frame = Self {
            rax: number,
            ..Self::default()
        };
        let slots = [
            &mut frame.rbx,
            &mut frame.rcx,
            &mut frame.rdx,
            &mut frame.rsi,
            &mut frame.rdi,
        ];
        for (slot, value) in slots.into_iter().zip(args.iter()) {
            *slot = *value;
        }
        frame
    }

    /// System call number (rax)
    #[inline]
    pub fn syscall_number(&self) -> u64 {
        self.rax
    }

    /// Argument `n` (rbx, rcx, rdx, rsi, rdi). Anything past four is zero.
    #[inline]
    pub fn arg(&self, n: usize) -> u64 {
        match n {
            0 => self.rbx,
            1 => self.rcx,
            2 => self.rdx,
            3 => self.rsi,
            4 => self.rdi,
            _ => 0,
        }
    }

    /// Store the syscall result (rax)
    #[inline]
    pub fn set_return(&mut self, value: i64) {
        self.rax = value as u64;
    }

    #[inline]
    pub fn return_value(&self) -> i64 {
        self.rax as i64
    }
}

/// Callee-saved state used by the kernel context switch.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KThreadContext {
    pub sp: usize,
    pub bp: usize,
    pub ip: usize,
    pub tls_base: usize,
    /// rbx, r12-r15
    pub saved: [usize; 5],
}

/// FXSAVE area.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub struct FpRegs(pub [u8; 512]);

impl Default for FpRegs {
    fn default() -> Self {
        Self([0; 512])
    }
}

impl fmt::Debug for FpRegs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FpRegs(..)")
    }
}

/// Execution context of one process.
#[derive(Debug, Clone, Default)]
pub struct Thread {
    pub context: KThreadContext,
    pub fp_regs: FpRegs,
}

/// Layout of a process image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Image {
    /// Program entry point; user pointers must lie above it.
    pub entry: usize,
    /// Current program break
    pub heap: usize,
    /// Top of the kernel stack
    pub stack: usize,
    pub user_stack: usize,
    /// Next free address for shared memory mappings
    pub shm_heap: usize,
}

/// Architecture services the process core depends on.
pub trait Platform: Send + Sync {
    /// Save the running context (if any) and resume `next`.
    ///
    /// Called with no kernel locks held.
    fn switch_context(&self, prev: Option<&ProcessRef>, next: &ProcessRef);

    /// Back `[start, start + len)` of the current address space with
    /// writable frames.
    fn map_user_range(&self, _start: usize, _len: usize) -> Result<(), Errno> {
        Ok(())
    }

    /// Load a new thread-local storage base for the running thread.
    fn set_tls_base(&self, _base: usize) {}

    /// Stop the machine. Only used for unrecoverable conditions.
    fn halt(&self, reason: fmt::Arguments<'_>) -> ! {
        panic!("kernel halted: {}", reason)
    }
}
