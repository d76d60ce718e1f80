//! System Call Interface
//!
//! The boundary between user programs and the kernel. A trap saves the
//! caller's registers in a [`TrapFrame`](crate::proc::TrapFrame) and hands
//! it to [`dispatch`], which decodes the number and arguments into a
//! [`Syscall`] and runs the handler for the current process.
//!
//! # Security Model
//! - Whitelist approach: only numbers in the table are accepted
//! - Every user pointer is checked against the caller's window before use
//! - Paths are copied into kernel memory before lookup
//! - Failures are negative errno values in the return register
//!
//! # Calling Convention
//! `rax` holds the number; arguments are in `rbx`, `rcx`, `rdx`, `rsi`,
//! `rdi`. The result goes back in `rax`.

mod decode;
mod fs;
mod handler;
mod validate;

pub use decode::{numbers, Syscall};
pub use handler::{dispatch, SyscallContext, Timeval, Utsname};
pub use validate::{UserBuffer, UserBufferMut, UserSpace};
