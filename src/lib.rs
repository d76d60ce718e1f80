//! PantherOS Core
//!
//! Process management, scheduling and the system-call boundary of the
//! PantherOS kernel.
//!
//! # Layout
//! - [`proc`]: process records, descriptor tables, the process tree
//! - [`sched`]: ready, sleep and wait queues; context switching
//! - [`syscall`]: trap decoding, user pointer validation, handlers
//! - [`vfs`]: the filesystem node interface the handlers call through
//! - [`mm`]: kernel stack allocation
//!
//! Everything hangs off one [`Kernel`] value; there are no hidden globals
//! apart from the console.
//!
//! # Architecture
//! Register layout and calling convention follow x86-64. Context
//! switches, page mapping and halting are delegated to the
//! [`Platform`](proc::Platform) the kernel is built with.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod console;

pub mod config;
pub mod errno;
pub mod kernel;
pub mod mm;
pub mod proc;
pub mod sched;
pub mod syscall;
pub mod vfs;

pub use config::{KernelConfig, PointerPolicy};
pub use errno::{Errno, SysResult};
pub use kernel::Kernel;
