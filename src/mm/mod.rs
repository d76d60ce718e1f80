//! Memory management module for PantherOS
//!
//! Provides:
//! - Kernel stack allocation for new processes
//!
//! User address spaces and frame allocation belong to the architecture
//! layer and are reached through [`Platform`](crate::proc::Platform).

mod stack;

pub use stack::{KernelStack, StackPool};
