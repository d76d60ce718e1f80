//! Kernel Configuration
//!
//! Compile-time limits plus the runtime `KernelConfig` handed to
//! [`Kernel::new`](crate::Kernel::new).

/// Kernel name reported by `uname`
pub const KERNEL_NAME: &str = "PantherOS";
/// Kernel version string
pub const VERSION: &str = "0.3.0";
/// Release codename reported in the `uname` version field
pub const CODENAME: &str = "fortress";
/// Machine string reported by `uname`
pub const MACHINE: &str = "x86_64";

/// First address that belongs to the kernel half of the address space.
/// User pointers must lie strictly below it.
pub const USER_SPLIT: usize = 0x8000_0000_0000_0000;

/// Size of each per-process kernel stack
pub const KERNEL_STACK_SIZE: usize = 0x9000;
/// Alignment of kernel stacks
pub const KERNEL_STACK_ALIGN: usize = 16;

/// Initial physical capacity of a fresh descriptor table
pub const INITIAL_FD_CAPACITY: usize = 4;

/// Hostname storage, including the terminating NUL
pub const HOSTNAME_MAX: usize = 256;
/// Longest path accepted from user space
pub const PATH_MAX: usize = 4096;
/// Nested symlinks followed before giving up
pub const MAX_SYMLINK_DEPTH: usize = 8;

/// Subticks per timer tick (tick = one second)
pub const SUBTICKS_PER_TICK: u64 = 1_000_000;

/// Superuser id
pub const USER_ROOT_UID: u32 = 0;

/// User page granularity for `sbrk`
pub const PAGE_SIZE: usize = 0x1000;

/// What the syscall boundary does with a pointer outside the user window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPolicy {
    /// Halt the whole kernel.
    Halt,
    /// Terminate only the calling process and fail the syscall with EFAULT.
    KillProcess,
}

/// Runtime configuration for a kernel instance.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Upper bound (exclusive) for user pointers
    pub user_split: usize,
    /// Bytes per kernel stack
    pub kernel_stack_size: usize,
    /// Initial descriptor table capacity for the init process
    pub fd_capacity: usize,
    /// Handling of invalid user pointers
    pub pointer_policy: PointerPolicy,
    /// Wall-clock seconds at tick zero, used by `gettimeofday`
    pub boot_time: u64,
    /// Initial hostname
    pub hostname: &'static str,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            user_split: USER_SPLIT,
            kernel_stack_size: KERNEL_STACK_SIZE,
            fd_capacity: INITIAL_FD_CAPACITY,
            pointer_policy: PointerPolicy::Halt,
            boot_time: 0,
            hostname: "",
        }
    }
}
