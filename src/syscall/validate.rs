//! System Call Input Validation
//!
//! User pointers are accepted only inside the caller's user window:
//! strictly above the program entry address and strictly below the
//! user/kernel split. Everything the kernel reads from or writes to user
//! memory goes through the checked types here.
//!
//! # Security Principles
//! - Validate every pointer before it is dereferenced
//! - Reject ranges whose end overflows or crosses the split
//! - Copy strings into kernel memory before use (no TOCTOU on paths)
//!
//! Policy for a pointer that fails the window check (halt or kill) is
//! applied by the dispatcher, not here.

use alloc::string::String;
use alloc::vec::Vec;
use core::mem::size_of;

use crate::config::PATH_MAX;
use crate::errno::Errno;

/// The user address window of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSpace {
    entry: usize,
    split: usize,
}

impl UserSpace {
    pub const fn new(entry: usize, split: usize) -> Self {
        Self { entry, split }
    }

    #[inline]
    pub fn entry(&self) -> usize {
        self.entry
    }

    #[inline]
    pub fn split(&self) -> usize {
        self.split
    }

    /// True if `ptr` lies inside the window.
    #[inline]
    pub fn in_range(&self, ptr: usize) -> bool {
        ptr > self.entry && ptr < self.split
    }

    /// The dispatcher's pointer guard: null passes, anything else must be
    /// in range.
    #[inline]
    pub fn permits(&self, ptr: usize) -> bool {
        ptr == 0 || self.in_range(ptr)
    }

    /// True if the whole of `[ptr, ptr + len)` is inside the window.
    pub fn range_ok(&self, ptr: usize, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        match ptr.checked_add(len) {
            Some(end) => self.in_range(ptr) && end <= self.split,
            None => false,
        }
    }

    /// Validate a buffer the kernel will read.
    ///
    /// # Security Checks
    /// 1. Non-zero lengths need a non-null pointer
    /// 2. Start is inside the window
    /// 3. `ptr + len` does not overflow and ends at or below the split
    pub fn validate_read(&self, ptr: usize, len: usize) -> Result<UserBuffer, Errno> {
        if len == 0 {
            return Ok(UserBuffer {
                ptr: ptr as *const u8,
                len: 0,
            });
        }
        if ptr == 0 || !self.range_ok(ptr, len) {
            return Err(Errno::Efault);
        }
        Ok(UserBuffer {
            ptr: ptr as *const u8,
            len,
        })
    }

    /// Validate a buffer the kernel will write.
    pub fn validate_write(&self, ptr: usize, len: usize) -> Result<UserBufferMut, Errno> {
        let buf = self.validate_read(ptr, len)?;
        Ok(UserBufferMut {
            ptr: buf.ptr as *mut u8,
            len: buf.len,
        })
    }

    /// Copy a NUL-terminated string into kernel memory.
    ///
    /// Fails with `Efault` for null or out-of-window memory,
    /// `Enametoolong` if no terminator appears within `PATH_MAX` bytes,
    /// and `Einval` for invalid UTF-8.
    pub fn read_cstr(&self, ptr: usize) -> Result<String, Errno> {
        if ptr == 0 || !self.in_range(ptr) {
            return Err(Errno::Efault);
        }
        let mut bytes = Vec::new();
        for i in 0..PATH_MAX {
            let addr = ptr.checked_add(i).ok_or(Errno::Efault)?;
            if addr >= self.split {
                return Err(Errno::Efault);
            }
            // SAFETY: `addr` is inside the caller's user window, which is
            // mapped while the caller's syscall is being served.
            let byte = unsafe { core::ptr::read(addr as *const u8) };
            if byte == 0 {
                return String::from_utf8(bytes).map_err(|_| Errno::Einval);
            }
            bytes.push(byte);
        }
        Err(Errno::Enametoolong)
    }

    /// Read `count` machine words starting at `ptr`.
    pub fn read_words(&self, ptr: usize, count: usize) -> Result<Vec<usize>, Errno> {
        let len = count.checked_mul(size_of::<usize>()).ok_or(Errno::Efault)?;
        let buf = self.validate_read(ptr, len)?;
        let words = (0..count)
            .map(|i| {
                // SAFETY: `i * size_of::<usize>()` is within the validated
                // buffer; the read tolerates any alignment.
                unsafe { core::ptr::read_unaligned((buf.ptr as *const usize).add(i)) }
            })
            .collect();
        Ok(words)
    }

    /// Copy `value` to user memory at `ptr`.
    pub fn write_value<T: Copy>(&self, ptr: usize, value: &T) -> Result<(), Errno> {
        let buf = self.validate_write(ptr, size_of::<T>())?;
        // SAFETY: the destination spans `size_of::<T>()` validated bytes
        // and `T: Copy` has no drop glue.
        unsafe { core::ptr::write_unaligned(buf.ptr as *mut T, *value) };
        Ok(())
    }
}

/// A validated user-space buffer.
///
/// Only constructed by [`UserSpace::validate_read`].
#[derive(Debug)]
pub struct UserBuffer {
    ptr: *const u8,
    len: usize,
}

impl UserBuffer {
    /// The buffer as a byte slice.
    ///
    /// The contents may change under us if user code runs concurrently;
    /// copy anything that is checked before use.
    pub fn as_bytes(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY:
        // - pointer and length were checked against the user window
        // - the window is mapped while the syscall runs
        unsafe { core::slice::from_raw_parts(self.ptr, self.len) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A validated mutable user-space buffer.
#[derive(Debug)]
pub struct UserBufferMut {
    ptr: *mut u8,
    len: usize,
}

impl UserBufferMut {
    /// The buffer as a mutable byte slice.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: same as `UserBuffer::as_bytes`
        unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::USER_SPLIT;

    // Host test buffers live well below the split, so a window starting
    // at zero covers them.
    fn space() -> UserSpace {
        UserSpace::new(0, USER_SPLIT)
    }

    #[test]
    fn test_zero_length() {
        assert!(space().validate_read(0, 0).is_ok());
    }

    #[test]
    fn test_null_pointer() {
        assert_eq!(space().validate_read(0, 100).err(), Some(Errno::Efault));
        assert!(space().permits(0));
    }

    #[test]
    fn test_overflow() {
        assert!(space().validate_read(usize::MAX - 10, 100).is_err());
    }

    #[test]
    fn test_window_bounds_are_strict() {
        let s = UserSpace::new(0x1000, 0x9000);
        assert!(!s.in_range(0x1000));
        assert!(s.in_range(0x1001));
        assert!(!s.in_range(0x9000));
        assert!(s.range_ok(0x8000, 0x1000));
        assert!(!s.range_ok(0x8000, 0x1001));
    }

    #[test]
    fn test_read_cstr() {
        let raw = b"/etc/hostname\0junk";
        let s = space().read_cstr(raw.as_ptr() as usize).unwrap();
        assert_eq!(s, "/etc/hostname");
    }

    #[test]
    fn test_read_cstr_without_terminator() {
        let raw = alloc::vec![b'a'; PATH_MAX + 1];
        assert_eq!(space().read_cstr(raw.as_ptr() as usize), Err(Errno::Enametoolong));
    }

    #[test]
    fn test_write_value_and_words() {
        let mut out = [0u8; 12];
        space().write_value(out.as_mut_ptr() as usize + 1, &0x0102_0304u32).unwrap();
        assert_eq!(&out[1..5], &0x0102_0304u32.to_ne_bytes());

        let words = [7usize, 0, 9];
        let read = space().read_words(words.as_ptr() as usize, 3).unwrap();
        assert_eq!(read, [7, 0, 9]);
    }
}
