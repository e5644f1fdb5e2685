pub mod frame_pool;
pub mod user;

use crate::sync::{Mutex, MutexGuard};
use alloc::boxed::Box;
use core::fmt;
use pager_shared::mem::PAGE_FRAME_SIZE;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Index of a frame in the user pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameNumber(usize);

impl FrameNumber {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// The contents of one physical frame.
#[derive(FromZeroes, FromBytes, AsBytes)]
#[repr(transparent)]
pub struct PageBuf([u8; PAGE_FRAME_SIZE]);

/// Backing memory for the user pool. Each frame has its own lock so page I/O never
/// holds a table-wide lock.
pub struct PhysicalMemory {
    frames: Box<[Mutex<PageBuf>]>,
}

impl PhysicalMemory {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: (0..frames).map(|_| Mutex::new(PageBuf::new_zeroed())).collect(),
        }
    }

    pub fn frame(&self, frame: FrameNumber) -> MutexGuard<'_, PageBuf> {
        self.frames[frame.index()].lock()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_start_zeroed() {
        let memory = PhysicalMemory::new(2);
        assert_eq!(memory.len(), 2);
        let page = memory.frame(FrameNumber::new(1));
        assert!(page.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_clears_contents() {
        let memory = PhysicalMemory::new(1);
        let mut page = memory.frame(FrameNumber::new(0));
        page.as_bytes_mut()[..3].copy_from_slice(b"abc");
        assert_eq!(&page.as_bytes()[..3], b"abc");
        page.zero();
        assert_eq!(page.as_bytes()[0], 0);
    }
}
