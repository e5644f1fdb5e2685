//! The address-translation collaborator.
//!
//! The VM never touches page tables directly; it goes through a
//! [`PageDirectory`] handle owned by each address space. On hardware this is
//! the process's x86 page directory; [`soft::SoftPageDirectory`] keeps the same
//! entries in kernel memory so the subsystem can run hosted.

pub mod soft;

use crate::mem::FrameNumber;
use pager_shared::paging::{PageFaultErrorCode, PageTableEntry};

pub trait PageDirectory: Send + Sync {
    /// Map user page `upage` to `frame`. Returns `false` if `upage` is already
    /// mapped or the page table cannot be allocated.
    fn set_page(&self, upage: usize, frame: FrameNumber, writable: bool) -> bool;

    /// Unmap `upage`, returning the entry as the hardware last left it so the
    /// accessed and dirty bits cannot change between reading and clearing.
    fn clear_page(&self, upage: usize) -> Option<PageTableEntry>;

    /// Current entry for `upage`, if mapped.
    fn get_page(&self, upage: usize) -> Option<PageTableEntry>;

    fn is_accessed(&self, upage: usize) -> bool {
        self.get_page(upage).is_some_and(|pte| pte.accessed())
    }

    fn set_accessed(&self, upage: usize, accessed: bool);

    fn is_dirty(&self, upage: usize) -> bool {
        self.get_page(upage).is_some_and(|pte| pte.dirty())
    }

    fn set_dirty(&self, upage: usize, dirty: bool);

    /// Perform a user access through `upage` the way the MMU would: on success
    /// the accessed bit (and the dirty bit for writes) is set and the backing
    /// frame returned; otherwise the error code the CPU would push.
    fn translate(&self, upage: usize, write: bool) -> Result<FrameNumber, PageFaultErrorCode>;
}
