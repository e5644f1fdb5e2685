//! What backs a user page that is not necessarily resident.

use crate::fs::FileRef;
use crate::swapping::SwapSlot;
use core::fmt;

/// A page-sized window of a file.
#[derive(Clone)]
pub struct FileSegment {
    pub file: FileRef,
    pub offset: u64,
    /// Bytes to read from `offset`; the rest of the page is zero-filled.
    pub read_bytes: usize,
    pub zero_bytes: usize,
    pub writable: bool,
    /// Dirty content goes back to the file instead of to swap (memory-mapped files).
    pub write_back: bool,
}

impl fmt::Debug for FileSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSegment")
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .field("zero_bytes", &self.zero_bytes)
            .field("writable", &self.writable)
            .field("write_back", &self.write_back)
            .finish_non_exhaustive()
    }
}

/// Page content parked in a swap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPage {
    pub slot: SwapSlot,
    /// Whether the mapping was writable when the page was evicted.
    pub writable: bool,
}

#[derive(Debug, Clone)]
pub enum PageBacking {
    /// Content still equals the file window.
    File(FileSegment),
    /// Anonymous page content in swap.
    Swap(SwapPage),
    /// File page whose current content diverged and now sits in swap.
    FileThenSwap(FileSegment, SwapPage),
    /// Resident anonymous page (stack, heap) on its way out for the first time.
    Anonymous,
}

/// Supplemental page table entry.
#[derive(Debug, Clone)]
pub struct Spte {
    pub upage: usize,
    pub backing: PageBacking,
    pub resident: bool,
    /// An eviction is moving the page out; faults on it must wait.
    pub evicting: bool,
}

impl Spte {
    pub fn file_backed(upage: usize, segment: FileSegment) -> Self {
        Self {
            upage,
            backing: PageBacking::File(segment),
            resident: false,
            evicting: false,
        }
    }

    pub fn anonymous(upage: usize) -> Self {
        Self {
            upage,
            backing: PageBacking::Anonymous,
            resident: true,
            evicting: false,
        }
    }

    pub fn is_file_backed(&self) -> bool {
        self.segment().is_some()
    }

    pub fn is_swapped(&self) -> bool {
        self.swap().is_some()
    }

    pub fn segment(&self) -> Option<&FileSegment> {
        match &self.backing {
            PageBacking::File(segment) | PageBacking::FileThenSwap(segment, _) => Some(segment),
            PageBacking::Swap(_) | PageBacking::Anonymous => None,
        }
    }

    pub fn swap(&self) -> Option<SwapPage> {
        match self.backing {
            PageBacking::Swap(swap) | PageBacking::FileThenSwap(_, swap) => Some(swap),
            PageBacking::File(_) | PageBacking::Anonymous => None,
        }
    }

    /// Record that the page content now lives in `swap`.
    pub(super) fn swapped_out(&mut self, swap: SwapPage) {
        self.backing = match core::mem::replace(&mut self.backing, PageBacking::Anonymous) {
            PageBacking::File(segment) | PageBacking::FileThenSwap(segment, _) => {
                PageBacking::FileThenSwap(segment, swap)
            }
            PageBacking::Swap(_) | PageBacking::Anonymous => PageBacking::Swap(swap),
        };
        self.resident = false;
    }

    /// Drop the swap copy after it was read back in. Returns `false` when nothing but the
    /// swap copy described the page, i.e. the entry is no longer needed.
    pub(super) fn swapped_in(&mut self) -> bool {
        self.backing = match core::mem::replace(&mut self.backing, PageBacking::Anonymous) {
            PageBacking::FileThenSwap(segment, _) | PageBacking::File(segment) => {
                PageBacking::File(segment)
            }
            PageBacking::Swap(_) | PageBacking::Anonymous => return false,
        };
        self.resident = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::tempfs::TempFile;
    use alloc::{sync::Arc, vec};

    fn segment() -> FileSegment {
        FileSegment {
            file: Arc::new(TempFile::new(vec![1; 16])),
            offset: 0,
            read_bytes: 16,
            zero_bytes: 4080,
            writable: true,
            write_back: false,
        }
    }

    const SWAP: SwapPage = SwapPage {
        slot: SwapSlot::new(3),
        writable: true,
    };

    #[test]
    fn file_page_keeps_segment_through_swap() {
        let mut spte = Spte::file_backed(0x1000, segment());
        assert!(spte.is_file_backed() && !spte.is_swapped());

        spte.swapped_out(SWAP);
        assert!(spte.is_file_backed());
        assert_eq!(spte.swap(), Some(SWAP));
        assert!(!spte.resident);

        assert!(spte.swapped_in());
        assert!(matches!(spte.backing, PageBacking::File(_)));
        assert!(spte.resident);
    }

    #[test]
    fn anonymous_page_entry_dies_on_swap_in() {
        let mut spte = Spte::anonymous(0x2000);
        assert!(!spte.is_file_backed() && !spte.is_swapped());
        spte.swapped_out(SWAP);
        assert!(matches!(spte.backing, PageBacking::Swap(_)));
        assert!(!spte.swapped_in());
    }

    #[test]
    fn debug_skips_file_handle() {
        let text = alloc::format!("{:?}", segment());
        assert!(text.starts_with("FileSegment { offset: 0"));
    }
}
