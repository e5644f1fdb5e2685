use super::page::{FileSegment, Spte};
use super::spt::SupplementalPageTable;
use super::VmError;
use crate::fs::FileRef;
use crate::paging::PageDirectory;
use crate::sync::{Mutex, MutexGuard};
use alloc::sync::Arc;
use core::fmt;
use pager_shared::mem::{is_page_aligned, is_user_vaddr, PAGE_FRAME_SIZE};

pub type Pid = u16;

/// One process's view of user memory: its page directory plus the metadata needed to
/// bring non-resident pages back.
pub struct AddressSpace {
    pid: Pid,
    pagedir: Arc<dyn PageDirectory>,
    pub(super) spt: Mutex<SupplementalPageTable>,
    /// Held across a whole fault, mmap change or teardown of this space.
    pub(super) faults: Mutex<()>,
}

impl AddressSpace {
    pub fn new(pid: Pid, pagedir: Arc<dyn PageDirectory>) -> Arc<Self> {
        Arc::new(Self {
            pid,
            pagedir,
            spt: Mutex::new(SupplementalPageTable::default()),
            faults: Mutex::new(()),
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn pagedir(&self) -> &dyn PageDirectory {
        &*self.pagedir
    }

    /// Snapshot of the entry for `upage`.
    pub fn lookup(&self, upage: usize) -> Option<Spte> {
        self.spt.lock().get(upage).cloned()
    }

    /// Direct access to the page table, for inspection.
    pub fn spt(&self) -> MutexGuard<'_, SupplementalPageTable> {
        self.spt.lock()
    }

    pub fn is_destroyed(&self) -> bool {
        self.spt.lock().is_destroyed()
    }

    /// Declare that `upage` is loaded lazily from `read_bytes` bytes of `file` at `offset`,
    /// followed by `zero_bytes` zeroes.
    pub fn register_file_backed(
        &self,
        file: FileRef,
        offset: u64,
        upage: usize,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> Result<(), VmError> {
        assert!(is_page_aligned(upage), "unaligned page {upage:#x}");
        assert_eq!(read_bytes + zero_bytes, PAGE_FRAME_SIZE);
        if upage == 0 || !is_user_vaddr(upage) {
            return Err(VmError::InvalidMapping);
        }

        let segment = FileSegment {
            file,
            offset,
            read_bytes,
            zero_bytes,
            writable,
            write_back: false,
        };
        self.spt.lock().insert(Spte::file_backed(upage, segment))
    }

    /// Register a whole executable segment page by page.
    ///
    /// On error the pages registered so far stay registered; the loader gives up on the
    /// process anyway.
    pub fn load_segment(
        &self,
        file: &FileRef,
        mut offset: u64,
        mut upage: usize,
        mut read_bytes: usize,
        mut zero_bytes: usize,
        writable: bool,
    ) -> Result<(), VmError> {
        assert_eq!((read_bytes + zero_bytes) % PAGE_FRAME_SIZE, 0);

        while read_bytes > 0 || zero_bytes > 0 {
            let page_read_bytes = read_bytes.min(PAGE_FRAME_SIZE);
            let page_zero_bytes = PAGE_FRAME_SIZE - page_read_bytes;

            self.register_file_backed(
                file.clone(),
                offset,
                upage,
                page_read_bytes,
                page_zero_bytes,
                writable,
            )?;

            read_bytes -= page_read_bytes;
            zero_bytes -= page_zero_bytes;
            offset += page_read_bytes as u64;
            upage += PAGE_FRAME_SIZE;
        }
        Ok(())
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}
