use super::PageDirectory;
use crate::mem::FrameNumber;
use crate::sync::Mutex;
use alloc::{collections::BTreeMap, vec::Vec};
use pager_shared::mem::{is_page_aligned, pg_no, PAGE_FRAME_SIZE};
use pager_shared::paging::{PageFaultErrorCode, PageTableEntry};

/// Page directory kept entirely in kernel memory, one entry per mapped user page.
#[derive(Default)]
pub struct SoftPageDirectory {
    entries: Mutex<BTreeMap<usize, PageTableEntry>>,
}

impl SoftPageDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pages currently mapped.
    pub fn mapped_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Addresses of all mapped pages, lowest first.
    pub fn mapped_pages(&self) -> Vec<usize> {
        self.entries
            .lock()
            .keys()
            .map(|vpn| vpn * PAGE_FRAME_SIZE)
            .collect()
    }

    fn update(&self, upage: usize, f: impl FnOnce(PageTableEntry) -> PageTableEntry) {
        if let Some(pte) = self.entries.lock().get_mut(&pg_no(upage)) {
            *pte = f(*pte);
        }
    }
}

impl PageDirectory for SoftPageDirectory {
    fn set_page(&self, upage: usize, frame: FrameNumber, writable: bool) -> bool {
        debug_assert!(is_page_aligned(upage));
        let mut entries = self.entries.lock();
        if entries.contains_key(&pg_no(upage)) {
            return false;
        }
        entries.insert(
            pg_no(upage),
            PageTableEntry::user_mapping(frame.index(), writable),
        );
        true
    }

    fn clear_page(&self, upage: usize) -> Option<PageTableEntry> {
        self.entries.lock().remove(&pg_no(upage))
    }

    fn get_page(&self, upage: usize) -> Option<PageTableEntry> {
        self.entries.lock().get(&pg_no(upage)).copied()
    }

    fn set_accessed(&self, upage: usize, accessed: bool) {
        self.update(upage, |pte| pte.with_accessed(accessed));
    }

    fn set_dirty(&self, upage: usize, dirty: bool) {
        self.update(upage, |pte| pte.with_dirty(dirty));
    }

    fn translate(&self, upage: usize, write: bool) -> Result<FrameNumber, PageFaultErrorCode> {
        let mut entries = self.entries.lock();
        let fault = PageFaultErrorCode::user_not_present(write);
        let Some(pte) = entries.get_mut(&pg_no(upage)) else {
            return Err(fault);
        };
        if write && !pte.read_write() {
            return Err(fault.with_present(true));
        }
        *pte = pte.with_accessed(true).with_dirty(pte.dirty() || write);
        Ok(FrameNumber::new(pte.frame()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 0x1000_0000;

    #[test]
    fn map_once() {
        let pd = SoftPageDirectory::new();
        assert!(pd.set_page(PAGE, FrameNumber::new(3), false));
        assert!(!pd.set_page(PAGE, FrameNumber::new(4), true));
        assert_eq!(pd.get_page(PAGE).map(|pte| pte.frame()), Some(3));
        assert_eq!(pd.mapped_pages(), vec![PAGE]);
        assert_eq!(pd.mapped_count(), 1);
    }

    #[test]
    fn translate_sets_bits() {
        let pd = SoftPageDirectory::new();
        pd.set_page(PAGE, FrameNumber::new(1), true);
        assert!(!pd.is_accessed(PAGE));
        assert_eq!(pd.translate(PAGE + 12, false).ok(), Some(FrameNumber::new(1)));
        assert!(pd.is_accessed(PAGE));
        assert!(!pd.is_dirty(PAGE));
        assert!(pd.translate(PAGE, true).is_ok());
        assert!(pd.is_dirty(PAGE));

        pd.set_accessed(PAGE, false);
        pd.set_dirty(PAGE, false);
        assert!(!pd.is_accessed(PAGE));
        assert!(!pd.is_dirty(PAGE));
    }

    #[test]
    fn translate_faults() {
        let pd = SoftPageDirectory::new();
        let missing = pd.translate(PAGE, true).err().expect("nothing mapped");
        assert!(!missing.present());
        assert!(missing.write());

        pd.set_page(PAGE, FrameNumber::new(1), false);
        let protection = pd.translate(PAGE, true).err().expect("read-only");
        assert!(protection.present());
        assert!(!pd.is_dirty(PAGE));
    }

    #[test]
    fn clear_returns_final_entry() {
        let pd = SoftPageDirectory::new();
        pd.set_page(PAGE, FrameNumber::new(7), true);
        assert!(pd.translate(PAGE, true).is_ok());
        let pte = pd.clear_page(PAGE).expect("was mapped");
        assert!(pte.dirty());
        assert!(pd.get_page(PAGE).is_none());
        assert!(pd.clear_page(PAGE).is_none());
    }
}
