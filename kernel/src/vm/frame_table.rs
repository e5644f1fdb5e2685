//! Every user frame in use, who owns it and which page it backs.
//!
//! Records are kept in scan order for the replacement policy; a new record always goes to the
//! back. Frames are pinned while their content is being loaded so eviction cannot take them
//! half-filled.

use super::address_space::{AddressSpace, Pid};
use super::VmError;
use crate::config::Placement;
use crate::mem::frame_pool::FramePool;
use crate::mem::{FrameNumber, PageBuf, PhysicalMemory};
use crate::swapping::page_replacement::{
    PageReplacementPolicy, ReplacementCandidates, SecondChance,
};
use crate::swapping::SwapStore;
use crate::sync::{Mutex, MutexGuard};
use crate::trace;
use alloc::{sync::Arc, vec::Vec};
use zerocopy::{AsBytes, FromZeroes};

pub(super) struct FrameRecord {
    pub(super) frame: FrameNumber,
    pub(super) owner: Arc<AddressSpace>,
    pub(super) upage: Option<usize>,
}

pub(super) struct Inner {
    pub(super) records: Vec<FrameRecord>,
    pub(super) policy: SecondChance,
    pub(super) pool: FramePool,
}

impl Inner {
    fn position(&self, frame: FrameNumber) -> Option<usize> {
        self.records.iter().position(|record| record.frame == frame)
    }

    pub(super) fn remove_at(&mut self, index: usize) -> FrameRecord {
        let record = self.records.remove(index);
        self.policy.removed(index);
        record
    }
}

/// The frame list as the clock hand sees it.
pub(super) struct Clock<'a> {
    pub(super) records: &'a [FrameRecord],
    pub(super) pool: &'a FramePool,
}

impl ReplacementCandidates for Clock<'_> {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_eligible(&self, index: usize) -> bool {
        let record = &self.records[index];
        record.upage.is_some() && !self.pool.is_pinned(record.frame)
    }

    fn test_and_clear_accessed(&mut self, index: usize) -> bool {
        let record = &self.records[index];
        let Some(upage) = record.upage else {
            return false;
        };
        let pagedir = record.owner.pagedir();
        let accessed = pagedir.is_accessed(upage);
        if accessed {
            pagedir.set_accessed(upage, false);
        }
        accessed
    }
}

/// Public view of a frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub owner: Pid,
    pub upage: Option<usize>,
    pub pinned: bool,
}

pub struct FrameTable {
    pub(super) inner: Mutex<Inner>,
    memory: PhysicalMemory,
    pub(super) eviction: Mutex<()>,
}

impl FrameTable {
    pub fn new(frames: usize, placement: Placement) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: Vec::with_capacity(frames),
                policy: SecondChance::default(),
                pool: FramePool::new(frames, placement),
            }),
            memory: PhysicalMemory::new(frames),
            eviction: Mutex::new(()),
        }
    }

    /// Register a frame for `owner` with no page bound yet. Evicts a frame when the pool is
    /// exhausted.
    pub fn allocate(
        &self,
        swap: &SwapStore,
        owner: &Arc<AddressSpace>,
        zero: bool,
    ) -> Result<FrameNumber, VmError> {
        self.allocate_record(swap, owner, None, zero)
    }

    /// Register a frame for `owner` already bound to `upage`. The frame stays pinned until
    /// [`FrameTable::unpin`].
    pub fn allocate_for(
        &self,
        swap: &SwapStore,
        owner: &Arc<AddressSpace>,
        upage: usize,
        zero: bool,
    ) -> Result<FrameNumber, VmError> {
        self.allocate_record(swap, owner, Some(upage), zero)
    }

    fn allocate_record(
        &self,
        swap: &SwapStore,
        owner: &Arc<AddressSpace>,
        upage: Option<usize>,
        zero: bool,
    ) -> Result<FrameNumber, VmError> {
        let pinned = upage.is_some();
        let (frame, clean) = match self.try_allocate(owner, upage, pinned) {
            Some(frame) => (frame, false),
            None => {
                let (frame, clean) = self.evict(swap)?;
                self.insert(frame, owner, upage, pinned);
                (frame, clean)
            }
        };
        if zero && !clean {
            self.memory.frame(frame).zero();
        }
        trace!(
            "pid {}: allocated {} for {:x?}",
            owner.pid(),
            frame,
            upage
        );
        Ok(frame)
    }

    fn try_allocate(
        &self,
        owner: &Arc<AddressSpace>,
        upage: Option<usize>,
        pinned: bool,
    ) -> Option<FrameNumber> {
        let mut inner = self.inner.lock();
        let frame = inner.pool.alloc()?;
        inner.pool.set_pinned(frame, pinned);
        inner.records.push(FrameRecord {
            frame,
            owner: owner.clone(),
            upage,
        });
        Some(frame)
    }

    /// Record a frame the pool has already handed out (one reclaimed by eviction).
    pub(super) fn insert(
        &self,
        frame: FrameNumber,
        owner: &Arc<AddressSpace>,
        upage: Option<usize>,
        pinned: bool,
    ) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.pool.is_allocated(frame));
        inner.pool.set_pinned(frame, pinned);
        inner.records.push(FrameRecord {
            frame,
            owner: owner.clone(),
            upage,
        });
    }

    /// Attach `upage` to a frame returned by [`FrameTable::allocate`]. The caller installs the
    /// mapping first. Does nothing if the frame is no longer registered.
    pub fn bind(&self, frame: FrameNumber, upage: usize) {
        let mut inner = self.inner.lock();
        match inner.position(frame) {
            Some(index) => inner.records[index].upage = Some(upage),
            None => trace!("bind: {} is not registered", frame),
        }
    }

    pub fn unpin(&self, frame: FrameNumber) {
        let mut inner = self.inner.lock();
        if inner.position(frame).is_some() {
            inner.pool.set_pinned(frame, false);
        }
    }

    /// Pin `frame` if it still backs `upage` of `owner`. Returns `false` when an eviction
    /// got to it first.
    pub(super) fn pin_if_backing(
        &self,
        frame: FrameNumber,
        owner: &Arc<AddressSpace>,
        upage: usize,
    ) -> bool {
        let mut inner = self.inner.lock();
        let backs = inner.position(frame).is_some_and(|index| {
            let record = &inner.records[index];
            Arc::ptr_eq(&record.owner, owner) && record.upage == Some(upage)
        });
        if backs {
            inner.pool.set_pinned(frame, true);
        }
        backs
    }

    /// Drop the record for `frame` and give the frame back to the pool. The caller has
    /// already removed the mapping. Does nothing if an eviction has taken the frame.
    pub fn free(&self, frame: FrameNumber) {
        let mut inner = self.inner.lock();
        let Some(index) = inner.position(frame) else {
            trace!("free: {} is not registered", frame);
            return;
        };
        inner.remove_at(index);
        inner.pool.dealloc(frame);
    }

    pub fn lookup(&self, frame: FrameNumber) -> Option<FrameInfo> {
        let inner = self.inner.lock();
        let record = &inner.records[inner.position(frame)?];
        Some(FrameInfo {
            owner: record.owner.pid(),
            upage: record.upage,
            pinned: inner.pool.is_pinned(frame),
        })
    }

    /// Free every frame owned by `space`, unmapping the bound ones. Returns what was freed.
    pub fn free_owned_by(&self, space: &Arc<AddressSpace>) -> Vec<(FrameNumber, Option<usize>)> {
        let mut inner = self.inner.lock();
        let mut freed = Vec::new();
        let mut index = 0;
        while index < inner.records.len() {
            if !Arc::ptr_eq(&inner.records[index].owner, space) {
                index += 1;
                continue;
            }
            let record = inner.remove_at(index);
            if let Some(upage) = record.upage {
                space.pagedir().clear_page(upage);
            }
            inner.pool.dealloc(record.frame);
            freed.push((record.frame, record.upage));
        }
        freed
    }

    /// Number of live frame records.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Frames currently handed out by the pool, including one mid-eviction.
    pub fn allocated(&self) -> usize {
        self.inner.lock().pool.allocated()
    }

    /// Lock the contents of `frame`.
    pub fn contents(&self, frame: FrameNumber) -> MutexGuard<'_, PageBuf> {
        self.memory.frame(frame)
    }

    pub fn read_frame(&self, frame: FrameNumber, offset: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.memory.frame(frame).as_bytes()[offset..offset + buf.len()]);
    }

    pub fn write_frame(&self, frame: FrameNumber, offset: usize, data: &[u8]) {
        self.memory.frame(frame).as_bytes_mut()[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Block until no eviction is in progress.
    pub(super) fn wait_for_eviction(&self) {
        drop(self.eviction.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockType};
    use crate::drivers::ram_disk::RamDisk;
    use crate::paging::soft::SoftPageDirectory;
    use crate::paging::PageDirectory;
    use alloc::boxed::Box;

    fn swap() -> SwapStore {
        SwapStore::new(Block::new(BlockType::Swap, "swap", 64, Box::new(RamDisk::new(64))))
    }

    fn space(pid: Pid) -> Arc<AddressSpace> {
        AddressSpace::new(pid, Arc::new(SoftPageDirectory::new()))
    }

    #[test]
    fn allocate_registers_unbound_frame() {
        let table = FrameTable::new(4, Placement::NextFit);
        let swap = swap();
        let owner = space(3);
        let frame = table.allocate(&swap, &owner, true).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.lookup(frame),
            Some(FrameInfo {
                owner: 3,
                upage: None,
                pinned: false
            })
        );

        table.bind(frame, 0x4000);
        assert_eq!(table.lookup(frame).unwrap().upage, Some(0x4000));
    }

    #[test]
    fn allocate_for_pins_until_unpinned() {
        let table = FrameTable::new(2, Placement::FirstFit);
        let swap = swap();
        let owner = space(1);
        let frame = table.allocate_for(&swap, &owner, 0x8000, false).unwrap();
        assert!(table.lookup(frame).unwrap().pinned);
        table.unpin(frame);
        assert!(!table.lookup(frame).unwrap().pinned);
    }

    #[test]
    fn free_returns_frame_to_pool() {
        let table = FrameTable::new(1, Placement::NextFit);
        let swap = swap();
        let owner = space(1);
        let frame = table.allocate(&swap, &owner, false).unwrap();
        table.free(frame);
        assert!(table.is_empty());
        assert_eq!(table.lookup(frame), None);
        // A second free of the same frame is ignored.
        table.free(frame);
        assert_eq!(table.allocated(), 0);
        assert_eq!(table.allocate(&swap, &owner, false).unwrap(), frame);
    }

    #[test]
    fn bind_ignores_unknown_frame() {
        let table = FrameTable::new(1, Placement::NextFit);
        table.bind(FrameNumber::new(0), 0x1000);
        assert!(table.is_empty());
    }

    #[test]
    fn zero_fill_clears_recycled_frame() {
        let table = FrameTable::new(1, Placement::NextFit);
        let swap = swap();
        let owner = space(1);
        let frame = table.allocate(&swap, &owner, false).unwrap();
        table.write_frame(frame, 10, b"junk");
        table.free(frame);

        let frame = table.allocate(&swap, &owner, true).unwrap();
        let mut buf = [0xff; 4];
        table.read_frame(frame, 10, &mut buf);
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn free_owned_by_unmaps_only_that_space() {
        let table = FrameTable::new(3, Placement::NextFit);
        let swap = swap();
        let a = space(1);
        let b = space(2);
        let fa = table.allocate_for(&swap, &a, 0x1000, true).unwrap();
        assert!(a.pagedir().set_page(0x1000, fa, true));
        let fb = table.allocate_for(&swap, &b, 0x1000, true).unwrap();
        assert!(b.pagedir().set_page(0x1000, fb, true));
        let unbound = table.allocate(&swap, &a, false).unwrap();

        let freed = table.free_owned_by(&a);
        assert_eq!(freed, [(fa, Some(0x1000)), (unbound, None)]);
        assert!(a.pagedir().get_page(0x1000).is_none());
        assert!(b.pagedir().get_page(0x1000).is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(fb).unwrap().owner, 2);
    }
}
