//! The swap store: page-sized slots on a dedicated block device.
//!
//! Slot `i` occupies sectors `[i * SECTORS_PER_PAGE, (i + 1) * SECTORS_PER_PAGE)`.
//! Nothing but raw page contents is written to the device; occupancy lives only in
//! memory and starts out all free.

pub mod page_replacement;
pub mod slot_bitmap;

use crate::block::{Block, BlockError, BlockSector, BlockType, BLOCK_SECTOR_SIZE};
use crate::mem::PageBuf;
use crate::sync::Mutex;
use crate::trace;
use core::fmt;
use pager_shared::eprintln;
use pager_shared::mem::PAGE_FRAME_SIZE;
use slot_bitmap::SlotBitmap;
use zerocopy::AsBytes;

pub const SECTORS_PER_PAGE: BlockSector = (PAGE_FRAME_SIZE / BLOCK_SECTOR_SIZE) as BlockSector;

/// Index of a page-sized slot in the swap store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(u32);

impl SwapSlot {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> u32 {
        self.0
    }

    fn first_sector(self) -> BlockSector {
        self.0 * SECTORS_PER_PAGE
    }
}

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

pub struct SwapStore {
    slots: Mutex<SlotBitmap>,
    device: Mutex<Block>,
}

impl SwapStore {
    pub fn new(device: Block) -> Self {
        if device.get_type() != BlockType::Swap {
            eprintln!("swap: {device} is not a swap device, using it anyway");
        }
        let slot_count = device.get_size() / SECTORS_PER_PAGE;
        trace!(
            "swap: {} ({} sectors) holds {} pages",
            device.get_name(),
            device.get_size(),
            slot_count
        );
        Self {
            slots: Mutex::new(SlotBitmap::new_all_free(slot_count)),
            device: Mutex::new(device),
        }
    }

    /// Claim a free slot, or `None` if the store is full.
    pub fn allocate(&self) -> Option<SwapSlot> {
        self.slots.lock().allocate().map(SwapSlot)
    }

    /// Return `slot` to the free set. Panics if it was not in use.
    pub fn release(&self, slot: SwapSlot) {
        self.slots.lock().free(slot.0);
    }

    pub fn write_page(&self, slot: SwapSlot, page: &PageBuf) -> Result<(), BlockError> {
        debug_assert!(self.is_used(slot));
        let mut device = self.device.lock();
        for (sector, chunk) in
            (slot.first_sector()..).zip(page.as_bytes().chunks_exact(BLOCK_SECTOR_SIZE))
        {
            device.write(sector, chunk)?;
        }
        trace!("swap: wrote {}", slot);
        Ok(())
    }

    pub fn read_page(&self, slot: SwapSlot, page: &mut PageBuf) -> Result<(), BlockError> {
        debug_assert!(self.is_used(slot));
        let mut device = self.device.lock();
        for (sector, chunk) in
            (slot.first_sector()..).zip(page.as_bytes_mut().chunks_exact_mut(BLOCK_SECTOR_SIZE))
        {
            device.read(sector, chunk)?;
        }
        trace!("swap: read {}", slot);
        Ok(())
    }

    pub fn slot_count(&self) -> u32 {
        self.slots.lock().len()
    }

    pub fn used_count(&self) -> u32 {
        self.slots.lock().used()
    }

    pub fn is_used(&self, slot: SwapSlot) -> bool {
        let slots = self.slots.lock();
        slot.0 < slots.len() && !slots.is_free(slot.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ram_disk::RamDisk;
    use alloc::{boxed::Box, sync::Arc};
    use core::sync::atomic::{AtomicBool, Ordering};
    use zerocopy::FromZeroes;

    fn swap_device(pages: u32) -> (Block, Arc<AtomicBool>) {
        let disk = RamDisk::new(pages * SECTORS_PER_PAGE + 3);
        let fail_writes = disk.write_fault_switch();
        let block = Block::new(
            BlockType::Swap,
            "swap",
            pages * SECTORS_PER_PAGE + 3,
            Box::new(disk),
        );
        (block, fail_writes)
    }

    fn patterned(seed: u8) -> PageBuf {
        let mut page = PageBuf::new_zeroed();
        for (i, b) in page.as_bytes_mut().iter_mut().enumerate() {
            *b = seed.wrapping_add(i as u8);
        }
        page
    }

    #[test]
    fn slot_count_ignores_partial_page() {
        let (block, _) = swap_device(4);
        let swap = SwapStore::new(block);
        assert_eq!(SECTORS_PER_PAGE, 8);
        assert_eq!(swap.slot_count(), 4);
        assert_eq!(swap.used_count(), 0);
    }

    #[test]
    fn page_survives_trip_through_swap() {
        let (block, _) = swap_device(2);
        let swap = SwapStore::new(block);
        let first = swap.allocate().unwrap();
        let second = swap.allocate().unwrap();
        assert_ne!(first, second);

        swap.write_page(first, &patterned(1)).unwrap();
        swap.write_page(second, &patterned(200)).unwrap();

        let mut page = PageBuf::new_zeroed();
        swap.read_page(first, &mut page).unwrap();
        assert_eq!(page.as_bytes(), patterned(1).as_bytes());
        swap.read_page(second, &mut page).unwrap();
        assert_eq!(page.as_bytes(), patterned(200).as_bytes());
    }

    #[test]
    fn full_store_refuses_allocation() {
        let (block, _) = swap_device(1);
        let swap = SwapStore::new(block);
        let slot = swap.allocate().unwrap();
        assert_eq!(swap.allocate(), None);
        swap.release(slot);
        assert!(!swap.is_used(slot));
        assert_eq!(swap.allocate(), Some(slot));
    }

    #[test]
    fn device_errors_propagate() {
        let (block, fail_writes) = swap_device(1);
        let swap = SwapStore::new(block);
        let slot = swap.allocate().unwrap();
        fail_writes.store(true, Ordering::SeqCst);
        assert_eq!(
            swap.write_page(slot, &patterned(0)),
            Err(BlockError::WriteError)
        );
        // Failed I/O leaves occupancy untouched.
        assert!(swap.is_used(slot));
        assert_eq!(swap.used_count(), 1);
    }
}
