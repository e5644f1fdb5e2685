//! Reclaiming a frame from a full pool.
//!
//! Selection and migration both happen under the eviction lock, so at most one frame is in
//! flight and it is fully moved out before anyone else can be handed it.

use super::address_space::AddressSpace;
use super::frame_table::{Clock, FrameRecord, FrameTable, Inner};
use super::page::{FileSegment, SwapPage};
use super::VmError;
use crate::fs;
use crate::mem::FrameNumber;
use crate::swapping::page_replacement::PageReplacementPolicy;
use crate::swapping::{SwapSlot, SwapStore};
use crate::trace;
use alloc::sync::Arc;
use pager_shared::paging::PageTableEntry;
use zerocopy::{AsBytes, FromZeroes};

/// Where the victim's content goes.
enum WriteOut {
    Swap { writable: bool },
    /// Dirty page of a memory-mapped file.
    File(FileSegment),
    /// Clean file page; the file still has the content.
    Keep,
    /// The page was unmapped under us (teardown or munmap); the content is dead.
    Discard,
}

impl FrameTable {
    /// Take one frame out of circulation for a new allocation. The frame stays allocated in
    /// the pool without a record; the flag tells whether it is already zeroed.
    pub(super) fn evict(&self, swap: &SwapStore) -> Result<(FrameNumber, bool), VmError> {
        let _eviction = self.eviction.lock();

        let victim = {
            let mut inner = self.inner.lock();
            // Someone may have freed a frame while we waited.
            if let Some(frame) = inner.pool.alloc() {
                return Ok((frame, false));
            }
            if inner.records.is_empty() {
                return Err(VmError::OutOfFrames);
            }
            let Inner {
                records,
                policy,
                pool,
            } = &mut *inner;
            let mut clock = Clock {
                records: records.as_slice(),
                pool,
            };
            let index = policy
                .select_victim(&mut clock)
                .ok_or(VmError::NoVictim)?;
            inner.remove_at(index)
        };

        let frame = victim.frame;
        self.migrate(swap, victim)?;
        Ok((frame, true))
    }

    fn migrate(&self, swap: &SwapStore, victim: FrameRecord) -> Result<(), VmError> {
        let FrameRecord { frame, owner, upage } = victim;
        let Some(upage) = upage else {
            unreachable!("{frame} chosen for eviction while unbound");
        };

        let (pte, plan) = {
            let mut spt = owner.spt.lock();
            let pte = owner.pagedir().clear_page(upage);
            let plan = match pte {
                None => WriteOut::Discard,
                Some(pte) => match spt.get_or_insert_anonymous(upage) {
                    None => WriteOut::Discard,
                    Some(spte) => {
                        spte.evicting = true;
                        match spte.segment() {
                            Some(segment) if segment.write_back && pte.dirty() => {
                                WriteOut::File(segment.clone())
                            }
                            Some(segment) if segment.write_back || !pte.dirty() => WriteOut::Keep,
                            _ => WriteOut::Swap {
                                writable: pte.read_write(),
                            },
                        }
                    }
                },
            };
            (pte, plan)
        };

        let written = match &plan {
            WriteOut::Swap { writable } => self.swap_out(swap, frame).map(|slot| {
                Some(SwapPage {
                    slot,
                    writable: *writable,
                })
            }),
            WriteOut::File(segment) => self
                .write_back(frame, segment)
                .map(|()| None)
                .map_err(VmError::WriteBack),
            WriteOut::Keep | WriteOut::Discard => Ok(None),
        };
        let swapped = match written {
            Ok(swapped) => swapped,
            Err(err) => {
                self.restore(&owner, frame, upage, pte);
                return Err(err);
            }
        };

        self.contents(frame).zero();

        if !matches!(plan, WriteOut::Discard) {
            let mut spt = owner.spt.lock();
            match spt.get_mut(upage) {
                Some(spte) => {
                    match swapped {
                        Some(swap_page) => spte.swapped_out(swap_page),
                        None => spte.resident = false,
                    }
                    spte.evicting = false;
                }
                // Torn down while the content was in flight.
                None => {
                    if let Some(swap_page) = swapped {
                        swap.release(swap_page.slot);
                    }
                }
            }
        }

        trace!(
            "pid {}: evicted {:#x} from {} to {:?}",
            owner.pid(),
            upage,
            frame,
            swapped.map(|swap_page| swap_page.slot)
        );
        Ok(())
    }

    fn swap_out(&self, swap: &SwapStore, frame: FrameNumber) -> Result<SwapSlot, VmError> {
        let slot = swap.allocate().ok_or(VmError::SwapFull)?;
        if let Err(err) = swap.write_page(slot, &self.contents(frame)) {
            swap.release(slot);
            return Err(err.into());
        }
        Ok(slot)
    }

    /// Write the file part of a mapped page back to its file. A short write leaves the tail of
    /// the page unsaved and counts as running out of space.
    pub(super) fn write_back(&self, frame: FrameNumber, segment: &FileSegment) -> fs::Result<()> {
        let page = self.contents(frame);
        let written = segment
            .file
            .write_at(segment.offset, &page.as_bytes()[..segment.read_bytes])?;
        if written != segment.read_bytes {
            return Err(fs::Error::NoSpace);
        }
        Ok(())
    }

    /// Put a victim whose content could not be written out back where it was.
    fn restore(
        &self,
        owner: &Arc<AddressSpace>,
        frame: FrameNumber,
        upage: usize,
        pte: Option<PageTableEntry>,
    ) {
        {
            let mut spt = owner.spt.lock();
            if let Some(pte) = pte {
                let pagedir = owner.pagedir();
                pagedir.set_page(upage, frame, pte.read_write());
                pagedir.set_dirty(upage, pte.dirty());
                pagedir.set_accessed(upage, pte.accessed());
            }
            if let Some(spte) = spt.get_mut(upage) {
                spte.evicting = false;
            }
        }
        self.insert(frame, owner, Some(upage), false);
    }
}
