//! Memory-mapped files. Pages load lazily like executable segments, but dirty pages are
//! written back to the file instead of going to swap.

use super::address_space::AddressSpace;
use super::page::{FileSegment, Spte};
use super::spt::{MapId, Mapping};
use super::{VirtualMemory, VmError};
use crate::fs::FileRef;
use crate::mem::FrameNumber;
use crate::trace;
use alloc::{sync::Arc, vec::Vec};
use pager_shared::mem::{is_page_aligned, pg_round_up, PAGE_FRAME_SIZE, PHYS_BASE};

/// Map all of `file` at `upage`, which must be page aligned and have room below kernel space.
pub fn map_file(space: &Arc<AddressSpace>, file: FileRef, upage: usize) -> Result<MapId, VmError> {
    let length = usize::try_from(file.length()).map_err(|_| VmError::InvalidMapping)?;
    if length == 0 || upage == 0 || !is_page_aligned(upage) {
        return Err(VmError::InvalidMapping);
    }
    let pages = pg_round_up(length) / PAGE_FRAME_SIZE;
    match upage.checked_add(pages * PAGE_FRAME_SIZE) {
        Some(end) if end <= PHYS_BASE => {}
        _ => return Err(VmError::InvalidMapping),
    }

    let _faults = space.faults.lock();
    let mut spt = space.spt.lock();
    if spt.is_destroyed() {
        return Err(VmError::Destroyed);
    }
    for page in (0..pages).map(|i| upage + i * PAGE_FRAME_SIZE) {
        if spt.contains(page) {
            return Err(VmError::AlreadyRegistered);
        }
        if space.pagedir().get_page(page).is_some() {
            return Err(VmError::AlreadyMapped);
        }
    }

    for i in 0..pages {
        let offset = i * PAGE_FRAME_SIZE;
        let read_bytes = (length - offset).min(PAGE_FRAME_SIZE);
        let segment = FileSegment {
            file: file.clone(),
            offset: offset as u64,
            read_bytes,
            zero_bytes: PAGE_FRAME_SIZE - read_bytes,
            writable: true,
            write_back: true,
        };
        spt.insert(Spte::file_backed(upage + offset, segment))?;
    }

    let id = spt.add_mapping(Mapping { file, upage, pages });
    trace!(
        "pid {}: {} at {:#x}, {} pages",
        space.pid(),
        id,
        upage,
        pages
    );
    Ok(id)
}

/// Remove a mapping created by [`map_file`], writing dirty pages back to the file.
pub fn unmap_file(vm: &VirtualMemory, space: &Arc<AddressSpace>, id: MapId) -> Result<(), VmError> {
    let _faults = space.faults.lock();
    unmap_locked(vm, space, id)
}

pub(super) fn mapping_ids(space: &AddressSpace) -> Vec<MapId> {
    space.spt.lock().mapping_ids().collect()
}

/// [`unmap_file`] with the fault lock already held.
pub(super) fn unmap_locked(
    vm: &VirtualMemory,
    space: &Arc<AddressSpace>,
    id: MapId,
) -> Result<(), VmError> {
    let mapping = space
        .spt
        .lock()
        .take_mapping(id)
        .ok_or(VmError::InvalidMapping)?;

    // Every page is unmapped even if an earlier write-back failed.
    let mut result = Ok(());
    for page in (0..mapping.pages).map(|i| mapping.upage + i * PAGE_FRAME_SIZE) {
        let unmapped = unmap_page(vm, space, page);
        if result.is_ok() {
            result = unmapped;
        }
    }
    trace!("pid {}: unmapped {}", space.pid(), id);
    result
}

fn unmap_page(vm: &VirtualMemory, space: &Arc<AddressSpace>, upage: usize) -> Result<(), VmError> {
    let frames = vm.frames();
    let pagedir = space.pagedir();

    loop {
        let Some(spte) = space.spt.lock().get(upage).cloned() else {
            return Ok(());
        };
        if spte.evicting {
            frames.wait_for_eviction();
            continue;
        }

        let resident = match pagedir.get_page(upage) {
            Some(pte) if spte.resident => Some(FrameNumber::new(pte.frame())),
            _ => None,
        };
        if let Some(frame) = resident {
            // Keep eviction away while the content is written back.
            if !frames.pin_if_backing(frame, space, upage) {
                frames.wait_for_eviction();
                continue;
            }
        }

        let pte = {
            let mut spt = space.spt.lock();
            spt.remove(upage);
            pagedir.clear_page(upage)
        };
        if let Some(swap_page) = spte.swap() {
            vm.swap().release(swap_page.slot);
        }

        let Some(frame) = resident else {
            return Ok(());
        };
        let written = match (spte.segment(), pte) {
            (Some(segment), Some(pte)) if pte.dirty() => {
                frames.write_back(frame, segment).map_err(VmError::from)
            }
            _ => Ok(()),
        };
        frames.free(frame);
        return written;
    }
}
