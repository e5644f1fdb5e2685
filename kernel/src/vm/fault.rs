//! Turning a page fault into a mapped, populated page.

use super::address_space::AddressSpace;
use super::page::{FileSegment, SwapPage};
use super::{VirtualMemory, VmError};
use crate::trace;
use alloc::sync::Arc;
use core::fmt;
use pager_shared::mem::{is_user_vaddr, pg_round_down, PAGE_FRAME_SIZE, PHYS_BASE};
use pager_shared::paging::PageFaultErrorCode;
use zerocopy::AsBytes;

/// How far below the stack pointer an access may land and still count as stack: `pusha`
/// stores 32 bytes below `esp` before moving it.
pub const STACK_HEURISTIC_SLACK: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// Invalid access; the faulting process is killed.
    Unrecoverable(usize),
    /// The subsystem itself failed; the kernel halts.
    Fatal(VmError),
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultError::Unrecoverable(addr) => write!(f, "invalid access at {addr:#x}"),
            FaultError::Fatal(err) => write!(f, "fatal: {err}"),
        }
    }
}

impl core::error::Error for FaultError {}

impl FaultError {
    fn from_vm(fault_addr: usize, err: VmError) -> Self {
        if err.is_fatal() {
            FaultError::Fatal(err)
        } else {
            FaultError::Unrecoverable(fault_addr)
        }
    }
}

fn is_stack_access(vm: &VirtualMemory, fault_addr: usize, esp: usize) -> bool {
    fault_addr >= esp.saturating_sub(STACK_HEURISTIC_SLACK)
        && fault_addr >= PHYS_BASE.saturating_sub(vm.max_stack())
        && fault_addr < PHYS_BASE
}

/// Resolve a not-present fault at `fault_addr` taken by `space` with stack pointer `esp`.
pub fn resolve_fault(
    vm: &VirtualMemory,
    space: &Arc<AddressSpace>,
    fault_addr: usize,
    esp: usize,
    error_code: PageFaultErrorCode,
) -> Result<(), FaultError> {
    if !is_user_vaddr(fault_addr) || fault_addr < PAGE_FRAME_SIZE || error_code.present() {
        return Err(FaultError::Unrecoverable(fault_addr));
    }

    let upage = pg_round_down(fault_addr);
    let _faults = space.faults.lock();

    loop {
        let spte = {
            let spt = space.spt.lock();
            if spt.is_destroyed() {
                return Err(FaultError::Unrecoverable(fault_addr));
            }
            spt.get(upage).cloned()
        };

        let Some(spte) = spte else {
            if is_stack_access(vm, fault_addr, esp) {
                return grow_stack_locked(vm, space, upage)
                    .map_err(|err| FaultError::from_vm(fault_addr, err));
            }
            return Err(FaultError::Unrecoverable(fault_addr));
        };

        if spte.evicting {
            vm.frames().wait_for_eviction();
            continue;
        }

        if spte.resident {
            // Already brought in, e.g. by a racing access that faulted first.
            return match space.pagedir().get_page(upage) {
                Some(_) => Ok(()),
                None => Err(FaultError::Unrecoverable(fault_addr)),
            };
        }

        return match (spte.swap(), spte.segment()) {
            (Some(swap_page), segment) => {
                load_from_swap(vm, space, upage, swap_page, segment.is_some())
            }
            (None, Some(segment)) => load_from_file(vm, space, upage, segment),
            (None, None) => Err(FaultError::Unrecoverable(fault_addr)),
        }
        .map_err(|err| match err {
            FaultError::Unrecoverable(_) => FaultError::Unrecoverable(fault_addr),
            fatal => fatal,
        });
    }
}

fn load_from_swap(
    vm: &VirtualMemory,
    space: &Arc<AddressSpace>,
    upage: usize,
    swap_page: SwapPage,
    file_backed: bool,
) -> Result<(), FaultError> {
    let frames = vm.frames();
    let frame = vm
        .allocate_for(space, upage, false)
        .map_err(|err| FaultError::from_vm(upage, err))?;

    let read = vm.swap().read_page(swap_page.slot, &mut frames.contents(frame));
    if let Err(err) = read {
        frames.free(frame);
        return Err(FaultError::Fatal(err.into()));
    }

    let pagedir = space.pagedir();
    if !pagedir.set_page(upage, frame, swap_page.writable) {
        frames.free(frame);
        return Err(FaultError::Unrecoverable(upage));
    }

    {
        let mut spt = space.spt.lock();
        let keep = spt.get_mut(upage).is_some_and(|spte| spte.swapped_in());
        if !keep {
            spt.remove(upage);
        }
        if file_backed {
            // The file is stale; the next eviction must go to swap again.
            pagedir.set_dirty(upage, true);
        }
    }
    vm.swap().release(swap_page.slot);
    frames.unpin(frame);

    trace!(
        "pid {}: {:#x} in from {}",
        space.pid(),
        upage,
        swap_page.slot
    );
    Ok(())
}

fn load_from_file(
    vm: &VirtualMemory,
    space: &Arc<AddressSpace>,
    upage: usize,
    segment: &FileSegment,
) -> Result<(), FaultError> {
    let frames = vm.frames();
    let frame = vm
        .allocate_for(space, upage, false)
        .map_err(|err| FaultError::from_vm(upage, err))?;

    let read = {
        let mut page = frames.contents(frame);
        let bytes = page.as_bytes_mut();
        let read = segment
            .file
            .read_at(segment.offset, &mut bytes[..segment.read_bytes]);
        bytes[segment.read_bytes..].fill(0);
        read
    };
    if read != Ok(segment.read_bytes) {
        trace!(
            "pid {}: short read for {:#x}: {:?}",
            space.pid(),
            upage,
            read
        );
        frames.free(frame);
        return Err(FaultError::Unrecoverable(upage));
    }

    if !space.pagedir().set_page(upage, frame, segment.writable) {
        frames.free(frame);
        return Err(FaultError::Unrecoverable(upage));
    }

    if let Some(spte) = space.spt.lock().get_mut(upage) {
        spte.resident = true;
    }
    frames.unpin(frame);

    trace!(
        "pid {}: {:#x} in from file offset {:#x}",
        space.pid(),
        upage,
        segment.offset
    );
    Ok(())
}

/// Map a fresh zeroed, writable page at the page containing `addr`. Used by the loader for
/// the initial stack page.
pub fn grow_stack(vm: &VirtualMemory, space: &Arc<AddressSpace>, addr: usize) -> Result<(), VmError> {
    if !is_user_vaddr(addr) || addr < PAGE_FRAME_SIZE {
        return Err(VmError::InvalidMapping);
    }
    let _faults = space.faults.lock();
    grow_stack_locked(vm, space, pg_round_down(addr))
}

fn grow_stack_locked(
    vm: &VirtualMemory,
    space: &Arc<AddressSpace>,
    upage: usize,
) -> Result<(), VmError> {
    if space.is_destroyed() {
        return Err(VmError::Destroyed);
    }
    let pagedir = space.pagedir();
    if pagedir.get_page(upage).is_some() {
        return Err(VmError::AlreadyMapped);
    }

    let frame = vm.allocate_for(space, upage, true)?;
    if !pagedir.set_page(upage, frame, true) {
        vm.frames().free(frame);
        return Err(VmError::MapFailed);
    }
    vm.frames().unpin(frame);

    trace!("pid {}: stack grew to {:#x}", space.pid(), upage);
    Ok(())
}

/// Entry point for the page-fault trap. Returns `false` when the faulting process has to
/// be killed; halts the kernel when the subsystem cannot continue.
pub fn handle_page_fault(
    vm: &VirtualMemory,
    space: &Arc<AddressSpace>,
    fault_addr: usize,
    esp: usize,
    error_code: PageFaultErrorCode,
) -> bool {
    match resolve_fault(vm, space, fault_addr, esp, error_code) {
        Ok(()) => true,
        Err(FaultError::Unrecoverable(addr)) => {
            trace!("pid {}: unresolvable fault at {:#x}", space.pid(), addr);
            false
        }
        Err(FaultError::Fatal(err)) => {
            pager_shared::eprintln!(
                "pid {}: page fault at {:#x} cannot be serviced: {}",
                space.pid(),
                fault_addr,
                err
            );
            panic!("virtual memory failure: {err}");
        }
    }
}
