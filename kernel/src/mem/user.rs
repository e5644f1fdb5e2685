//! Copying between kernel buffers and user memory.
//!
//! Each page is reached through the owner's page directory exactly like a user-mode access,
//! so missing pages fault in through the normal fault path and accessed/dirty bits are set
//! as the MMU would set them.

use crate::vm::{resolve_fault, AddressSpace, FaultError, VirtualMemory};
use alloc::sync::Arc;
use core::ops::Range;
use pager_shared::mem::{is_user_vaddr, pg_ofs, pg_round_down, PAGE_FRAME_SIZE};
use zerocopy::AsBytes;

use super::PageBuf;

/// Runs `f` on every page-sized piece of `[uaddr, uaddr + len)` with the page's frame locked.
/// `f` gets the byte range within the page and the offset into the user range.
fn access_user(
    vm: &VirtualMemory,
    space: &Arc<AddressSpace>,
    uaddr: usize,
    len: usize,
    esp: usize,
    write: bool,
    mut f: impl FnMut(&mut PageBuf, Range<usize>, usize),
) -> Result<(), FaultError> {
    let pagedir = space.pagedir();
    let mut done = 0;

    while done < len {
        let addr = uaddr
            .checked_add(done)
            .ok_or(FaultError::Unrecoverable(uaddr))?;
        if !is_user_vaddr(addr) {
            return Err(FaultError::Unrecoverable(addr));
        }
        let upage = pg_round_down(addr);
        let start = pg_ofs(addr);
        let chunk = (PAGE_FRAME_SIZE - start).min(len - done);

        match pagedir.translate(upage, write) {
            Ok(frame) => {
                let mut page = vm.frames().contents(frame);
                // The page may have been evicted between the lookup and taking the frame.
                let still_mapped = pagedir
                    .get_page(upage)
                    .is_some_and(|pte| pte.frame() == frame.index());
                if still_mapped {
                    f(&mut *page, start..start + chunk, done);
                    done += chunk;
                }
            }
            Err(error_code) => resolve_fault(vm, space, addr, esp, error_code)?,
        }
    }
    Ok(())
}

/// Fill `buf` from user memory at `uaddr`.
pub fn copy_from_user(
    vm: &VirtualMemory,
    space: &Arc<AddressSpace>,
    uaddr: usize,
    buf: &mut [u8],
    esp: usize,
) -> Result<(), FaultError> {
    access_user(vm, space, uaddr, buf.len(), esp, false, |page, range, done| {
        let len = range.len();
        buf[done..done + len].copy_from_slice(&page.as_bytes()[range]);
    })
}

/// Store `data` into user memory at `uaddr`. Fails on read-only pages.
pub fn copy_to_user(
    vm: &VirtualMemory,
    space: &Arc<AddressSpace>,
    uaddr: usize,
    data: &[u8],
    esp: usize,
) -> Result<(), FaultError> {
    access_user(vm, space, uaddr, data.len(), esp, true, |page, range, done| {
        let len = range.len();
        page.as_bytes_mut()[range].copy_from_slice(&data[done..done + len]);
    })
}
