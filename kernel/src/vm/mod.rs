//! Demand paging: the frame table, eviction, supplemental page tables and the fault path.

pub mod address_space;
mod eviction;
pub mod fault;
pub mod frame_table;
pub mod mmap;
pub mod page;
pub mod spt;

pub use address_space::{AddressSpace, Pid};
pub use fault::{grow_stack, handle_page_fault, resolve_fault, FaultError};
pub use frame_table::{FrameInfo, FrameTable};
pub use mmap::{map_file, unmap_file};
pub use page::{FileSegment, PageBacking, Spte, SwapPage};
pub use spt::MapId;

use crate::block::{Block, BlockError};
use crate::config::VmConfig;
use crate::fs;
use crate::mem::FrameNumber;
use crate::swapping::SwapStore;
use crate::trace;
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use once_cell::race::OnceBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The pool is empty and nothing could be evicted to refill it.
    OutOfFrames,
    /// Every frame is pinned or not yet bound to a page.
    NoVictim,
    /// No free swap slot for a page that has to be swapped out.
    SwapFull,
    Block(BlockError),
    File(fs::Error),
    /// A dirty mapped page could not be written back to its file while being evicted.
    WriteBack(fs::Error),
    AlreadyRegistered,
    /// The page is already present in the page directory.
    AlreadyMapped,
    /// The page directory refused the mapping.
    MapFailed,
    InvalidMapping,
    /// The address space has been torn down.
    Destroyed,
}

impl VmError {
    /// Errors after which the subsystem cannot guarantee forward progress.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VmError::OutOfFrames
                | VmError::NoVictim
                | VmError::SwapFull
                | VmError::Block(_)
                | VmError::WriteBack(_)
        )
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::OutOfFrames => write!(f, "out of physical frames"),
            VmError::NoVictim => write!(f, "no evictable frame"),
            VmError::SwapFull => write!(f, "swap is full"),
            VmError::Block(err) => write!(f, "swap device: {err}"),
            VmError::File(err) => write!(f, "file: {err}"),
            VmError::WriteBack(err) => write!(f, "write-back of evicted page: {err}"),
            VmError::AlreadyRegistered => write!(f, "page already registered"),
            VmError::AlreadyMapped => write!(f, "page already mapped"),
            VmError::MapFailed => write!(f, "could not install mapping"),
            VmError::InvalidMapping => write!(f, "invalid mapping"),
            VmError::Destroyed => write!(f, "address space destroyed"),
        }
    }
}

impl core::error::Error for VmError {}

impl From<BlockError> for VmError {
    fn from(err: BlockError) -> Self {
        VmError::Block(err)
    }
}

impl From<fs::Error> for VmError {
    fn from(err: fs::Error) -> Self {
        VmError::File(err)
    }
}

/// The subsystem root: the frame table and swap store shared by every address space.
pub struct VirtualMemory {
    frames: FrameTable,
    swap: SwapStore,
    max_stack: usize,
}

impl VirtualMemory {
    /// `available_frames` is what the physical allocator can give the user pool; `-ul` may
    /// cap it further.
    pub fn new(config: &VmConfig, available_frames: usize, swap_device: Block) -> Self {
        let frames = config.user_pool_frames(available_frames);
        trace!(
            "user pool: {} frames, stack limit {:#x}, {:?}",
            frames,
            config.max_stack,
            config.placement
        );
        Self {
            frames: FrameTable::new(frames, config.placement),
            swap: SwapStore::new(swap_device),
            max_stack: config.max_stack,
        }
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Frame for `owner`, not yet bound to any page. Evicts when the pool is full.
    pub fn allocate(&self, owner: &Arc<AddressSpace>, zero: bool) -> Result<FrameNumber, VmError> {
        self.frames.allocate(&self.swap, owner, zero)
    }

    /// Frame for `owner` already bound to `upage`, pinned until [`FrameTable::unpin`].
    pub fn allocate_for(
        &self,
        owner: &Arc<AddressSpace>,
        upage: usize,
        zero: bool,
    ) -> Result<FrameNumber, VmError> {
        self.frames.allocate_for(&self.swap, owner, upage, zero)
    }

    /// Tear down everything `space` holds: its mappings (dirty pages written back), swap slots,
    /// page table entries and frames. Calling it again does nothing.
    pub fn destroy_spt(&self, space: &Arc<AddressSpace>) {
        let _faults = space.faults.lock();
        if space.spt.lock().is_destroyed() {
            return;
        }

        for id in mmap::mapping_ids(space) {
            if let Err(err) = mmap::unmap_locked(self, space, id) {
                pager_shared::eprintln!("pid {}: write-back of {id} failed: {err}", space.pid());
            }
        }

        let entries = space.spt.lock().destroy();
        for spte in entries.values() {
            if let Some(swap) = spte.swap() {
                self.swap.release(swap.slot);
            }
        }

        let released = self.frames.free_owned_by(space);
        trace!("pid {}: released {} frames", space.pid(), released.len());
    }
}

static VM: OnceBox<VirtualMemory> = OnceBox::new();

/// Install the kernel-wide instance. Panics if called twice.
pub fn init(vm: VirtualMemory) -> &'static VirtualMemory {
    if VM.set(Box::new(vm)).is_err() {
        panic!("virtual memory initialised twice");
    }
    self::vm()
}

/// The kernel-wide instance installed by [`init`].
pub fn vm() -> &'static VirtualMemory {
    try_vm().expect("virtual memory not initialised")
}

pub fn try_vm() -> Option<&'static VirtualMemory> {
    VM.get()
}
