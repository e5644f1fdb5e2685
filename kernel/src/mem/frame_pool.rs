//! Core-map bookkeeping for the user frame pool.
//!
//! The pool only tracks which frame numbers are handed out. Frame contents live in
//! [`PhysicalMemory`](super::PhysicalMemory) and frame ownership lives in the frame table.

pub mod placement_algorithms;

use crate::config::Placement;
use alloc::boxed::Box;
use alloc::vec;
use bitbybit::bitfield;
use placement_algorithms::{FirstFit, NextFit, PlacementAlgorithm};

use super::FrameNumber;

#[bitfield(u8, default = 0)]
pub struct CoreMapEntry {
    #[bit(0, rw)]
    allocated: bool,
    #[bit(1, rw)]
    pinned: bool,
}

enum Placer {
    NextFit(NextFit),
    FirstFit(FirstFit),
}

impl Placer {
    fn place_one(&mut self, core_map: &[CoreMapEntry]) -> Option<usize> {
        let range = match self {
            Placer::NextFit(algorithm) => algorithm.place(core_map, 1),
            Placer::FirstFit(algorithm) => algorithm.place(core_map, 1),
        }?;
        Some(range.start)
    }
}

pub struct FramePool {
    core_map: Box<[CoreMapEntry]>,
    placer: Placer,
    frames_allocated: usize,
}

impl FramePool {
    pub fn new(frames: usize, placement: Placement) -> Self {
        let placer = match placement {
            Placement::NextFit => Placer::NextFit(NextFit::default()),
            Placement::FirstFit => Placer::FirstFit(FirstFit),
        };
        Self {
            core_map: vec![CoreMapEntry::default(); frames].into_boxed_slice(),
            placer,
            frames_allocated: 0,
        }
    }

    /// Hands out one free frame, or `None` if every frame is in use.
    pub fn alloc(&mut self) -> Option<FrameNumber> {
        if self.frames_allocated == self.core_map.len() {
            return None;
        }

        let index = self.placer.place_one(&self.core_map)?;
        assert!(!self.core_map[index].allocated());
        self.core_map[index] = self.core_map[index].with_allocated(true).with_pinned(false);
        self.frames_allocated += 1;

        Some(FrameNumber::new(index))
    }

    pub fn dealloc(&mut self, frame: FrameNumber) {
        let entry = &mut self.core_map[frame.index()];
        assert!(entry.allocated(), "double free of {frame:?}");
        *entry = entry.with_allocated(false).with_pinned(false);
        self.frames_allocated -= 1;
    }

    pub fn set_pinned(&mut self, frame: FrameNumber, pinned: bool) {
        let entry = &mut self.core_map[frame.index()];
        debug_assert!(entry.allocated());
        *entry = entry.with_pinned(pinned);
    }

    pub fn is_pinned(&self, frame: FrameNumber) -> bool {
        self.core_map[frame.index()].pinned()
    }

    pub fn is_allocated(&self, frame: FrameNumber) -> bool {
        self.core_map[frame.index()].allocated()
    }

    pub fn capacity(&self) -> usize {
        self.core_map.len()
    }

    pub fn allocated(&self) -> usize {
        self.frames_allocated
    }

    pub fn has_room(&self) -> bool {
        self.frames_allocated < self.core_map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_until_exhausted() {
        let mut pool = FramePool::new(3, Placement::FirstFit);
        let frames: alloc::vec::Vec<_> = (0..3).map(|_| pool.alloc().unwrap()).collect();
        assert_eq!(
            frames,
            [FrameNumber::new(0), FrameNumber::new(1), FrameNumber::new(2)]
        );
        assert!(!pool.has_room());
        assert_eq!(pool.alloc(), None);

        pool.dealloc(FrameNumber::new(1));
        assert_eq!(pool.allocated(), 2);
        assert_eq!(pool.alloc(), Some(FrameNumber::new(1)));
    }

    #[test]
    fn next_fit_rotates_through_pool() {
        let mut pool = FramePool::new(3, Placement::NextFit);
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        pool.dealloc(a);
        // Next fit keeps moving forward before reusing the hole at 0.
        assert_eq!(pool.alloc(), Some(FrameNumber::new(2)));
        assert_eq!(pool.alloc(), Some(a));
        assert!(pool.is_allocated(b));
    }

    #[test]
    fn pin_is_cleared_on_free() {
        let mut pool = FramePool::new(1, Placement::NextFit);
        let frame = pool.alloc().unwrap();
        pool.set_pinned(frame, true);
        assert!(pool.is_pinned(frame));
        pool.dealloc(frame);
        let frame = pool.alloc().unwrap();
        assert!(!pool.is_pinned(frame));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut pool = FramePool::new(1, Placement::NextFit);
        let frame = pool.alloc().unwrap();
        pool.dealloc(frame);
        pool.dealloc(frame);
    }
}
