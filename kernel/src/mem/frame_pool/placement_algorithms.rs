//! Frame placement policies for the user pool.

use super::CoreMapEntry;
use core::ops::Range;

/// A placement algorithm for allocating frames.
pub trait PlacementAlgorithm {
    /// Returns the range of frame numbers to hand out, or `None` if no run of
    /// `frames_requested` free frames exists.
    fn place(&mut self, core_map: &[CoreMapEntry], frames_requested: usize) -> Option<Range<usize>>;
}

/// Resume the search where the previous one stopped. Spreads allocations over the
/// pool so the clock hand sees frames in roughly allocation order.
#[derive(Default)]
pub struct NextFit {
    /// The next frame number to start searching for free frames.
    position: usize,
}

#[derive(Default)]
pub struct FirstFit;

/// Counts free frames starting at `start`, stopping at `limit`.
fn free_run(core_map: &[CoreMapEntry], start: usize, limit: usize) -> usize {
    core_map[start..]
        .iter()
        .take(limit)
        .take_while(|entry| !entry.allocated())
        .count()
}

impl PlacementAlgorithm for NextFit {
    fn place(&mut self, core_map: &[CoreMapEntry], frames_requested: usize) -> Option<Range<usize>> {
        let total_frames = core_map.len();
        if frames_requested == 0 || frames_requested > total_frames {
            return None;
        }

        let mut start = self.position % total_frames;
        let mut wrapped_around = false;

        while !(wrapped_around && start >= self.position) {
            if start + frames_requested > total_frames {
                // Never wrap twice, otherwise a request that fits nowhere would
                // loop forever without `start` reaching `self.position` again.
                if wrapped_around {
                    break;
                }
                start = 0;
                wrapped_around = true;
                continue;
            }

            let run = free_run(core_map, start, frames_requested);
            if run == frames_requested {
                self.position = (start + run) % total_frames;
                return Some(start..start + run);
            }
            start += run + 1;
        }

        None
    }
}

impl PlacementAlgorithm for FirstFit {
    fn place(&mut self, core_map: &[CoreMapEntry], frames_requested: usize) -> Option<Range<usize>> {
        if frames_requested == 0 {
            return None;
        }
        let mut start = 0;
        while start + frames_requested <= core_map.len() {
            let run = free_run(core_map, start, frames_requested);
            if run == frames_requested {
                return Some(start..start + run);
            }
            start += run + 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fills the coremap entries in `range` to indicate they are allocated.
    fn fill_coremap_range(core_map: &mut [CoreMapEntry], range: &Range<usize>) {
        for i in range.clone() {
            assert!(!core_map[i].allocated());
            core_map[i] = core_map[i].with_allocated(true);
        }
    }

    #[test]
    fn test_next_fit() {
        let mut core_map = [CoreMapEntry::default(); 16];
        fill_coremap_range(&mut core_map, &(1..4));
        fill_coremap_range(&mut core_map, &(8..12));
        fill_coremap_range(&mut core_map, &(14..16));

        // Frames left are 0, 4-7, 12-13 (inclusive)

        let mut algorithm = NextFit::default();
        assert_eq!(algorithm.place(&core_map, 4), Some(4..8));
        fill_coremap_range(&mut core_map, &(4..8));

        // Next allocation should start from position 8
        assert_eq!(algorithm.place(&core_map, 1), Some(12..13));
        fill_coremap_range(&mut core_map, &(12..13));

        assert_eq!(algorithm.place(&core_map, 2), None);
        // Single frames wrap around to the hole at 0.
        assert_eq!(algorithm.place(&core_map, 1), Some(13..14));
        fill_coremap_range(&mut core_map, &(13..14));
        assert_eq!(algorithm.place(&core_map, 1), Some(0..1));
    }

    #[test]
    fn test_next_fit_wrap_around() {
        let mut core_map = [CoreMapEntry::default(); 16];
        let mut algorithm = NextFit { position: 8 };
        fill_coremap_range(&mut core_map, &(0..1));
        assert_eq!(algorithm.place(&core_map, 16), None);
        assert_eq!(algorithm.place(&core_map, 15), Some(1..16));
    }

    #[test]
    fn test_first_fit() {
        let mut core_map = [CoreMapEntry::default(); 16];
        fill_coremap_range(&mut core_map, &(2..4));
        fill_coremap_range(&mut core_map, &(8..13));
        fill_coremap_range(&mut core_map, &(15..16));

        // Frames left are 0-1, 4-7, 13-14 (inclusive)

        let mut algorithm = FirstFit;
        assert_eq!(algorithm.place(&core_map, 4), Some(4..8));
        fill_coremap_range(&mut core_map, &(4..8));

        // If we want 2 frames, the algo should pick first fit, i.e. 0-1
        assert_eq!(algorithm.place(&core_map, 2), Some(0..2));
        fill_coremap_range(&mut core_map, &(0..2));

        assert_eq!(algorithm.place(&core_map, 3), None);
    }

    #[test]
    fn empty_requests_never_place() {
        let core_map = [CoreMapEntry::default(); 4];
        assert_eq!(NextFit::default().place(&core_map, 0), None);
        assert_eq!(FirstFit.place(&core_map, 0), None);
    }
}
