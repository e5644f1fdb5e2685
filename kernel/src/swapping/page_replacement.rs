//! Victim selection for a full frame pool.

/// The frame list as seen by a replacement policy. Indices follow the list's scan order.
pub trait ReplacementCandidates {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the frame at `index` may be evicted at all (bound to a page and not pinned).
    fn is_eligible(&self, index: usize) -> bool;

    /// Reads the frame's accessed bit and clears it, returning the old value.
    fn test_and_clear_accessed(&mut self, index: usize) -> bool;
}

pub trait PageReplacementPolicy {
    /// Index of the frame to evict, or `None` if no frame is eligible.
    fn select_victim(&mut self, frames: &mut dyn ReplacementCandidates) -> Option<usize>;

    /// The frame at `index` has been removed from the list; later frames shifted down by one.
    fn removed(&mut self, index: usize);
}

/// Second-chance clock over the frame list.
///
/// A frame whose accessed bit is set gets the bit cleared and is passed over once. The hand
/// sweeps at most two full turns; since the first turn clears every bit it skips, the second
/// one only comes back empty-handed if pages keep being touched while the hand moves, in which
/// case the first eligible frame seen is taken.
#[derive(Debug, Default)]
pub struct SecondChance {
    hand: usize,
}

impl SecondChance {
    pub fn hand(&self) -> usize {
        self.hand
    }
}

impl PageReplacementPolicy for SecondChance {
    fn select_victim(&mut self, frames: &mut dyn ReplacementCandidates) -> Option<usize> {
        let len = frames.len();
        if len == 0 {
            return None;
        }

        let mut fallback = None;
        for step in 0..2 * len {
            let index = (self.hand + step) % len;
            if !frames.is_eligible(index) {
                continue;
            }
            fallback.get_or_insert(index);
            if !frames.test_and_clear_accessed(index) {
                // The victim leaves the list, so the frame after it slides into `index`.
                self.hand = index;
                return Some(index);
            }
        }

        let victim = fallback?;
        self.hand = victim;
        Some(victim)
    }

    fn removed(&mut self, index: usize) {
        if index < self.hand {
            self.hand -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    struct Frames {
        eligible: Vec<bool>,
        accessed: Vec<bool>,
        cleared: Vec<usize>,
    }

    impl Frames {
        fn new(accessed: &[bool]) -> Self {
            Self {
                eligible: alloc::vec![true; accessed.len()],
                accessed: accessed.to_vec(),
                cleared: Vec::new(),
            }
        }

        fn remove(&mut self, index: usize, policy: &mut SecondChance) {
            self.eligible.remove(index);
            self.accessed.remove(index);
            policy.removed(index);
        }
    }

    impl ReplacementCandidates for Frames {
        fn len(&self) -> usize {
            self.eligible.len()
        }

        fn is_eligible(&self, index: usize) -> bool {
            self.eligible[index]
        }

        fn test_and_clear_accessed(&mut self, index: usize) -> bool {
            if self.accessed[index] {
                self.cleared.push(index);
            }
            core::mem::replace(&mut self.accessed[index], false)
        }
    }

    #[test]
    fn takes_first_unaccessed_frame() {
        let mut frames = Frames::new(&[true, true, false, true]);
        let mut policy = SecondChance::default();
        assert_eq!(policy.select_victim(&mut frames), Some(2));
        // Frames passed over lose their accessed bit, the rest keep it.
        assert_eq!(frames.cleared, [0, 1]);
        assert!(frames.accessed[3]);
    }

    #[test]
    fn all_accessed_picks_first_after_full_turn() {
        let mut frames = Frames::new(&[true, true, true]);
        let mut policy = SecondChance::default();
        assert_eq!(policy.select_victim(&mut frames), Some(0));
        assert_eq!(frames.cleared, [0, 1, 2]);
    }

    #[test]
    fn hand_resumes_after_victim() {
        let mut frames = Frames::new(&[false, false, false]);
        let mut policy = SecondChance::default();
        assert_eq!(policy.select_victim(&mut frames), Some(0));
        frames.remove(0, &mut policy);
        // What used to be frame 1 is now at index 0 and is next in line.
        assert_eq!(policy.hand(), 0);

        frames.eligible.push(true);
        frames.accessed.push(false);
        frames.accessed[0] = true;
        assert_eq!(policy.select_victim(&mut frames), Some(1));
    }

    #[test]
    fn removal_before_hand_shifts_it() {
        let mut frames = Frames::new(&[true, true, false, false]);
        let mut policy = SecondChance::default();
        assert_eq!(policy.select_victim(&mut frames), Some(2));
        frames.remove(0, &mut policy);
        assert_eq!(policy.hand(), 1);
    }

    #[test]
    fn skips_ineligible_frames() {
        let mut frames = Frames::new(&[true, false]);
        frames.eligible[0] = false;
        let mut policy = SecondChance::default();
        assert_eq!(policy.select_victim(&mut frames), Some(1));
        // Pinned frames keep their accessed bit.
        assert!(frames.accessed[0]);
        assert!(frames.cleared.is_empty());
    }

    #[test]
    fn nothing_eligible() {
        let mut frames = Frames::new(&[false, true]);
        frames.eligible.fill(false);
        let mut policy = SecondChance::default();
        assert_eq!(policy.select_victim(&mut frames), None);
        let mut empty = Frames::new(&[]);
        assert_eq!(policy.select_victim(&mut empty), None);
    }
}
