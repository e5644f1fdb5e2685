use alloc::{vec, vec::Vec};

/// Occupancy of the swap slots, one bit per slot (set = free).
///
/// Groups of 64 slots with at least one free bit are kept on a queue, so both
/// allocating and freeing a slot take *O(1)* time.
#[derive(Debug, Clone)]
pub struct SlotBitmap {
    bitmap: Vec<u64>,
    queue: Vec<u32>,
    count: u32,
    used: u32,
}

impl SlotBitmap {
    /// Create a bitmap of `count` slots, all free.
    pub fn new_all_free(count: u32) -> Self {
        let group_count = count.div_ceil(64);
        let mut bitmap = vec![u64::MAX; group_count as usize];
        if count % 64 != 0 {
            if let Some(last) = bitmap.last_mut() {
                *last = (1 << (count % 64)) - 1;
            }
        }
        // Lowest groups are popped first.
        let queue = (0..group_count).rev().collect();
        Self {
            bitmap,
            queue,
            count,
            used: 0,
        }
    }

    /// Claim the lowest free slot of some non-full group.
    ///
    /// Returns `None` if every slot is in use.
    pub fn allocate(&mut self) -> Option<u32> {
        let group_index = self.queue.pop()?;
        let group = &mut self.bitmap[group_index as usize];
        debug_assert_ne!(*group, 0, "SlotBitmap consistency error");
        let index_in_group = group.trailing_zeros();
        *group &= !(1 << index_in_group);
        if *group != 0 {
            self.queue.push(group_index);
        }
        self.used += 1;
        Some(group_index * 64 + index_in_group)
    }

    /// Return a slot to the free set.
    ///
    /// Panics if the slot is out of range or already free.
    pub fn free(&mut self, index: u32) {
        assert!(index < self.count, "swap slot {index} out of range");
        let group_index = index / 64;
        let index_in_group = index % 64;
        let group = &mut self.bitmap[group_index as usize];
        assert!(
            (*group & (1 << index_in_group)) == 0,
            "swap slot {index} freed twice"
        );
        let add = *group == 0;
        *group |= 1 << index_in_group;
        if add {
            self.queue.push(group_index);
        }
        self.used -= 1;
    }

    pub fn is_free(&self, index: u32) -> bool {
        index < self.count && self.bitmap[(index / 64) as usize] & (1 << (index % 64)) != 0
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_every_slot_once() {
        let mut slots = SlotBitmap::new_all_free(70);
        let mut seen = std::collections::BTreeSet::new();
        while let Some(slot) = slots.allocate() {
            assert!(slot < 70);
            assert!(seen.insert(slot), "slot {slot} handed out twice");
        }
        assert_eq!(seen.len(), 70);
        assert_eq!(slots.used(), 70);
        assert_eq!(slots.allocate(), None);
    }

    #[test]
    fn starts_from_lowest_slot() {
        let mut slots = SlotBitmap::new_all_free(130);
        assert_eq!(slots.allocate(), Some(0));
        assert_eq!(slots.allocate(), Some(1));
    }

    #[test]
    fn freed_slot_is_reused() {
        let mut slots = SlotBitmap::new_all_free(2);
        assert_eq!(slots.allocate(), Some(0));
        assert_eq!(slots.allocate(), Some(1));
        slots.free(0);
        assert!(slots.is_free(0));
        assert!(!slots.is_free(1));
        assert_eq!(slots.used(), 1);
        assert_eq!(slots.allocate(), Some(0));
    }

    #[test]
    fn empty_bitmap_has_no_slots() {
        let mut slots = SlotBitmap::new_all_free(0);
        assert!(slots.is_empty());
        assert_eq!(slots.allocate(), None);
        assert!(!slots.is_free(0));
    }

    #[test]
    #[should_panic(expected = "freed twice")]
    fn double_free_panics() {
        let mut slots = SlotBitmap::new_all_free(4);
        let slot = slots.allocate().unwrap();
        slots.free(slot);
        slots.free(slot);
    }
}
