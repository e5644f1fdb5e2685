//! Supplemental page table: per-address-space page metadata keyed by page address.

use super::page::Spte;
use super::VmError;
use crate::fs::FileRef;
use alloc::collections::BTreeMap;
use core::fmt;

/// Handle to a memory-mapped file, unique within its address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MapId(u32);

impl MapId {
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

/// A live memory mapping: `pages` consecutive pages starting at `upage`.
#[derive(Clone)]
pub struct Mapping {
    pub file: FileRef,
    pub upage: usize,
    pub pages: usize,
}

#[derive(Default)]
pub struct SupplementalPageTable {
    entries: BTreeMap<usize, Spte>,
    mappings: BTreeMap<MapId, Mapping>,
    next_map_id: u32,
    destroyed: bool,
}

impl SupplementalPageTable {
    pub fn get(&self, upage: usize) -> Option<&Spte> {
        self.entries.get(&upage)
    }

    pub fn get_mut(&mut self, upage: usize) -> Option<&mut Spte> {
        self.entries.get_mut(&upage)
    }

    pub fn contains(&self, upage: usize) -> bool {
        self.entries.contains_key(&upage)
    }

    pub fn insert(&mut self, spte: Spte) -> Result<(), VmError> {
        if self.destroyed {
            return Err(VmError::Destroyed);
        }
        if self.entries.contains_key(&spte.upage) {
            return Err(VmError::AlreadyRegistered);
        }
        self.entries.insert(spte.upage, spte);
        Ok(())
    }

    pub fn remove(&mut self, upage: usize) -> Option<Spte> {
        self.entries.remove(&upage)
    }

    /// Entry for a resident page about to be evicted, created as anonymous if the page never
    /// had one. `None` once the table is destroyed.
    pub fn get_or_insert_anonymous(&mut self, upage: usize) -> Option<&mut Spte> {
        if self.destroyed {
            return None;
        }
        Some(
            self.entries
                .entry(upage)
                .or_insert_with(|| Spte::anonymous(upage)),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Spte> {
        self.entries.values()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Refuse further entries and hand back everything that was registered.
    pub(super) fn destroy(&mut self) -> BTreeMap<usize, Spte> {
        self.destroyed = true;
        self.mappings.clear();
        core::mem::take(&mut self.entries)
    }

    pub(super) fn add_mapping(&mut self, mapping: Mapping) -> MapId {
        let id = MapId(self.next_map_id);
        self.next_map_id += 1;
        self.mappings.insert(id, mapping);
        id
    }

    pub(super) fn take_mapping(&mut self, id: MapId) -> Option<Mapping> {
        self.mappings.remove(&id)
    }

    pub(super) fn mapping_ids(&self) -> impl Iterator<Item = MapId> + '_ {
        self.mappings.keys().copied()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_refused() {
        let mut spt = SupplementalPageTable::default();
        assert_eq!(spt.insert(Spte::anonymous(0x1000)), Ok(()));
        assert_eq!(
            spt.insert(Spte::anonymous(0x1000)),
            Err(VmError::AlreadyRegistered)
        );
        assert_eq!(spt.len(), 1);
    }

    #[test]
    fn destroyed_table_takes_nothing() {
        let mut spt = SupplementalPageTable::default();
        spt.insert(Spte::anonymous(0x1000)).unwrap();
        let entries = spt.destroy();
        assert_eq!(entries.len(), 1);
        assert!(spt.is_empty());
        assert_eq!(spt.insert(Spte::anonymous(0x2000)), Err(VmError::Destroyed));
        assert!(spt.get_or_insert_anonymous(0x2000).is_none());
        assert!(spt.destroy().is_empty());
    }

    #[test]
    fn lazily_created_entry_is_anonymous() {
        let mut spt = SupplementalPageTable::default();
        let spte = spt.get_or_insert_anonymous(0x3000).unwrap();
        spte.evicting = true;
        assert!(!spt.get(0x3000).unwrap().is_file_backed());
        assert!(spt.get(0x3000).unwrap().evicting);
    }
}
