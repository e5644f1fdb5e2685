// https://wiki.osdev.org/Paging
// https://wiki.osdev.org/Exceptions#Page_Fault

// Avoids lots of warnings about casting usize to u32 which cannot result in
// truncation on a 32-bit platform, which is all we target on bare metal.
#![allow(clippy::cast_possible_truncation)]

use arbitrary_int::u20;
use bitbybit::bitfield;

/// Largest frame number a page table entry can hold.
pub const MAX_FRAME_NUMBER: usize = (1 << 20) - 1;

#[bitfield(u32, default = 0)]
pub struct PageTableEntry {
    #[bit(0, rw)]
    present: bool,
    #[bit(1, rw)]
    read_write: bool,
    #[bit(2, rw)]
    user_supervisor: bool,
    #[bit(3, rw)]
    write_through: bool,
    #[bit(4, rw)]
    cache_disable: bool,
    #[bit(5, rw)]
    accessed: bool,
    #[bit(6, rw)]
    dirty: bool,
    #[bit(7, rw)]
    page_attribute_table: bool,
    #[bit(8, rw)]
    global: bool,
    #[bits(12..=31, rw)]
    page_frame_address: u20,
}

impl PageTableEntry {
    /// A present user entry pointing at `frame`.
    pub fn user_mapping(frame: usize, writable: bool) -> Self {
        assert!(frame <= MAX_FRAME_NUMBER, "frame {frame} does not fit in a PTE");
        Self::DEFAULT
            .with_present(true)
            .with_user_supervisor(true)
            .with_read_write(writable)
            .with_page_frame_address(u20::new(frame as u32))
    }

    pub fn frame(&self) -> usize {
        self.page_frame_address().value() as usize
    }
}

/// Error code pushed by the CPU for a page fault exception.
#[bitfield(u32, default = 0)]
pub struct PageFaultErrorCode {
    /// Set for protection violations, clear for not-present pages.
    #[bit(0, rw)]
    present: bool,
    #[bit(1, rw)]
    write: bool,
    #[bit(2, rw)]
    user: bool,
}

impl PageFaultErrorCode {
    /// Not-present fault raised from user mode.
    pub fn user_not_present(write: bool) -> Self {
        Self::DEFAULT.with_user(true).with_write(write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_mapping_bits() {
        let pte = PageTableEntry::user_mapping(42, true);
        assert!(pte.present());
        assert!(pte.read_write());
        assert!(pte.user_supervisor());
        assert!(!pte.accessed());
        assert!(!pte.dirty());
        assert_eq!(pte.frame(), 42);
        assert_eq!(pte.raw_value() >> 12, 42);
    }

    #[test]
    fn fault_error_code() {
        let code = PageFaultErrorCode::new_with_raw_value(0b110);
        assert!(!code.present());
        assert!(code.write());
        assert!(code.user());
        assert_eq!(PageFaultErrorCode::user_not_present(true).raw_value(), 0b110);
    }
}
