use crate::sizes::{KB, MB};

// Page size is 4KB. This is a property of x86 processors.
pub const PAGE_FRAME_SIZE: usize = 4 * KB;

// Any virtual address at or above OFFSET is a kernel address.
pub const OFFSET: usize = 0x80000000;

/// Top of user virtual memory. User stacks grow down from here.
pub const PHYS_BASE: usize = OFFSET;

/// Default upper bound on how far a user stack may grow below [`PHYS_BASE`].
pub const DEFAULT_MAX_STACK_SIZE: usize = 8 * MB;

/// Offset of `addr` within its page.
#[inline]
pub const fn pg_ofs(addr: usize) -> usize {
    addr & (PAGE_FRAME_SIZE - 1)
}

/// Virtual page number of `addr`.
#[inline]
pub const fn pg_no(addr: usize) -> usize {
    addr / PAGE_FRAME_SIZE
}

/// Round `addr` down to the start of its page.
#[inline]
pub const fn pg_round_down(addr: usize) -> usize {
    addr & !(PAGE_FRAME_SIZE - 1)
}

/// Round `addr` up to the next page boundary.
#[inline]
pub const fn pg_round_up(addr: usize) -> usize {
    pg_round_down(addr + PAGE_FRAME_SIZE - 1)
}

#[inline]
pub const fn is_user_vaddr(addr: usize) -> bool {
    addr < PHYS_BASE
}

#[inline]
pub const fn is_page_aligned(addr: usize) -> bool {
    pg_ofs(addr) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(pg_round_down(0x1234), 0x1000);
        assert_eq!(pg_round_up(0x1234), 0x2000);
        assert_eq!(pg_round_up(0x2000), 0x2000);
        assert_eq!(pg_ofs(0x1234), 0x234);
        assert_eq!(pg_no(0x5000), 5);
    }

    #[test]
    fn user_split() {
        assert!(is_user_vaddr(PHYS_BASE - 1));
        assert!(!is_user_vaddr(PHYS_BASE));
        assert!(is_page_aligned(PHYS_BASE - PAGE_FRAME_SIZE));
    }
}
