use crate::constants::PAGE_SIZE;

/// Address arithmetic helpers for power-of-two boundaries.
pub trait Alignable: Sized {
    /// Whether `self` is a multiple of `size`, which must be a power of two.
    fn is_aligned_to(self, size: u32) -> bool;

    fn align_down(self, size: u32) -> Self;

    /// Rounds up to the next multiple of `size`, wrapping at the top of the address space.
    fn align_up(self, size: u32) -> Self;

    fn is_page_aligned(self) -> bool {
        self.is_aligned_to(PAGE_SIZE)
    }

    fn page_align_up(self) -> Self {
        self.align_up(PAGE_SIZE)
    }
}

impl Alignable for u32 {
    fn is_aligned_to(self, size: u32) -> bool {
        self & (size - 1) == 0
    }

    fn align_down(self, size: u32) -> Self {
        self & !(size - 1)
    }

    fn align_up(self, size: u32) -> Self {
        self.wrapping_add(size - 1) & !(size - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        assert!(0x1000u32.is_page_aligned());
        assert!(!0x1004u32.is_page_aligned());
        assert!(0x1004u32.is_aligned_to(4));
        assert!(!0x1006u32.is_aligned_to(4));

        assert_eq!(0x1234u32.align_down(0x100), 0x1200);
        assert_eq!(0x1234u32.align_up(0x100), 0x1300);
        assert_eq!(0x1200u32.align_up(0x100), 0x1200);
        assert_eq!(0x1001u32.page_align_up(), 0x2000);
    }
}
