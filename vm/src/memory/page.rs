use bitflags::bitflags;

use mipsemu_common::constants::{PAGE_SIZE, PAGE_SIZE_LOG2, SPEC_BLOCK_SIZE};

pub const PAGE_SIZE_BYTES: usize = PAGE_SIZE as usize;

/// Highest page tag of the 32-bit address space.
pub const MAX_PAGE_TAG: u32 = u32::MAX >> PAGE_SIZE_LOG2;

const _: () = {
    assert!(PAGE_SIZE_BYTES % SPEC_BLOCK_SIZE as usize == 0);
};

/// Calculate the page tag for a given address.
pub const fn page_tag(address: u32) -> u32 {
    address >> PAGE_SIZE_LOG2
}

/// Calculate the offset of an address within its page.
pub const fn page_offset(address: u32) -> usize {
    (address & (PAGE_SIZE - 1)) as usize
}

/// Base address of the page with the given tag.
pub const fn page_base(tag: u32) -> u32 {
    tag << PAGE_SIZE_LOG2
}

bitflags! {
    /// Page protection bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Protection: u8 {
        const READ = 1;
        const WRITE = 2;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl Protection {
    /// Translate guest `PROT_*` bits; execute permission is not modeled.
    pub const fn from_guest(prot: u32) -> Self {
        Self::from_bits_truncate((prot & 0x3) as u8)
    }
}

/// A 4 KiB page of guest memory.
#[derive(Debug, Clone)]
pub struct Page {
    pub(super) data: [u8; PAGE_SIZE_BYTES],
    pub(super) prot: Protection,
}

impl Page {
    pub fn new(prot: Protection) -> Self {
        Self {
            data: [0; PAGE_SIZE_BYTES],
            prot,
        }
    }

    pub fn protection(&self) -> Protection {
        self.prot
    }

    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.data[offset..offset + len]
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Protection::READ_WRITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_helpers() {
        assert_eq!(page_tag(0x1000_2345), 0x10002);
        assert_eq!(page_offset(0x1000_2345), 0x345);
        assert_eq!(page_base(0x10002), 0x1000_2000);
        assert_eq!(MAX_PAGE_TAG, 0xfffff);
    }

    #[test]
    fn test_protection() {
        assert!(Protection::READ_WRITE.contains(Protection::READ));
        assert!(!Protection::READ.contains(Protection::WRITE));
        assert_eq!(Protection::READ | Protection::WRITE, Protection::READ_WRITE);
        // PROT_READ | PROT_EXEC
        assert_eq!(Protection::from_guest(0x5), Protection::READ);
    }
}
