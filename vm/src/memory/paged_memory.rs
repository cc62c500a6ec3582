//! Paged guest address space with a speculative overlay.
//!
//! Pages are allocated on first touch and keyed by page tag. Several
//! `Memory` instances may alias one page table (threads created with
//! `CLONE_VM`); the table lives as long as its last user.
//!
//! While speculative, every access is redirected to private 256-byte blocks
//! that are seeded from the real pages on first touch. Leaving speculative
//! mode drops the blocks, so the real pages never observe wrong-path stores.

use std::{cell::RefCell, cmp, rc::Rc};

use mipsemu_common::{
    constants::{PAGE_SIZE, PAGE_SIZE_LOG2, SPEC_BLOCK_SIZE, SPEC_BLOCK_SIZE_LOG2},
    error::MemoryError,
    memory::{Alignable, MemoryProcessor},
};
use rustc_hash::FxHashMap;
use tracing::trace;

use super::page::{page_base, page_offset, page_tag, Page, Protection, MAX_PAGE_TAG};

const SPEC_BLOCK_BYTES: usize = SPEC_BLOCK_SIZE as usize;

#[derive(Debug, Default, Clone)]
struct PageTable {
    pages: FxHashMap<u32, Box<Page>>,
}

impl PageTable {
    /// Page holding `tag`, created read/write when missing.
    fn get_or_create(&mut self, tag: u32) -> &mut Page {
        self.pages
            .entry(tag)
            .or_insert_with(|| Box::new(Page::new(Protection::READ_WRITE)))
    }
}

#[derive(Debug)]
struct SpecBlock {
    data: [u8; SPEC_BLOCK_BYTES],
}

#[derive(Debug)]
pub struct Memory {
    pages: Rc<RefCell<PageTable>>,

    /// Overlay blocks keyed by `address >> SPEC_BLOCK_SIZE_LOG2`.
    speculative: FxHashMap<u32, Box<SpecBlock>>,

    /// Blocks released by `recover`, reused by the next episode.
    free_blocks: Vec<Box<SpecBlock>>,

    spec_mode: bool,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    /// Create an empty address space.
    pub fn new() -> Self {
        Self {
            pages: Rc::new(RefCell::new(PageTable::default())),
            speculative: FxHashMap::default(),
            free_blocks: Vec::new(),
            spec_mode: false,
        }
    }

    /// Create an address space, aliasing the page table of `share` if given.
    pub fn create(share: Option<&Memory>) -> Self {
        match share {
            Some(other) => Self {
                pages: Rc::clone(&other.pages),
                ..Self::new()
            },
            None => Self::new(),
        }
    }

    /// Private deep copy of the current pages.
    pub fn fork(&self) -> Self {
        Self {
            pages: Rc::new(RefCell::new(self.pages.borrow().clone())),
            ..Self::new()
        }
    }

    /// Whether `self` and `other` alias the same page table.
    pub fn shares_pages_with(&self, other: &Memory) -> bool {
        Rc::ptr_eq(&self.pages, &other.pages)
    }

    /// Number of `Memory` instances using this page table.
    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.pages)
    }

    pub fn page_count(&self) -> usize {
        self.pages.borrow().pages.len()
    }

    pub fn protection(&self, address: u32) -> Option<Protection> {
        self.pages
            .borrow()
            .pages
            .get(&page_tag(address))
            .map(|page| page.protection())
    }

    fn check_page_range(address: u32, size: u32) -> Result<(), MemoryError> {
        if !address.is_page_aligned() || !size.is_page_aligned() {
            return Err(MemoryError::UnalignedPageRange(address, size));
        }
        if address as u64 + size as u64 > 1 << 32 {
            return Err(MemoryError::PageRangeOverflow(address, size));
        }
        Ok(())
    }

    fn tag_range(address: u32, size: u32) -> std::ops::RangeInclusive<u32> {
        page_tag(address)..=page_tag(address.wrapping_add(size - 1))
    }

    /// Set the protection of every page in `[address, address + size)`,
    /// creating the missing ones.
    pub fn protect(&mut self, address: u32, size: u32, prot: Protection) -> Result<(), MemoryError> {
        Self::check_page_range(address, size)?;
        if size == 0 {
            return Ok(());
        }

        let mut table = self.pages.borrow_mut();
        for tag in Self::tag_range(address, size) {
            table
                .pages
                .entry(tag)
                .or_insert_with(|| Box::new(Page::new(prot)))
                .prot = prot;
        }
        Ok(())
    }

    /// Allocate `size` bytes of fresh pages in the first free region at or
    /// above `hint`, probing forward page by page. The null page is never
    /// handed out.
    pub fn map(&mut self, hint: u32, size: u32, prot: Protection) -> Result<u32, MemoryError> {
        if self.spec_mode {
            return Err(MemoryError::SpeculativeMapping);
        }
        Self::check_page_range(hint, size)?;
        if size == 0 {
            return Err(MemoryError::UnalignedPageRange(hint, size));
        }

        let page_count = size >> PAGE_SIZE_LOG2;
        let mut table = self.pages.borrow_mut();

        let mut start = cmp::max(page_tag(hint), 1);
        let mut end = start;
        loop {
            if end > MAX_PAGE_TAG {
                return Err(MemoryError::AddressSpaceExhausted(size));
            }
            if table.pages.contains_key(&end) {
                end += 1;
                start = end;
                continue;
            }
            if end - start + 1 == page_count {
                break;
            }
            end += 1;
        }

        for tag in start..=end {
            table.pages.insert(tag, Box::new(Page::new(prot)));
        }

        let base = page_base(start);
        trace!("mapped 0x{size:x} bytes at 0x{base:08x}");
        Ok(base)
    }

    /// Move a mapping to a fresh region of `new_size` bytes, keeping the
    /// first `min(old_size, new_size)` bytes of its contents.
    pub fn remap(&mut self, old_address: u32, old_size: u32, new_size: u32) -> Result<u32, MemoryError> {
        if self.spec_mode {
            return Err(MemoryError::SpeculativeMapping);
        }
        Self::check_page_range(old_address, old_size)?;
        Self::check_page_range(old_address, new_size)?;

        let prot = self.protection(old_address).unwrap_or(Protection::READ_WRITE);
        let start = self.map(0, new_size, prot)?;

        {
            let mut table = self.pages.borrow_mut();
            let copied = cmp::min(old_size, new_size) / PAGE_SIZE;
            for i in 0..copied {
                let source = page_tag(old_address) + i;
                let data = table.pages.get(&source).map(|page| page.data);
                if let Some(data) = data {
                    table.get_or_create(page_tag(start) + i).data = data;
                }
            }
        }

        self.unmap(old_address, old_size)?;
        Ok(start)
    }

    /// Release every page covering `[address, address + size)`.
    pub fn unmap(&mut self, address: u32, size: u32) -> Result<(), MemoryError> {
        if self.spec_mode {
            return Err(MemoryError::SpeculativeMapping);
        }
        Self::check_page_range(address, size)?;
        if size == 0 {
            return Ok(());
        }

        let mut table = self.pages.borrow_mut();
        for tag in Self::tag_range(address, size) {
            table.pages.remove(&tag);
        }
        Ok(())
    }

    pub fn start_speculative(&mut self) {
        self.spec_mode = true;
    }

    /// Drop every overlay block and leave speculative mode.
    pub fn recover(&mut self) {
        self.free_blocks
            .extend(self.speculative.drain().map(|(_, block)| block));
        self.spec_mode = false;
    }

    pub fn is_speculative(&self) -> bool {
        self.spec_mode
    }

    /// Overlay block for `address`, seeded from the real page on first touch.
    fn spec_block(&mut self, address: u32) -> &mut SpecBlock {
        let tag = address >> SPEC_BLOCK_SIZE_LOG2;
        let pages = &self.pages;
        let free_blocks = &mut self.free_blocks;

        self.speculative.entry(tag).or_insert_with(|| {
            let mut block = free_blocks.pop().unwrap_or_else(|| {
                Box::new(SpecBlock {
                    data: [0; SPEC_BLOCK_BYTES],
                })
            });

            let base = tag << SPEC_BLOCK_SIZE_LOG2;
            match pages.borrow().pages.get(&page_tag(base)) {
                Some(page) if page.prot.contains(Protection::READ) => block
                    .data
                    .copy_from_slice(page.bytes(page_offset(base), SPEC_BLOCK_BYTES)),
                _ => block.data.fill(0),
            }
            block
        })
    }

    /// Size must be a power of two no larger than a block, naturally aligned.
    fn spec_access_allowed(address: u32, size: usize) -> bool {
        size.is_power_of_two() && size <= SPEC_BLOCK_BYTES && address as usize & (size - 1) == 0
    }

    fn check_alignment(address: u32, size: usize) -> Result<(), MemoryError> {
        if !size.is_power_of_two()
            || size > PAGE_SIZE as usize
            || address as usize & (size - 1) != 0
        {
            return Err(MemoryError::UnalignedAccess(address, size));
        }
        Ok(())
    }
}

impl MemoryProcessor for Memory {
    fn read_into(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let size = buf.len();

        if self.spec_mode {
            let offset = (address & (SPEC_BLOCK_SIZE - 1)) as usize;
            let block = self.spec_block(address);
            if Self::spec_access_allowed(address, size) {
                buf.copy_from_slice(&block.data[offset..offset + size]);
            }
            return Ok(());
        }

        Self::check_alignment(address, size)?;
        let mut table = self.pages.borrow_mut();
        let page = table.get_or_create(page_tag(address));
        if !page.prot.contains(Protection::READ) {
            return Err(MemoryError::ReadProtection(address));
        }
        buf.copy_from_slice(page.bytes(page_offset(address), size));
        Ok(())
    }

    fn write_from(&mut self, address: u32, buf: &[u8]) -> Result<(), MemoryError> {
        let size = buf.len();

        if self.spec_mode {
            let offset = (address & (SPEC_BLOCK_SIZE - 1)) as usize;
            let block = self.spec_block(address);
            if Self::spec_access_allowed(address, size) {
                block.data[offset..offset + size].copy_from_slice(buf);
            }
            return Ok(());
        }

        Self::check_alignment(address, size)?;
        let mut table = self.pages.borrow_mut();
        let page = table.get_or_create(page_tag(address));
        if !page.prot.contains(Protection::WRITE) {
            return Err(MemoryError::WriteProtection(address));
        }
        page.bytes_mut(page_offset(address), size)
            .copy_from_slice(buf);
        Ok(())
    }
}
