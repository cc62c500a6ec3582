mod page;
mod paged_memory;

pub use mipsemu_common::memory::{Alignable, MemAccessSize, MemoryProcessor};
pub use page::{page_base, page_offset, page_tag, Protection, PAGE_SIZE_BYTES};
pub use paged_memory::Memory;
