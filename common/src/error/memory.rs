use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MemoryError {
    // Size is not a power of two, or the address is not aligned to it
    #[error("Unaligned memory access: address=0x{0:08X}, size={1}")]
    UnalignedAccess(u32, usize),

    // Page exists without read permission
    #[error("Memory read protection fault: 0x{0:08X}")]
    ReadProtection(u32),

    // Page exists without write permission
    #[error("Memory write protection fault: 0x{0:08X}")]
    WriteProtection(u32),

    // Protect/map/unmap requests must cover whole pages
    #[error("Unaligned page range: address=0x{0:08X}, size=0x{1:X}")]
    UnalignedPageRange(u32, u32),

    #[error("Page range past the end of the address space: address=0x{0:08X}, size=0x{1:X}")]
    PageRangeOverflow(u32, u32),

    #[error("Cannot change the address space while speculative")]
    SpeculativeMapping,

    // No free region of the requested size before the address space wraps
    #[error("Address space exhausted while mapping 0x{0:X} bytes")]
    AddressSpaceExhausted(u32),
}
