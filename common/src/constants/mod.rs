pub const NUM_REGISTERS: usize = 32;
pub const WORD_SIZE: usize = 4;

/// Base of the text segment of statically linked executables.
pub const TEXT_BASE: u32 = 0x0040_0000;
/// Sections at or above this address count towards the data segment.
pub const DATA_BASE: u32 = 0x1000_0000;
/// Top of the guest stack; the environment area lives right below it.
pub const STACK_BASE: u32 = 0x7fff_c000;
/// Size of the environment area holding argv/envp and their strings.
pub const MAX_ENVIRON: u32 = 16 * 1024;

pub const PAGE_SIZE_LOG2: u32 = 12;
pub const PAGE_SIZE: u32 = 1 << PAGE_SIZE_LOG2;

pub const SPEC_BLOCK_SIZE_LOG2: u32 = 8;
pub const SPEC_BLOCK_SIZE: u32 = 1 << SPEC_BLOCK_SIZE_LOG2;

/// o32 syscall numbers are offset by this base.
pub const SYSCALL_BASE: u32 = 4000;

/// Return address planted in `ra` while a guest signal handler runs.
pub const SIGNAL_RETURN_ADDRESS: u32 = 0xffff_ffff;
pub const MAX_SIGNAL: u32 = 64;
