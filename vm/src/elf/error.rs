use thiserror::Error;

/// Reasons a guest executable cannot be loaded.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("not a 32-bit ELF file")]
    Not32Bit,

    #[error("not a big-endian ELF file")]
    NotBigEndian,

    #[error("not a MIPS ELF file")]
    NotMips,

    #[error("not an executable ELF file")]
    NotExecutable,

    /// A `.dynamic` section is present.
    #[error("dynamic linking not supported; compile with '-static'")]
    DynamicallyLinked,

    #[error("no section header")]
    NoSectionHeader,

    #[error("no string table")]
    NoStringTable,

    /// Section extends past the 32-bit address space.
    #[error("invalid section {0} at 0x{1:x}")]
    InvalidSection(String, u64),

    #[error("invalid entry point offset")]
    InvalidEntryPointOffset,

    #[error(transparent)]
    ELFError(#[from] elf::ParseError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

impl PartialEq for ParserError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ELFError(a), Self::ELFError(b)) => a.to_string() == b.to_string(),
            (Self::IOError(a), Self::IOError(b)) => a.kind() == b.kind(),
            (Self::InvalidSection(a, x), Self::InvalidSection(b, y)) => a == b && x == y,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

pub type Result<T, E = ParserError> = std::result::Result<T, E>;
