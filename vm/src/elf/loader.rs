//! Loading of statically linked big-endian MIPS executables.
//!
//! `ElfFile` is the host-side view of the program: where each section goes
//! in guest memory, the entry point, the data segment bounds and the symbol
//! table. Copying it into a context's memory is done by the process image.

use std::path::Path;

use elf::{endian::AnyEndian, ElfBytes};

use super::{
    error::ParserError,
    parser::{self, LoadableSection, ParsedElfData},
    symbols::SymbolTable,
};
use crate::error::VMError;

#[derive(Debug, Clone, Default)]
pub struct ElfFile {
    /// The entrypoint of the program.
    pub entry: u32,

    /// Every allocated section, `.bss` zero-filled.
    pub sections: Vec<LoadableSection>,

    /// Highest byte of the data segment.
    pub data_top: u32,

    /// Size of `.text`, 0 when absent.
    pub text_size: u32,

    pub symbols: SymbolTable,
}

impl ElfFile {
    pub fn from_bytes(data: &[u8]) -> Result<Self, VMError> {
        let elf = ElfBytes::<AnyEndian>::minimal_parse(data).map_err(Into::<ParserError>::into)?;

        parser::validate_elf_header(&elf.ehdr)?;

        let entry = elf
            .ehdr
            .e_entry
            .try_into()
            .map_err(|_| ParserError::InvalidEntryPointOffset)?;

        let ParsedElfData {
            sections,
            data_top,
            text_size,
        } = parser::parse_sections(&elf)?;
        let symbols = parser::parse_symbols(&elf)?;

        Ok(ElfFile {
            entry,
            sections,
            data_top,
            text_size,
            symbols,
        })
    }

    pub fn from_path<P: AsRef<Path> + ?Sized>(path: &P) -> Result<Self, VMError> {
        let data = std::fs::read(path).map_err(Into::<ParserError>::into)?;
        Self::from_bytes(&data)
    }
}
