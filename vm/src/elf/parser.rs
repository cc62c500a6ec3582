//! ELF parsing for statically linked 32-bit big-endian MIPS executables.
//!
//! Only section headers are consulted: every section with the ALLOC flag is
//! part of the initial memory image, `SHT_NOBITS` sections (`.bss`) being
//! zero-filled. A `.dynamic` section means the program expects a dynamic
//! loader, which is not provided.

use elf::{
    abi,
    endian::AnyEndian,
    file::{Class, FileHeader},
    section::SectionHeader,
    ElfBytes,
};
use mipsemu_common::constants::DATA_BASE;

use super::{
    error::{ParserError, Result},
    symbols::{Symbol, SymbolTable},
};

/// A section copied into guest memory at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadableSection {
    pub name: String,
    pub address: u32,
    pub data: Vec<u8>,
}

pub struct ParsedElfData {
    pub sections: Vec<LoadableSection>,
    /// Highest byte of the data segment, or of the whole image when the
    /// program has no data section.
    pub data_top: u32,
    pub text_size: u32,
}

/// Validates the ELF file header.
///
/// This function checks the following conditions:
/// 1. The ELF file is 32-bit.
/// 2. The data encoding is big-endian.
/// 3. The target architecture is MIPS.
/// 4. The file is an executable.
pub fn validate_elf_header(header: &FileHeader<AnyEndian>) -> Result<()> {
    if header.class != Class::ELF32 {
        return Err(ParserError::Not32Bit);
    }

    if header.endianness != AnyEndian::Big {
        return Err(ParserError::NotBigEndian);
    }

    if header.e_machine != abi::EM_MIPS {
        return Err(ParserError::NotMips);
    }

    if header.e_type != abi::ET_EXEC {
        return Err(ParserError::NotExecutable);
    }

    Ok(())
}

fn section_range(name: &str, header: &SectionHeader) -> Result<(u32, u32)> {
    let invalid = || ParserError::InvalidSection(name.to_string(), header.sh_addr);
    let address: u32 = header.sh_addr.try_into().map_err(|_| invalid())?;
    let size: u32 = header.sh_size.try_into().map_err(|_| invalid())?;
    address.checked_add(size).ok_or_else(invalid)?;
    Ok((address, size))
}

/// Collects the loadable sections and the segment bounds derived from them.
pub fn parse_sections(elf: &ElfBytes<AnyEndian>) -> Result<ParsedElfData> {
    let (section_headers, string_table) = elf.section_headers_with_strtab()?;
    let section_headers = section_headers.ok_or(ParserError::NoSectionHeader)?;
    let string_table = string_table.ok_or(ParserError::NoStringTable)?;

    let mut sections = Vec::new();
    let mut data_top = 0;
    let mut image_top = 0;
    let mut text_size = 0;

    for header in section_headers.iter() {
        let name = string_table.get(header.sh_name as usize)?;
        if name == ".dynamic" {
            return Err(ParserError::DynamicallyLinked);
        }
        if header.sh_flags & abi::SHF_ALLOC as u64 == 0 {
            continue;
        }

        let (address, size) = section_range(name, &header)?;
        tracing::debug!("section '{name}'; addr=0x{address:08x}; size={size}");

        let data = if header.sh_type == abi::SHT_NOBITS {
            vec![0; size as usize]
        } else {
            let (data, _) = elf.section_data(&header)?;
            data.to_vec()
        };

        if size > 0 {
            let last = address + size - 1;
            image_top = image_top.max(last);
            if address >= DATA_BASE {
                data_top = data_top.max(last);
            }
        }
        if name == ".text" {
            text_size = size;
        }

        sections.push(LoadableSection {
            name: name.to_string(),
            address,
            data,
        });
    }

    Ok(ParsedElfData {
        sections,
        data_top: if data_top == 0 { image_top } else { data_top },
        text_size,
    })
}

/// Reads `.symtab`, keeping function and object symbols.
pub fn parse_symbols(elf: &ElfBytes<AnyEndian>) -> Result<SymbolTable> {
    let Some((symtab, strtab)) = elf.symbol_table()? else {
        return Ok(SymbolTable::default());
    };

    let mut symbols = Vec::new();
    for symbol in symtab.iter() {
        if matches!(symbol.st_symtype(), abi::STT_SECTION | abi::STT_FILE) {
            continue;
        }
        let name = strtab.get(symbol.st_name as usize)?;
        if name.is_empty() {
            continue;
        }
        symbols.push(Symbol {
            name: name.to_string(),
            address: symbol.st_value as u32,
            function: symbol.st_symtype() == abi::STT_FUNC,
            global: symbol.st_bind() == abi::STB_GLOBAL,
        });
    }
    tracing::debug!("{} symbols read from symbol table", symbols.len());

    Ok(SymbolTable::new(symbols))
}
