//! Minimal writer for big-endian MIPS ELF executables.
//!
//! Produces just enough of a file for [`super::ElfFile`] to load: a header,
//! the program sections, a symbol table and the section name table. Used to
//! run hand-assembled guest programs without a cross toolchain.

use elf::abi;

const EHDR_SIZE: usize = 52;
const SHDR_SIZE: usize = 40;
const SYM_SIZE: usize = 16;

struct Section {
    name: String,
    address: u32,
    data: Vec<u8>,
    kind: SectionKind,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Text,
    Data,
    Bss,
}

struct BuilderSymbol {
    name: String,
    address: u32,
    function: bool,
}

#[derive(Default)]
pub struct ElfBuilder {
    entry: u32,
    sections: Vec<Section>,
    symbols: Vec<BuilderSymbol>,
    dynamic: bool,
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn align(out: &mut Vec<u8>) {
    out.resize(out.len().next_multiple_of(4), 0);
}

/// Appends `name` to a string table and returns its offset.
fn intern(table: &mut Vec<u8>, name: &str) -> u32 {
    let offset = table.len() as u32;
    table.extend_from_slice(name.as_bytes());
    table.push(0);
    offset
}

impl ElfBuilder {
    pub fn new(entry: u32) -> Self {
        Self {
            entry,
            ..Default::default()
        }
    }

    /// `.text` holding `words` at `address`.
    pub fn text(mut self, address: u32, words: &[u32]) -> Self {
        let data = words.iter().flat_map(|word| word.to_be_bytes()).collect();
        self.sections.push(Section {
            name: ".text".into(),
            address,
            data,
            kind: SectionKind::Text,
        });
        self
    }

    pub fn data(mut self, address: u32, bytes: &[u8]) -> Self {
        self.sections.push(Section {
            name: ".data".into(),
            address,
            data: bytes.to_vec(),
            kind: SectionKind::Data,
        });
        self
    }

    pub fn bss(mut self, address: u32, size: u32) -> Self {
        self.sections.push(Section {
            name: ".bss".into(),
            address,
            data: vec![0; size as usize],
            kind: SectionKind::Bss,
        });
        self
    }

    pub fn symbol(mut self, name: &str, address: u32, function: bool) -> Self {
        self.symbols.push(BuilderSymbol {
            name: name.into(),
            address,
            function,
        });
        self
    }

    /// Adds an empty `.dynamic` section, as a dynamically linked program has.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = vec![0; EHDR_SIZE];
        let mut shstrtab = vec![0];
        // (name, type, flags, addr, offset, size, link, info, entsize)
        let mut headers: Vec<[u32; 9]> = vec![[0; 9]];

        for section in &self.sections {
            let name = intern(&mut shstrtab, &section.name);
            let offset = out.len() as u32;
            let (sh_type, flags) = match section.kind {
                SectionKind::Text => (abi::SHT_PROGBITS, abi::SHF_ALLOC | abi::SHF_EXECINSTR),
                SectionKind::Data => (abi::SHT_PROGBITS, abi::SHF_ALLOC | abi::SHF_WRITE),
                SectionKind::Bss => (abi::SHT_NOBITS, abi::SHF_ALLOC | abi::SHF_WRITE),
            };
            if section.kind != SectionKind::Bss {
                out.extend_from_slice(&section.data);
                align(&mut out);
            }
            headers.push([
                name,
                sh_type,
                flags as u32,
                section.address,
                offset,
                section.data.len() as u32,
                0,
                0,
                0,
            ]);
        }

        if self.dynamic {
            let name = intern(&mut shstrtab, ".dynamic");
            headers.push([name, abi::SHT_DYNAMIC, abi::SHF_ALLOC as u32, 0, out.len() as u32, 0, 0, 0, 0]);
        }

        // Symbol table, then its string table right after it
        let symtab_index = headers.len() as u32;
        let mut strtab = vec![0];
        let symtab_offset = out.len() as u32;
        out.extend_from_slice(&[0; SYM_SIZE]);
        for symbol in &self.symbols {
            let kind = if symbol.function { abi::STT_FUNC } else { abi::STT_OBJECT };
            push_u32(&mut out, intern(&mut strtab, &symbol.name));
            push_u32(&mut out, symbol.address);
            push_u32(&mut out, 0);
            out.push((abi::STB_GLOBAL << 4) | kind);
            out.push(0);
            push_u16(&mut out, abi::SHN_ABS);
        }
        let symtab_size = out.len() as u32 - symtab_offset;
        let name = intern(&mut shstrtab, ".symtab");
        headers.push([
            name,
            abi::SHT_SYMTAB,
            0,
            0,
            symtab_offset,
            symtab_size,
            symtab_index + 1,
            1,
            SYM_SIZE as u32,
        ]);

        let name = intern(&mut shstrtab, ".strtab");
        headers.push([name, abi::SHT_STRTAB, 0, 0, out.len() as u32, strtab.len() as u32, 0, 0, 0]);
        out.extend_from_slice(&strtab);
        align(&mut out);

        let shstrndx = headers.len() as u16;
        let name = intern(&mut shstrtab, ".shstrtab");
        headers.push([name, abi::SHT_STRTAB, 0, 0, out.len() as u32, shstrtab.len() as u32, 0, 0, 0]);
        out.extend_from_slice(&shstrtab);
        align(&mut out);

        let shoff = out.len() as u32;
        for [name, sh_type, flags, addr, offset, size, link, info, entsize] in &headers {
            for field in [*name, *sh_type, *flags, *addr, *offset, *size, *link, *info] {
                push_u32(&mut out, field);
            }
            push_u32(&mut out, 4);
            push_u32(&mut out, *entsize);
        }

        let mut header = Vec::with_capacity(EHDR_SIZE);
        header.extend_from_slice(&[0x7f, b'E', b'L', b'F', abi::ELFCLASS32, abi::ELFDATA2MSB, 1, 0]);
        header.extend_from_slice(&[0; 8]);
        push_u16(&mut header, abi::ET_EXEC);
        push_u16(&mut header, abi::EM_MIPS);
        push_u32(&mut header, 1);
        push_u32(&mut header, self.entry);
        push_u32(&mut header, 0);
        push_u32(&mut header, shoff);
        push_u32(&mut header, 0);
        push_u16(&mut header, EHDR_SIZE as u16);
        push_u16(&mut header, 32);
        push_u16(&mut header, 0);
        push_u16(&mut header, SHDR_SIZE as u16);
        push_u16(&mut header, headers.len() as u16);
        push_u16(&mut header, shstrndx);
        out[..EHDR_SIZE].copy_from_slice(&header);

        out
    }
}
