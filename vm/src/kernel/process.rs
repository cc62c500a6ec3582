//! Process image: the loaded program and the host resources of a top-level
//! context, shared by every context cloned from it.

use std::{
    cell::Cell,
    fs::{File, OpenOptions},
    os::unix::{fs::OpenOptionsExt, io::AsRawFd},
    path::{Path, PathBuf},
};

use mipsemu_common::{
    constants::{MAX_ENVIRON, STACK_BASE},
    memory::{Alignable, MemoryProcessor},
    mips::Register,
};
use mipsemu_config::ContextEntry;
use tracing::debug;

use crate::{
    cpu::RegisterFile,
    elf::{ElfFile, SymbolTable},
    error::{Result, VMErrorKind},
    memory::Memory,
};

#[derive(Debug, Default)]
pub struct Process {
    pub exe: PathBuf,
    pub argv: Vec<String>,
    pub cwd: PathBuf,

    pub entry: u32,
    pub text_size: u32,
    pub data_top: u32,
    /// Data segment top rounded up to a page; initial program break and
    /// default `mmap` hint.
    pub heap_top: u32,
    pub environ_base: u32,
    /// Current program break.
    pub brk: Cell<u32>,

    pub symbols: SymbolTable,

    stdin: Option<File>,
    stdout: Option<File>,
}

fn host_file_error(path: &Path, err: std::io::Error) -> VMErrorKind {
    VMErrorKind::HostFile(path.display().to_string(), err.to_string())
}

impl Process {
    /// Open the redirections of `entry`, read its executable and set up a
    /// fresh context image in `memory` and `registers`.
    pub fn load(entry: &ContextEntry, memory: &mut Memory, registers: &mut RegisterFile) -> Result<Self> {
        let elf = ElfFile::from_path(&entry.exe)?;
        Self::from_elf(entry, elf, memory, registers)
    }

    /// Like [`Process::load`], for an already parsed executable.
    pub fn from_elf(
        entry: &ContextEntry,
        elf: ElfFile,
        memory: &mut Memory,
        registers: &mut RegisterFile,
    ) -> Result<Self> {
        let stdin = entry
            .stdin
            .as_deref()
            .map(|path| File::open(path).map_err(|err| host_file_error(path, err)))
            .transpose()?;
        let stdout = entry
            .stdout
            .as_deref()
            .map(|path| {
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(0o660)
                    .open(path)
                    .map_err(|err| host_file_error(path, err))
            })
            .transpose()?;
        let cwd = match &entry.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir().map_err(|err| host_file_error(Path::new("."), err))?,
        };

        for section in &elf.sections {
            memory.write_bytes(section.address, &section.data)?;
        }
        debug!(
            "{}: {} sections loaded, entry 0x{:08x}",
            entry.exe.display(),
            elf.sections.len(),
            elf.entry
        );

        let heap_top = elf.data_top.page_align_up();
        let argv = entry.argv();
        let environ_base = Self::write_arguments(memory, &argv)?;

        registers.start_at(elf.entry);
        registers.set_gpr(Register::Sp as u32, environ_base);

        Ok(Self {
            exe: entry.exe.clone(),
            argv,
            cwd,
            entry: elf.entry,
            text_size: elf.text_size,
            data_top: elf.data_top,
            heap_top,
            environ_base,
            brk: Cell::new(heap_top),
            symbols: elf.symbols,
            stdin,
            stdout,
        })
    }

    /// Lay out `argc`, `argv`, an empty `envp` and the argument strings at
    /// the bottom of the environment area. Returns the initial stack pointer.
    fn write_arguments(memory: &mut Memory, argv: &[String]) -> Result<u32> {
        let environ_base = STACK_BASE - MAX_ENVIRON;
        let argc = argv.len() as u32;

        let mut sp = environ_base;
        memory.write_word(sp, argc)?;
        sp += 4;
        let argv_addr = sp;
        sp += (argc + 1) * 4;
        let envp_addr = sp;
        sp += 4;

        for (i, arg) in argv.iter().enumerate() {
            if sp as usize + arg.len() + 1 > STACK_BASE as usize {
                return Err(VMErrorKind::EnvironmentOverflow.into());
            }
            memory.write_word(argv_addr + 4 * i as u32, sp)?;
            memory.write_string(sp, arg)?;
            sp += arg.len() as u32 + 1;
        }
        memory.write_word(argv_addr + 4 * argc, 0)?;
        memory.write_word(envp_addr, 0)?;

        Ok(environ_base)
    }

    /// Host descriptor backing guest descriptor `fd`.
    pub fn translate_fd(&self, fd: i32) -> i32 {
        match fd {
            0 => self.stdin.as_ref().map_or(0, |file| file.as_raw_fd()),
            1 | 2 => self.stdout.as_ref().map_or(fd, |file| file.as_raw_fd()),
            _ => fd,
        }
    }

    /// Host path of a guest path, relative ones taken from the working
    /// directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        if path.starts_with('/') {
            PathBuf::from(path)
        } else {
            self.cwd.join(path)
        }
    }
}
