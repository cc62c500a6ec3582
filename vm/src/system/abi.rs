//! Guest (o32, big-endian) layouts of the structures exchanged with syscalls.

use std::{fs::Metadata, os::unix::fs::MetadataExt};

use mipsemu_common::{error::MemoryError, memory::MemoryProcessor};

/// Host `stat` information, independent of the guest layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatInfo {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub atime: (i64, i64),
    pub mtime: (i64, i64),
    pub ctime: (i64, i64),
    pub blksize: u64,
    pub blocks: u64,
}

impl From<&Metadata> for StatInfo {
    fn from(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
            mode: meta.mode(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            size: meta.size(),
            atime: (meta.atime(), meta.atime_nsec()),
            mtime: (meta.mtime(), meta.mtime_nsec()),
            ctime: (meta.ctime(), meta.ctime_nsec()),
            blksize: meta.blksize(),
            blocks: meta.blocks(),
        }
    }
}

impl StatInfo {
    /// Size of the guest `struct stat`.
    pub const SIZE: u32 = 144;
    /// Size of the guest `struct stat64`.
    pub const SIZE64: u32 = 104;

    fn write_times(&self, memory: &mut impl MemoryProcessor, address: u32) -> Result<(), MemoryError> {
        for (i, (sec, nsec)) in [self.atime, self.mtime, self.ctime].into_iter().enumerate() {
            let offset = address.wrapping_add(8 * i as u32);
            memory.write_word(offset, sec as u32)?;
            memory.write_word(offset.wrapping_add(4), nsec as u32)?;
        }
        Ok(())
    }

    /// Guest `struct stat`; padding and unused fields are zeroed.
    pub fn write(&self, memory: &mut impl MemoryProcessor, address: u32) -> Result<(), MemoryError> {
        memory.write_bytes(address, &[0; StatInfo::SIZE as usize])?;
        memory.write_word(address, self.dev as u32)?;
        memory.write_word(address.wrapping_add(16), self.ino as u32)?;
        memory.write_word(address.wrapping_add(20), self.mode)?;
        memory.write_word(address.wrapping_add(24), self.nlink as u32)?;
        memory.write_word(address.wrapping_add(28), self.uid)?;
        memory.write_word(address.wrapping_add(32), self.gid)?;
        memory.write_word(address.wrapping_add(36), self.rdev as u32)?;
        memory.write_word(address.wrapping_add(48), self.size as u32)?;
        self.write_times(memory, address.wrapping_add(56))?;
        memory.write_word(address.wrapping_add(80), self.blksize as u32)?;
        memory.write_word(address.wrapping_add(84), self.blocks as u32)
    }

    /// Guest `struct stat64`.
    pub fn write64(&self, memory: &mut impl MemoryProcessor, address: u32) -> Result<(), MemoryError> {
        memory.write_bytes(address, &[0; StatInfo::SIZE64 as usize])?;
        memory.write_word(address, self.dev as u32)?;
        memory.write_dword(address.wrapping_add(16), self.ino)?;
        memory.write_word(address.wrapping_add(24), self.mode)?;
        memory.write_word(address.wrapping_add(28), self.nlink as u32)?;
        memory.write_word(address.wrapping_add(32), self.uid)?;
        memory.write_word(address.wrapping_add(36), self.gid)?;
        memory.write_word(address.wrapping_add(40), self.rdev as u32)?;
        memory.write_dword(address.wrapping_add(56), self.size)?;
        self.write_times(memory, address.wrapping_add(64))?;
        memory.write_word(address.wrapping_add(88), self.blksize as u32)?;
        memory.write_dword(address.wrapping_add(96), self.blocks)
    }
}

pub const RLIM_INFINITY: u32 = 0xffff_ffff;
pub const RLIMIT_DATA: u32 = 2;
pub const RLIMIT_STACK: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rlimit {
    pub cur: u32,
    pub max: u32,
}

impl Rlimit {
    pub fn read(memory: &mut impl MemoryProcessor, address: u32) -> Result<Self, MemoryError> {
        Ok(Self {
            cur: memory.read_word(address)?,
            max: memory.read_word(address.wrapping_add(4))?,
        })
    }

    pub fn write(&self, memory: &mut impl MemoryProcessor, address: u32) -> Result<(), MemoryError> {
        memory.write_word(address, self.cur)?;
        memory.write_word(address.wrapping_add(4), self.max)
    }
}

/// Limits reported to and set by the guest. They are bookkeeping only and
/// never applied to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub data: Rlimit,
    pub stack: Rlimit,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            data: Rlimit {
                cur: RLIM_INFINITY,
                max: RLIM_INFINITY,
            },
            stack: Rlimit {
                cur: 0x80_0000,
                max: RLIM_INFINITY,
            },
        }
    }
}

impl ResourceLimits {
    pub fn get_mut(&mut self, resource: u32) -> Option<&mut Rlimit> {
        match resource {
            RLIMIT_DATA => Some(&mut self.data),
            RLIMIT_STACK => Some(&mut self.stack),
            _ => None,
        }
    }
}

/// Guest `struct tms`.
pub fn write_tms(memory: &mut impl MemoryProcessor, address: u32, tms: &libc::tms) -> Result<(), MemoryError> {
    let fields = [tms.tms_utime, tms.tms_stime, tms.tms_cutime, tms.tms_cstime];
    for (i, value) in fields.into_iter().enumerate() {
        memory.write_word(address.wrapping_add(4 * i as u32), value as u32)?;
    }
    Ok(())
}

/// Guest `struct rusage`: two timevals followed by 14 counters.
pub fn write_rusage(
    memory: &mut impl MemoryProcessor,
    address: u32,
    usage: &libc::rusage,
) -> Result<(), MemoryError> {
    let fields = [
        usage.ru_utime.tv_sec as u32,
        usage.ru_utime.tv_usec as u32,
        usage.ru_stime.tv_sec as u32,
        usage.ru_stime.tv_usec as u32,
        usage.ru_maxrss as u32,
        usage.ru_ixrss as u32,
        usage.ru_idrss as u32,
        usage.ru_isrss as u32,
        usage.ru_minflt as u32,
        usage.ru_majflt as u32,
        usage.ru_nswap as u32,
        usage.ru_inblock as u32,
        usage.ru_oublock as u32,
        usage.ru_msgsnd as u32,
        usage.ru_msgrcv as u32,
        usage.ru_nsignals as u32,
        usage.ru_nvcsw as u32,
        usage.ru_nivcsw as u32,
    ];
    for (i, value) in fields.into_iter().enumerate() {
        memory.write_word(address.wrapping_add(4 * i as u32), value)?;
    }
    Ok(())
}

const UTSNAME_FIELD: u32 = 65;

const UTSNAME: [&str; 6] = ["Linux", "sim", "2.6", "Tue Apr 5 12:21:57 UTC 2005", "mips", ""];

/// Guest `struct utsname` describing the emulated machine.
pub fn write_utsname(memory: &mut impl MemoryProcessor, address: u32) -> Result<(), MemoryError> {
    memory.write_bytes(address, &[0; (UTSNAME_FIELD * 6) as usize])?;
    for (i, field) in UTSNAME.iter().enumerate() {
        memory.write_string(address.wrapping_add(UTSNAME_FIELD * i as u32), field)?;
    }
    Ok(())
}

pub const TCGETS: u32 = 0x540d;
pub const TCGETA: u32 = 0x5401;
const GUEST_NCCS: usize = 32;

/// Guest `struct termios`: four flag words, the line discipline and the
/// control characters.
pub fn write_termios(
    memory: &mut impl MemoryProcessor,
    address: u32,
    termios: &libc::termios,
) -> Result<(), MemoryError> {
    let flags = [termios.c_iflag, termios.c_oflag, termios.c_cflag, termios.c_lflag];
    for (i, value) in flags.into_iter().enumerate() {
        memory.write_word(address.wrapping_add(4 * i as u32), value as u32)?;
    }
    memory.write_byte(address.wrapping_add(16), termios.c_line)?;
    let mut cc = [0u8; GUEST_NCCS];
    let count = termios.c_cc.len().min(GUEST_NCCS);
    cc[..count].copy_from_slice(&termios.c_cc[..count]);
    memory.write_bytes(address.wrapping_add(17), &cc)
}

/// Guest `struct iovec` array.
pub fn read_iovecs(
    memory: &mut impl MemoryProcessor,
    address: u32,
    count: u32,
) -> Result<Vec<(u32, u32)>, MemoryError> {
    (0..count)
        .map(|i| {
            let entry = address.wrapping_add(8 * i);
            Ok((memory.read_word(entry)?, memory.read_word(entry.wrapping_add(4))?))
        })
        .collect()
}
