//! Guest syscall emulation.
//!
//! The guest requests a syscall with `v0 = 4000 + n` and its arguments in
//! `a0..a3`, followed by stack slots at `sp + 16` and `sp + 20`. Results come
//! back in `v0` with `a3` flagging an error, in which case `v0` holds the
//! host `errno`.
//!
//! Supported calls are a closed set: anything else, or an argument
//! combination the emulator does not model, is a fatal error rather than a
//! guest-visible failure.
//!
//! Blocking calls (`read` on an empty pipe, the wait family, `poll`,
//! `nanosleep`, `rt_sigsuspend`) suspend the context and queue an
//! [`Event`]; the emulator completes them once the event fires.

use std::{path::PathBuf, time::Duration};

use mipsemu_common::{
    constants::{PAGE_SIZE, SYSCALL_BASE},
    memory::{Alignable, MemoryProcessor},
    mips::Register,
};
use tracing::{debug, warn};

use super::{
    abi::{self, Rlimit, StatInfo},
    event::{Event, EventKind, Triggers},
    host::{self, HostResult},
    pipe::PipeTable,
    signal::{SigAction, SigSet, SIGCHLD},
    System,
};
use crate::{
    error::{Result, VMErrorKind},
    kernel::{Context, ContextId, Kernel},
    memory::Protection,
};

/// Upper bound on a single `read`.
pub const MAX_READ_SIZE: u32 = 32 * 1024 * 1024;

const MAX_PATH: usize = 4096;

const CLONE_VM: u32 = 0x100;
const POLLIN: u16 = 1;

const SYSCALL_NAMES: [&str; 268] = [
    "syscall", "exit", "fork", "read", "write", "open", "close", "waitpid", "creat", "link",
    "unlink", "execve", "chdir", "time", "mknod", "chmod", "lchown", "break", "unused18", "lseek",
    "getpid", "mount", "umount", "setuid", "getuid", "stime", "ptrace", "alarm", "unused28", "pause",
    "utime", "stty", "gtty", "access", "nice", "ftime", "sync", "kill", "rename", "mkdir",
    "rmdir", "dup", "pipe", "times", "prof", "brk", "setgid", "getgid", "signal", "geteuid",
    "getegid", "acct", "umount2", "lock", "ioctl", "fcntl", "mpx", "setpgid", "ulimit", "unused59",
    "umask", "chroot", "ustat", "dup2", "getppid", "getpgrp", "setsid", "sigaction", "sgetmask", "ssetmask",
    "setreuid", "setregid", "sigsuspend", "sigpending", "sethostname", "setrlimit", "getrlimit", "getrusage",
    "gettimeofday", "settimeofday",
    "getgroups", "setgroups", "reserved82", "symlink", "unused84", "readlink", "uselib", "swapon",
    "reboot", "readdir",
    "mmap", "munmap", "truncate", "ftruncate", "fchmod", "fchown", "getpriority", "setpriority",
    "profil", "statfs",
    "fstatfs", "ioperm", "socketcall", "syslog", "setitimer", "getitimer", "stat", "lstat", "fstat",
    "unused109",
    "iopl", "vhangup", "idle", "vm86", "wait4", "swapoff", "sysinfo", "ipc", "fsync", "sigreturn",
    "clone", "setdomainname", "uname", "modify_ldt", "adjtimex", "mprotect", "sigprocmask",
    "create_module", "init_module", "delete_module",
    "get_kernel_syms", "quotactl", "getpgid", "fchdir", "bdflush", "sysfs", "personality",
    "afs_syscall", "setfsuid", "setfsgid",
    "_llseek", "getdents", "_newselect", "flock", "msync", "readv", "writev", "cacheflush",
    "cachectl", "sysmips",
    "unused150", "getsid", "fdatasync", "_sysctl", "mlock", "munlock", "mlockall", "munlockall",
    "sched_setparam", "sched_getparam",
    "sched_setscheduler", "sched_getscheduler", "sched_yield", "sched_get_priority_max",
    "sched_get_priority_min", "sched_rr_get_interval", "nanosleep", "mremap", "accept", "bind",
    "connect", "getpeername", "getsockname", "getsockopt", "listen", "recv", "recvfrom", "recvmsg",
    "send", "sendmsg",
    "sendto", "setsockopt", "shutdown", "socket", "socketpair", "setresuid", "getresuid",
    "query_module", "poll", "nfsservctl",
    "setresgid", "getresgid", "prctl", "rt_sigreturn", "rt_sigaction", "rt_sigprocmask",
    "rt_sigpending", "rt_sigtimedwait", "rt_sigqueueinfo", "rt_sigsuspend",
    "pread64", "pwrite64", "chown", "getcwd", "capget", "capset", "sigaltstack", "sendfile",
    "getpmsg", "putpmsg",
    "mmap2", "truncate64", "ftruncate64", "stat64", "lstat64", "fstat64", "pivot_root", "mincore",
    "madvise", "getdents64",
    "fcntl64", "reserved221", "gettid", "readahead", "setxattr", "lsetxattr", "fsetxattr",
    "getxattr", "lgetxattr", "fgetxattr",
    "listxattr", "llistxattr", "flistxattr", "removexattr", "lremovexattr", "fremovexattr", "tkill",
    "sendfile64", "futex", "sched_setaffinity",
    "sched_getaffinity", "io_setup", "io_destroy", "io_getevents", "io_submit", "io_cancel",
    "exit_group", "lookup_dcookie", "epoll_create", "epoll_ctl",
    "epoll_wait", "remap_file_pages", "set_tid_address", "restart_syscall", "fadvise64", "statfs64",
    "fstatfs64", "timer_create", "timer_settime", "timer_gettime",
    "timer_getoverrun", "timer_delete", "clock_settime", "clock_gettime", "clock_getres",
    "clock_nanosleep", "tgkill", "utimes",
];

/// Name of syscall `n` (guest number minus 4000).
pub fn syscall_name(n: u32) -> &'static str {
    SYSCALL_NAMES.get(n as usize).copied().unwrap_or("unknown")
}

/// Supported syscalls, valued by their number relative to 4000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallCode {
    Exit = 1,
    Fork = 2,
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,
    Waitpid = 7,
    Unlink = 10,
    Time = 13,
    Lseek = 19,
    Getpid = 20,
    Getuid = 24,
    Access = 33,
    Kill = 37,
    Rename = 38,
    Mkdir = 39,
    Pipe = 42,
    Times = 43,
    Brk = 45,
    Getgid = 47,
    Geteuid = 49,
    Getegid = 50,
    Ioctl = 54,
    Getppid = 64,
    Setrlimit = 75,
    Getrlimit = 76,
    Getrusage = 77,
    Readlink = 85,
    Mmap = 90,
    Munmap = 91,
    Stat = 106,
    Lstat = 107,
    Fstat = 108,
    Wait4 = 114,
    Clone = 120,
    Uname = 122,
    Mprotect = 125,
    Llseek = 140,
    Writev = 146,
    Sysctl = 153,
    Nanosleep = 166,
    Mremap = 167,
    Poll = 188,
    RtSigaction = 194,
    RtSigprocmask = 195,
    RtSigsuspend = 199,
    Getcwd = 203,
    Mmap2 = 210,
    Ftruncate64 = 212,
    Stat64 = 213,
    Lstat64 = 214,
    Fstat64 = 215,
    Fcntl64 = 220,
    ExitGroup = 246,
}

impl SyscallCode {
    fn try_from(number: u32, pc: u32) -> Result<Self> {
        use SyscallCode::*;

        let n = number.wrapping_sub(SYSCALL_BASE);
        let code = match n {
            1 => Exit,
            2 => Fork,
            3 => Read,
            4 => Write,
            5 => Open,
            6 => Close,
            7 => Waitpid,
            10 => Unlink,
            13 => Time,
            19 => Lseek,
            20 => Getpid,
            24 => Getuid,
            33 => Access,
            37 => Kill,
            38 => Rename,
            39 => Mkdir,
            42 => Pipe,
            43 => Times,
            45 => Brk,
            47 => Getgid,
            49 => Geteuid,
            50 => Getegid,
            54 => Ioctl,
            64 => Getppid,
            75 => Setrlimit,
            76 => Getrlimit,
            77 => Getrusage,
            85 => Readlink,
            90 => Mmap,
            91 => Munmap,
            106 => Stat,
            107 => Lstat,
            108 => Fstat,
            114 => Wait4,
            120 => Clone,
            122 => Uname,
            125 => Mprotect,
            140 => Llseek,
            146 => Writev,
            153 => Sysctl,
            166 => Nanosleep,
            167 => Mremap,
            188 => Poll,
            194 => RtSigaction,
            195 => RtSigprocmask,
            199 => RtSigsuspend,
            203 => Getcwd,
            210 => Mmap2,
            212 => Ftruncate64,
            213 => Stat64,
            214 => Lstat64,
            215 => Fstat64,
            220 => Fcntl64,
            246 => ExitGroup,
            _ => return Err(VMErrorKind::UnimplementedSyscall(number, syscall_name(n), pc).into()),
        };
        Ok(code)
    }

    pub fn name(self) -> &'static str {
        syscall_name(self as u32)
    }
}

/// Guest open flags and their host counterparts.
const OPEN_FLAGS: [(u32, i32); 11] = [
    (0x1, libc::O_WRONLY),
    (0x2, libc::O_RDWR),
    (0x8, libc::O_APPEND),
    (0x10, libc::O_SYNC),
    (0x80, libc::O_NONBLOCK),
    (0x100, libc::O_CREAT),
    (0x200, libc::O_TRUNC),
    (0x400, libc::O_EXCL),
    (0x800, libc::O_NOCTTY),
    // O_LARGEFILE
    (0x2000, 0),
    (0x0, libc::O_RDONLY),
];

/// Host flags for guest `open` flags, or the bits that have no translation.
fn translate_open_flags(flags: u32) -> Result<i32, u32> {
    let mut remaining = flags;
    let mut host = 0;
    for (guest, native) in OPEN_FLAGS {
        if remaining & guest != 0 {
            remaining &= !guest;
            host |= native;
        }
    }
    if remaining != 0 {
        return Err(remaining);
    }
    Ok(host)
}

/// One syscall request of a context.
pub struct SyscallInstruction {
    code: SyscallCode,
    pc: u32,

    /// `a0..a3`.
    args: [u32; 4],

    /// Outcome to report in `v0`/`a3`. Calls that suspend or finish the
    /// context leave it unset.
    result: Option<HostResult>,
}

impl SyscallInstruction {
    pub fn decode(context: &Context) -> Result<Self> {
        let pc = context.registers.pc;
        Ok(Self {
            code: SyscallCode::try_from(context.gpr(Register::V0), pc)?,
            pc,
            args: [
                context.gpr(Register::A0),
                context.gpr(Register::A1),
                context.gpr(Register::A2),
                context.gpr(Register::A3),
            ],
            result: None,
        })
    }

    pub fn code(&self) -> SyscallCode {
        self.code
    }

    pub fn result(&self) -> Option<HostResult> {
        self.result
    }

    /// Arguments past the fourth live on the stack: index 0 is `sp + 16`.
    fn stack_arg(context: &mut Context, index: u32) -> Result<u32> {
        let sp = context.gpr(Register::Sp);
        Ok(context.memory.read_word(sp.wrapping_add(16 + 4 * index))?)
    }

    fn unsupported(&self, detail: String) -> VMErrorKind {
        VMErrorKind::UnsupportedSyscall(self.code.name(), detail)
    }

    /// Host path named by the guest string at `address`.
    fn read_path(context: &mut Context, address: u32) -> Result<PathBuf> {
        let path = context.memory.read_string(address, MAX_PATH)?;
        Ok(context.process.resolve_path(&path))
    }

    fn execute_exit(&mut self, kernel: &mut Kernel, ctx: ContextId) -> Result<()> {
        kernel.context_mut(ctx)?.exit_code = self.args[0];
        kernel.finish(ctx)
    }

    /// Start a child context resuming right after the syscall with `v0 = 0`.
    fn spawn_child(
        &mut self,
        kernel: &mut Kernel,
        ctx: ContextId,
        finish_signal: u32,
        share_memory: bool,
        stack: u32,
    ) -> Result<()> {
        let child = kernel.clone_context(ctx, finish_signal, share_memory)?;
        let child = kernel.context_mut(child)?;
        if stack != 0 {
            child.set_gpr(Register::Sp, stack);
        }
        child.syscall_return(Ok(0));
        self.result = Some(Ok(child.pid));
        Ok(())
    }

    fn execute_fork(&mut self, kernel: &mut Kernel, ctx: ContextId) -> Result<()> {
        self.spawn_child(kernel, ctx, SIGCHLD, false, 0)
    }

    fn execute_clone(&mut self, kernel: &mut Kernel, ctx: ContextId) -> Result<()> {
        let [flags, stack, ..] = self.args;
        self.spawn_child(kernel, ctx, flags & 0xff, flags & CLONE_VM != 0, stack)
    }

    fn execute_read(&mut self, kernel: &mut Kernel, system: &mut System, ctx: ContextId) -> Result<()> {
        let [fd, address, size, _] = self.args;
        let (fd, size) = (fd as i32, size.min(MAX_READ_SIZE));

        if PipeTable::is_pipe_fd(fd) {
            let writer_closed = system.pipes.writer_closed(fd);
            let Some(buffer) = system.pipes.read_buffer(fd) else {
                self.result = Some(Err(libc::EBADF));
                return Ok(());
            };
            if buffer.is_empty() && !writer_closed {
                system.events.push(Event::new(
                    ctx,
                    EventKind::Read { fd, address, size },
                    Triggers::data(fd),
                ));
                return kernel.suspend(ctx);
            }
            let data = buffer.read(size as usize);
            kernel.context_mut(ctx)?.memory.write_bytes(address, &data)?;
            self.result = Some(Ok(data.len() as u32));
            return Ok(());
        }

        let context = kernel.context_mut(ctx)?;
        let data = host::read(context.process.translate_fd(fd), size as usize);
        self.result = Some(match data {
            Ok(data) => {
                context.memory.write_bytes(address, &data)?;
                Ok(data.len() as u32)
            }
            Err(errno) => Err(errno),
        });
        Ok(())
    }

    /// Write to a pipe or a host descriptor.
    fn write_fd(system: &mut System, context: &Context, fd: i32, data: &[u8]) -> HostResult {
        if PipeTable::is_pipe_fd(fd) {
            return system
                .pipes
                .write_buffer(fd)
                .map_or(Err(libc::EBADF), |buffer| Ok(buffer.write(data) as u32));
        }
        host::write(context.process.translate_fd(fd), data)
    }

    fn execute_write(&mut self, kernel: &mut Kernel, system: &mut System, ctx: ContextId) -> Result<()> {
        let [fd, address, size, _] = self.args;
        let context = kernel.context_mut(ctx)?;
        let data = context.memory.read_bytes(address, size as usize)?;
        self.result = Some(Self::write_fd(system, context, fd as i32, &data));
        Ok(())
    }

    fn execute_writev(&mut self, kernel: &mut Kernel, system: &mut System, ctx: ContextId) -> Result<()> {
        let [fd, iov, count, _] = self.args;
        let context = kernel.context_mut(ctx)?;
        let mut data = Vec::new();
        for (base, len) in abi::read_iovecs(&mut context.memory, iov, count)? {
            data.extend(context.memory.read_bytes(base, len as usize)?);
        }
        self.result = Some(Self::write_fd(system, context, fd as i32, &data));
        Ok(())
    }

    fn execute_open(&mut self, context: &mut Context) -> Result<()> {
        let [path, flags, mode, _] = self.args;
        let host_flags =
            translate_open_flags(flags).map_err(|bits| self.unsupported(format!("flags 0x{bits:x}")))?;
        let path = Self::read_path(context, path)?;
        self.result = Some(host::open(&path, host_flags, mode));
        Ok(())
    }

    fn execute_close(&mut self, system: &mut System) -> Result<()> {
        let fd = self.args[0] as i32;
        self.result = Some(match fd {
            0..=2 => Ok(0),
            fd if PipeTable::is_pipe_fd(fd) => {
                system.pipes.close(fd);
                Ok(0)
            }
            fd => host::close(fd),
        });
        Ok(())
    }

    /// `waitpid` and `wait4`. `wait4` fails right away for a context without
    /// children; `waitpid(-1)` does too unless a zombie is left to reap.
    fn execute_wait(&mut self, kernel: &mut Kernel, system: &mut System, ctx: ContextId) -> Result<()> {
        let [pid, status_address, ..] = self.args;
        let pid = pid as i32;
        if pid < -1 || pid == 0 {
            return Err(self.unsupported(format!("pid {pid}")).into());
        }

        let no_children = kernel.context(ctx)?.child_count == 0
            && (self.code == SyscallCode::Wait4 || (pid == -1 && kernel.zombie_count() == 0));
        let unknown_pid = pid > 0 && kernel.pid_context(pid as u32).is_none() && !kernel.is_zombie(pid as u32);
        if no_children || unknown_pid {
            self.result = Some(Err(libc::ECHILD));
            return Ok(());
        }

        system.events.push(Event::new(
            ctx,
            EventKind::Wait { pid, status_address },
            Triggers::wait(pid),
        ));
        kernel.suspend(ctx)
    }

    fn execute_kill(&mut self, kernel: &mut Kernel) -> Result<()> {
        let [pid, sig, ..] = self.args;
        if (pid as i32) < 1 {
            return Err(self.unsupported(format!("pid {}", pid as i32)).into());
        }
        self.result = Some(match kernel.pid_context(pid) {
            Some(target) => {
                kernel.context_mut(target)?.signals.pending.add(sig);
                Ok(0)
            }
            None => Err(libc::ESRCH),
        });
        Ok(())
    }

    fn execute_pipe(&mut self, context: &mut Context, system: &mut System) -> Result<()> {
        let [read_fd, write_fd] = system.pipes.create()?;
        context.set_gpr(Register::V1, write_fd as u32);
        self.result = Some(Ok(read_fd as u32));
        Ok(())
    }

    fn execute_time(&mut self, context: &mut Context) -> Result<()> {
        let now = host::time();
        if self.args[0] != 0 {
            context.memory.write_word(self.args[0], now)?;
        }
        self.result = Some(Ok(now));
        Ok(())
    }

    fn execute_times(&mut self, context: &mut Context) -> Result<()> {
        self.result = Some(match host::times() {
            Ok((tms, ticks)) => {
                if self.args[0] != 0 {
                    abi::write_tms(&mut context.memory, self.args[0], &tms)?;
                }
                Ok(ticks)
            }
            Err(errno) => Err(errno),
        });
        Ok(())
    }

    /// Move the program break. Requests below the initial break, or growth
    /// into pages that already exist, leave it unchanged.
    fn execute_brk(&mut self, context: &mut Context) -> Result<()> {
        let requested = self.args[0];
        let current = context.process.brk.get();
        if requested == 0 || requested < context.process.heap_top {
            self.result = Some(Ok(current));
            return Ok(());
        }

        let (old_top, new_top) = (current.page_align_up(), requested.page_align_up());
        if new_top < requested {
            // Rounding wrapped past the top of the address space
            self.result = Some(Ok(current));
            return Ok(());
        }
        if new_top > old_top {
            let collides = (old_top..new_top)
                .step_by(PAGE_SIZE as usize)
                .any(|address| context.memory.protection(address).is_some());
            if collides {
                self.result = Some(Ok(current));
                return Ok(());
            }
            context.memory.protect(old_top, new_top - old_top, Protection::READ_WRITE)?;
        }
        context.process.brk.set(requested);
        self.result = Some(Ok(requested));
        Ok(())
    }

    fn execute_ioctl(&mut self, context: &mut Context) -> Result<()> {
        let [fd, request, arg, _] = self.args;
        if request != abi::TCGETA && request != abi::TCGETS {
            return Err(self.unsupported(format!("request 0x{request:x}")).into());
        }
        self.result = Some(match host::tcgetattr(context.process.translate_fd(fd as i32)) {
            Ok(termios) => {
                if arg != 0 {
                    abi::write_termios(&mut context.memory, arg, &termios)?;
                }
                Ok(0)
            }
            Err(errno) => Err(errno),
        });
        Ok(())
    }

    fn execute_rlimit(&mut self, context: &mut Context, system: &mut System) -> Result<()> {
        let [resource, address, ..] = self.args;
        let Some(limit) = system.limits.get_mut(resource) else {
            return Err(self.unsupported(format!("resource {resource}")).into());
        };
        if self.code == SyscallCode::Getrlimit {
            limit.write(&mut context.memory, address)?;
        } else {
            *limit = Rlimit::read(&mut context.memory, address)?;
        }
        self.result = Some(Ok(0));
        Ok(())
    }

    fn execute_getrusage(&mut self, context: &mut Context) -> Result<()> {
        let [who, address, ..] = self.args;
        if who != 0 {
            warn!("getrusage: who={} reported as the calling process", who as i32);
        }
        self.result = Some(match host::getrusage() {
            Ok(usage) => {
                abi::write_rusage(&mut context.memory, address, &usage)?;
                Ok(0)
            }
            Err(errno) => Err(errno),
        });
        Ok(())
    }

    fn execute_readlink(&mut self, context: &mut Context) -> Result<()> {
        let [path, buffer, size, _] = self.args;
        let path = Self::read_path(context, path)?;
        self.result = Some(match host::readlink(&path) {
            Ok(mut target) => {
                target.truncate(size as usize);
                context.memory.write_bytes(buffer, &target)?;
                Ok(target.len() as u32)
            }
            Err(errno) => Err(errno),
        });
        Ok(())
    }

    /// Anonymous mappings only; the hint defaults to the heap top.
    fn execute_mmap(&mut self, context: &mut Context) -> Result<()> {
        let [address, length, ..] = self.args;
        let fd = Self::stack_arg(context, 0)? as i32;
        if fd != -1 {
            return Err(self.unsupported(format!("file mapping of fd {fd}")).into());
        }
        let size = length.page_align_up();
        if length == 0 || size < length {
            self.result = Some(Err(libc::EINVAL));
            return Ok(());
        }
        let hint = if address == 0 {
            context.process.heap_top
        } else {
            address.page_align_up()
        };
        let mapped = context.memory.map(hint, size, Protection::READ_WRITE)?;
        self.result = Some(Ok(mapped));
        Ok(())
    }

    fn execute_munmap(&mut self, context: &mut Context) -> Result<()> {
        let [address, length, ..] = self.args;
        if !address.is_page_aligned() {
            self.result = Some(Err(libc::EINVAL));
            return Ok(());
        }
        context.memory.unmap(address, length.page_align_up())?;
        self.result = Some(Ok(0));
        Ok(())
    }

    fn execute_mremap(&mut self, context: &mut Context) -> Result<()> {
        let [address, old_size, new_size, _] = self.args;
        if !address.is_page_aligned() || new_size == 0 {
            self.result = Some(Err(libc::EINVAL));
            return Ok(());
        }
        let moved = context
            .memory
            .remap(address, old_size.page_align_up(), new_size.page_align_up())?;
        self.result = Some(Ok(moved));
        Ok(())
    }

    fn execute_stat(&mut self, context: &mut Context) -> Result<()> {
        use SyscallCode::*;

        let [target, address, ..] = self.args;
        let metadata = match self.code {
            Stat | Stat64 => host::stat(&Self::read_path(context, target)?),
            Lstat | Lstat64 => host::lstat(&Self::read_path(context, target)?),
            _ => host::fstat(context.process.translate_fd(target as i32)),
        };
        self.result = Some(match metadata {
            Ok(metadata) => {
                let info = StatInfo::from(&metadata);
                match self.code {
                    Stat64 | Lstat64 | Fstat64 => info.write64(&mut context.memory, address)?,
                    _ => info.write(&mut context.memory, address)?,
                }
                Ok(0)
            }
            Err(errno) => Err(errno),
        });
        Ok(())
    }

    fn execute_llseek(&mut self, context: &mut Context) -> Result<()> {
        let [fd, high, low, result] = self.args;
        let whence = Self::stack_arg(context, 0)? as i32;
        let offset = ((high as u64) << 32 | low as u64) as i64;
        self.result = Some(match host::lseek(context.process.translate_fd(fd as i32), offset, whence) {
            Ok(position) => {
                context.memory.write_dword(result, position as u64)?;
                Ok(0)
            }
            Err(errno) => Err(errno),
        });
        Ok(())
    }

    fn execute_sysctl(&mut self, context: &mut Context) -> Result<()> {
        let name = context.memory.read_word(self.args[0])?;
        let first = context.memory.read_word(name)?;
        if first != 0 {
            return Err(self.unsupported(format!("name[0] = {first}")).into());
        }
        self.result = Some(Ok(0));
        Ok(())
    }

    fn execute_nanosleep(&mut self, kernel: &mut Kernel, system: &mut System, ctx: ContextId) -> Result<()> {
        let [request, remaining, ..] = self.args;
        let context = kernel.context_mut(ctx)?;
        let seconds = context.memory.read_word(request)?;
        let nanos = context.memory.read_word(request.wrapping_add(4))?;
        if remaining != 0 {
            context.memory.write_dword(remaining, 0)?;
        }

        let duration = Duration::from_secs(seconds as u64) + Duration::from_nanos(nanos as u64);
        system
            .events
            .push(Event::new(ctx, EventKind::Resume, Triggers::timeout(duration)));
        kernel.suspend(ctx)
    }

    /// `POLLIN` on pipe read ends. A negative timeout waits for data only.
    fn execute_poll(&mut self, kernel: &mut Kernel, system: &mut System, ctx: ContextId) -> Result<()> {
        let [fds, count, timeout, _] = self.args;
        if (count as i32) < 1 {
            return Err(self.unsupported(format!("nfds {}", count as i32)).into());
        }

        let context = kernel.context_mut(ctx)?;
        let mut events = Vec::with_capacity(count as usize);
        for i in 0..count {
            let pollfd = fds.wrapping_add(8 * i);
            let fd = context.memory.read_word(pollfd)? as i32;
            let requested = context.memory.read_half(pollfd.wrapping_add(4))?;
            if requested != POLLIN {
                return Err(self.unsupported(format!("events 0x{requested:x}")).into());
            }
            if system.pipes.read_buffer(fd).is_none() {
                return Err(self.unsupported(format!("fd {fd} is not a pipe read end")).into());
            }
            context.memory.write_half(pollfd.wrapping_add(6), 0)?;

            let mut triggers = Triggers::data(fd);
            if (timeout as i32) >= 0 {
                triggers = triggers.or_timeout(Duration::from_millis(timeout as u64));
            }
            events.push(Event::new(ctx, EventKind::Poll { fd, pollfd }, triggers));
        }

        events.into_iter().for_each(|event| system.events.push(event));
        kernel.suspend(ctx)
    }

    fn execute_sigaction(&mut self, context: &mut Context, system: &mut System) -> Result<()> {
        let [sig, action, old_action, _] = self.args;
        let Some(entry) = system.signal_table.get_mut(sig) else {
            self.result = Some(Err(libc::EINVAL));
            return Ok(());
        };
        if old_action != 0 {
            entry.write(&mut context.memory, old_action)?;
        }
        if action != 0 {
            *entry = SigAction::read(&mut context.memory, action)?;
        }
        self.result = Some(Ok(0));
        Ok(())
    }

    fn execute_sigprocmask(&mut self, context: &mut Context) -> Result<()> {
        let [how, set, old_set, _] = self.args;
        if old_set != 0 {
            context.signals.blocked.write(&mut context.memory, old_set)?;
        }
        if set != 0 {
            let set = SigSet::read(&mut context.memory, set)?;
            let blocked = &mut context.signals.blocked;
            *blocked = match how {
                1 => blocked.union(&set),
                2 => blocked.difference(&set),
                3 => set,
                _ => return Err(self.unsupported(format!("how {how}")).into()),
            };
        }
        self.result = Some(Ok(0));
        Ok(())
    }

    fn execute_sigsuspend(&mut self, kernel: &mut Kernel, system: &mut System, ctx: ContextId) -> Result<()> {
        let mask = self.args[0];
        if mask == 0 {
            return Err(self.unsupported("null mask".into()).into());
        }
        let context = kernel.context_mut(ctx)?;
        let signals = &mut context.signals;
        signals.backup = signals.blocked;
        signals.blocked = SigSet::read(&mut context.memory, mask)?;

        system
            .events
            .push(Event::new(ctx, EventKind::SigSuspend, Triggers::signal()));
        kernel.suspend(ctx)
    }

    fn execute_getcwd(&mut self, context: &mut Context) -> Result<()> {
        let [buffer, size, ..] = self.args;
        let cwd = context.process.cwd.display().to_string();
        self.result = Some(if cwd.len() >= size as usize {
            Err(libc::ERANGE)
        } else {
            context.memory.write_string(buffer, &cwd)?;
            Ok(cwd.len() as u32 + 1)
        });
        Ok(())
    }

    fn execute_fcntl(&mut self, context: &mut Context) -> Result<()> {
        let [fd, cmd, arg, _] = self.args;
        warn!("fcntl64: fd={} cmd={} passed to the host", fd as i32, cmd as i32);
        self.result = Some(host::fcntl(
            context.process.translate_fd(fd as i32),
            cmd as i32,
            arg as i32,
        ));
        Ok(())
    }

    fn execute_host(&mut self, context: &mut Context) -> Result<()> {
        use SyscallCode::*;

        let [a0, a1, a2, a3] = self.args;
        let fd = context.process.translate_fd(a0 as i32);
        self.result = Some(match self.code {
            Unlink => host::unlink(&Self::read_path(context, a0)?),
            Access => host::access(&Self::read_path(context, a0)?, a1 as i32),
            Rename => {
                let from = Self::read_path(context, a0)?;
                host::rename(&from, &Self::read_path(context, a1)?)
            }
            Mkdir => host::mkdir(&Self::read_path(context, a0)?, a1),
            Lseek => host::lseek(fd, a1 as i32 as i64, a2 as i32).map(|position| position as u32),
            // The 64-bit length occupies the a2:a3 register pair
            Ftruncate64 => host::ftruncate(fd, ((a2 as u64) << 32 | a3 as u64) as i64),
            Getuid => Ok(host::getuid()),
            Geteuid => Ok(host::geteuid()),
            Getgid => Ok(host::getgid()),
            Getegid => Ok(host::getegid()),
            Mprotect => Ok(0),
            Uname => {
                abi::write_utsname(&mut context.memory, a0)?;
                Ok(0)
            }
            _ => unreachable!("{:?} is not a plain host call", self.code),
        });
        Ok(())
    }

    /// Run the syscall for context `ctx` and report its outcome.
    pub fn execute(&mut self, kernel: &mut Kernel, system: &mut System, ctx: ContextId) -> Result<()> {
        use SyscallCode::*;

        match self.code {
            Exit | ExitGroup => self.execute_exit(kernel, ctx)?,
            Fork => self.execute_fork(kernel, ctx)?,
            Clone => self.execute_clone(kernel, ctx)?,
            Read => self.execute_read(kernel, system, ctx)?,
            Write => self.execute_write(kernel, system, ctx)?,
            Writev => self.execute_writev(kernel, system, ctx)?,
            Close => self.execute_close(system)?,
            Waitpid | Wait4 => self.execute_wait(kernel, system, ctx)?,
            Kill => self.execute_kill(kernel)?,
            Nanosleep => self.execute_nanosleep(kernel, system, ctx)?,
            Poll => self.execute_poll(kernel, system, ctx)?,
            RtSigsuspend => self.execute_sigsuspend(kernel, system, ctx)?,
            Getpid => self.result = Some(Ok(kernel.pid(ctx)?)),
            Getppid => self.result = Some(Ok(kernel.parent_pid(ctx)?)),
            code => {
                let context = kernel.context_mut(ctx)?;
                match code {
                    Open => self.execute_open(context)?,
                    Pipe => self.execute_pipe(context, system)?,
                    Time => self.execute_time(context)?,
                    Times => self.execute_times(context)?,
                    Brk => self.execute_brk(context)?,
                    Ioctl => self.execute_ioctl(context)?,
                    Setrlimit | Getrlimit => self.execute_rlimit(context, system)?,
                    Getrusage => self.execute_getrusage(context)?,
                    Readlink => self.execute_readlink(context)?,
                    Mmap | Mmap2 => self.execute_mmap(context)?,
                    Munmap => self.execute_munmap(context)?,
                    Mremap => self.execute_mremap(context)?,
                    Stat | Lstat | Fstat | Stat64 | Lstat64 | Fstat64 => self.execute_stat(context)?,
                    Llseek => self.execute_llseek(context)?,
                    Sysctl => self.execute_sysctl(context)?,
                    RtSigaction => self.execute_sigaction(context, system)?,
                    RtSigprocmask => self.execute_sigprocmask(context)?,
                    Getcwd => self.execute_getcwd(context)?,
                    Fcntl64 => self.execute_fcntl(context)?,
                    _ => self.execute_host(context)?,
                }
            }
        }

        let [a0, a1, a2, a3] = self.args;
        debug!(
            "ctx{ctx} 0x{:08x}: {}(0x{a0:x}, 0x{a1:x}, 0x{a2:x}, 0x{a3:x}) = {:?}",
            self.pc,
            self.code.name(),
            self.result
        );

        self.write_back(kernel, ctx)
    }

    fn write_back(&self, kernel: &mut Kernel, ctx: ContextId) -> Result<()> {
        if let Some(result) = self.result {
            kernel.context_mut(ctx)?.syscall_return(result);
        }
        Ok(())
    }
}
