use std::{
    fmt::{self, Display},
    rc::Rc,
};

use bitflags::bitflags;
use mipsemu_common::mips::{decode_instruction, Instruction, Register};

use super::{process::Process, ContextId};
use crate::{
    cpu::RegisterFile,
    memory::Memory,
    system::{host::HostResult, signal::SignalState},
};

bitflags! {
    /// Context status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ContextStatus: u8 {
        const ALIVE = 1 << 0;
        const RUNNING = 1 << 1;
        const SPECULATIVE = 1 << 2;
        const SUSPENDED = 1 << 3;
        const FINISHED = 1 << 4;
        const EXCLUSIVE = 1 << 5;
        const LOCKED = 1 << 6;
    }
}

impl ContextStatus {
    const NAMES: [(Self, &'static str); 7] = [
        (Self::ALIVE, "alive"),
        (Self::RUNNING, "running"),
        (Self::SPECULATIVE, "spec"),
        (Self::SUSPENDED, "suspended"),
        (Self::FINISHED, "finished"),
        (Self::EXCLUSIVE, "excl"),
        (Self::LOCKED, "locked"),
    ];
}

impl Display for ContextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{{{}}}", names.join("|"))
    }
}

/// One simulated process or thread.
#[derive(Debug)]
pub struct Context {
    pub id: ContextId,
    pub pid: u32,
    pub status: ContextStatus,
    pub parent: Option<ContextId>,
    pub(super) prev: ContextId,
    pub(super) next: ContextId,
    pub child_count: usize,

    pub registers: RegisterFile,
    /// Snapshot taken when speculative execution starts.
    pub(super) recovery: RegisterFile,
    pub memory: Memory,

    /// Last decoded instruction and its effective address.
    pub instruction: Instruction,
    pub effective_address: u32,

    backtrace: Vec<u32>,
    backtrace_depth: usize,
    max_backtrace: usize,

    /// Signal raised in the parent when this context finishes.
    pub finish_signal: u32,
    pub exit_code: u32,
    pub signals: SignalState,

    pub process: Rc<Process>,
}

impl Context {
    pub(super) fn new(
        id: ContextId,
        pid: u32,
        registers: RegisterFile,
        memory: Memory,
        process: Rc<Process>,
        max_backtrace: usize,
    ) -> Self {
        Self {
            id,
            pid,
            status: ContextStatus::ALIVE | ContextStatus::RUNNING,
            parent: None,
            prev: id,
            next: id,
            child_count: 0,
            registers,
            recovery: RegisterFile::default(),
            memory,
            instruction: decode_instruction(0),
            effective_address: 0,
            backtrace: Vec::with_capacity(max_backtrace),
            backtrace_depth: 0,
            max_backtrace,
            finish_signal: 0,
            exit_code: 0,
            signals: SignalState::default(),
            process,
        }
    }

    pub fn is(&self, flag: ContextStatus) -> bool {
        self.status.contains(flag)
    }

    pub fn is_running(&self) -> bool {
        self.is(ContextStatus::RUNNING)
    }

    pub fn is_speculative(&self) -> bool {
        self.is(ContextStatus::SPECULATIVE)
    }

    pub fn is_finished(&self) -> bool {
        self.is(ContextStatus::FINISHED)
    }

    /// Running iff alive and neither finished, suspended nor locked.
    pub(super) fn update_running(&mut self) {
        let running = self.is(ContextStatus::ALIVE)
            && !self.is(ContextStatus::FINISHED)
            && !self.is(ContextStatus::SUSPENDED)
            && !self.is(ContextStatus::LOCKED);
        self.status.set(ContextStatus::RUNNING, running);
    }

    pub fn gpr(&self, register: Register) -> u32 {
        self.registers.gpr(register as u32)
    }

    pub fn set_gpr(&mut self, register: Register, value: u32) {
        self.registers.set_gpr(register as u32, value);
    }

    /// Report a syscall outcome: `v0` holds the value or the errno and
    /// `a3` flags the error.
    pub fn syscall_return(&mut self, result: HostResult) {
        match result {
            Ok(value) => {
                self.set_gpr(Register::V0, value);
                self.set_gpr(Register::A3, 0);
            }
            Err(errno) => {
                self.set_gpr(Register::V0, errno as u32);
                self.set_gpr(Register::A3, 1);
            }
        }
    }

    pub(super) fn inherit_backtrace(&mut self, parent: &Context) {
        self.backtrace.clone_from(&parent.backtrace);
        self.backtrace_depth = parent.backtrace_depth;
    }

    /// Record a call from `pc`. The depth keeps counting once the frame
    /// array is full so returns stay balanced.
    pub fn push_call(&mut self, pc: u32) {
        if self.backtrace_depth < self.max_backtrace {
            self.backtrace.truncate(self.backtrace_depth);
            self.backtrace.push(pc);
        }
        self.backtrace_depth += 1;
    }

    pub fn pop_call(&mut self) {
        self.backtrace_depth = self.backtrace_depth.saturating_sub(1);
    }

    /// Call sites, outermost first.
    pub fn backtrace(&self) -> &[u32] {
        &self.backtrace[..self.backtrace_depth.min(self.backtrace.len())]
    }

    /// Write the backtrace, resolving addresses through the symbol table.
    pub fn write_backtrace(&self, out: &mut impl std::io::Write) -> std::io::Result<()> {
        writeln!(out, "ctx{} backtrace (depth {}):", self.id, self.backtrace_depth)?;
        for (level, &pc) in self.backtrace().iter().enumerate().rev() {
            match self.process.symbols.lookup(pc) {
                Some((name, offset)) => writeln!(out, "  #{level} 0x{pc:08x} <{name}+0x{offset:x}>")?,
                None => writeln!(out, "  #{level} 0x{pc:08x}")?,
            }
        }
        let pc = self.registers.pc;
        match self.process.symbols.lookup(pc) {
            Some((name, offset)) => writeln!(out, "  pc 0x{pc:08x} <{name}+0x{offset:x}>"),
            None => writeln!(out, "  pc 0x{pc:08x}"),
        }
    }
}
