//! Execute driver and run loop.
//!
//! Contexts are stepped one instruction at a time in enumeration order.
//! Every `event_interval` cycles the event queue is scanned and pending
//! signals are delivered; a syscall triggers the same scan right away.

use std::rc::Rc;

use mipsemu_common::{memory::MemoryProcessor, mips::decode_instruction};
use mipsemu_config::{ContextEntry, KernelConfig};
use tracing::{debug, warn};

use super::instructions::{self, effective_address, ExecResult, Machine};
use crate::{
    elf::ElfFile,
    error::{Result, VMErrorKind},
    kernel::{Context, ContextId, ContextStatus, Kernel, Process},
    system::{syscall::SyscallInstruction, System},
};

#[derive(Debug)]
pub struct Emulator {
    pub kernel: Kernel,
    pub system: System,

    /// Context holding the outstanding load-linked reservation.
    reservation: Option<ContextId>,

    cycle: u64,

    /// Non-speculative, non-null instructions executed by all contexts.
    executed: u64,

    event_interval: u64,
}

impl Emulator {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            kernel: Kernel::new(config),
            system: System::default(),
            reservation: None,
            cycle: 0,
            executed: 0,
            event_interval: config.event_interval.max(1),
        }
    }

    /// Create a top-level context running the program described by `entry`.
    pub fn load_program(&mut self, entry: &ContextEntry) -> Result<ContextId> {
        let id = self.kernel.create()?;
        let context = self.kernel.context_mut(id)?;
        let process = Process::load(entry, &mut context.memory, &mut context.registers)?;
        context.process = Rc::new(process);
        debug!("ctx{id} loaded {}", entry.exe.display());
        Ok(id)
    }

    /// Like [`Emulator::load_program`], for an already parsed executable.
    pub fn load_elf(&mut self, entry: &ContextEntry, elf: ElfFile) -> Result<ContextId> {
        let id = self.kernel.create()?;
        let context = self.kernel.context_mut(id)?;
        let process = Process::from_elf(entry, elf, &mut context.memory, &mut context.registers)?;
        context.process = Rc::new(process);
        Ok(id)
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Execute the next instruction of `ctx`.
    ///
    /// Returns `false` when a speculative context reaches an instruction it
    /// cannot execute on the wrong path (a syscall, a halt, an unknown
    /// word); nothing past the register and overlay updates happens then.
    pub fn execute_one(&mut self, ctx: ContextId) -> Result<bool> {
        self.step(ctx).map_err(|err| {
            let pc = self.kernel.get(ctx).map_or(0, |context| context.registers.pc);
            err.in_context(ctx, pc)
        })
    }

    fn step(&mut self, ctx: ContextId) -> Result<bool> {
        let Self {
            kernel,
            reservation,
            executed,
            ..
        } = &mut *self;

        let context = kernel.context_mut(ctx)?;
        if !context.is_running() {
            return Err(VMErrorKind::NotRunning(ctx).into());
        }
        // Another context may be waiting on the exclusive window.
        if context.is_speculative() && context.is(ContextStatus::EXCLUSIVE) {
            return Ok(false);
        }

        context.registers.advance_pc();
        let pc = context.registers.pc;
        let ins = decode_instruction(context.memory.read_word(pc)?);
        context.instruction = ins;
        context.effective_address = effective_address(&context.registers, &ins);

        let mut machine = Machine {
            registers: &mut context.registers,
            memory: &mut context.memory,
            context: ctx,
            reservation,
        };
        let result = instructions::execute(&mut machine, &ins)?;

        let speculative = context.is_speculative();
        if !speculative {
            if ins.word != 0 {
                *executed += 1;
            }
            if ins.is_call() {
                context.push_call(pc);
            } else if ins.is_return() {
                context.pop_call();
            }
        }

        if speculative && result != ExecResult::Ok {
            return Ok(false);
        }

        if !speculative
            && context.is(ContextStatus::EXCLUSIVE)
            && (result != ExecResult::Ok || ins.is_memory())
        {
            kernel.leave_exclusive(ctx)?;
        }

        match result {
            ExecResult::Ok | ExecResult::EndRmw => {}
            ExecResult::NotImplemented => {
                return Err(VMErrorKind::UnimplementedInstruction(ins).into());
            }
            ExecResult::FormatError => return Err(VMErrorKind::FormatError(ins).into()),
            ExecResult::Finish => kernel.finish(ctx)?,
            ExecResult::Syscall => self.syscall(ctx)?,
            ExecResult::StartRmw => kernel.enter_exclusive(ctx)?,
        }
        Ok(true)
    }

    fn syscall(&mut self, ctx: ContextId) -> Result<()> {
        let mut syscall = SyscallInstruction::decode(self.kernel.context(ctx)?)?;
        syscall.execute(&mut self.kernel, &mut self.system, ctx)?;

        self.process_events()?;
        self.process_signals()
    }

    /// Count one cycle, scanning events and signals when the interval
    /// elapses.
    pub fn new_cycle(&mut self) -> Result<()> {
        self.cycle += 1;
        if self.cycle % self.event_interval == 0 {
            self.process_events()?;
            self.process_signals()?;
        }
        Ok(())
    }

    /// Whether every context has finished.
    pub fn is_done(&self) -> bool {
        self.kernel.active_count() == 0
    }

    /// Execute one instruction of every running context, then advance the
    /// cycle.
    pub fn run_round(&mut self) -> Result<()> {
        for id in self.kernel.ids() {
            if self.kernel.get(id).is_some_and(Context::is_running) {
                self.execute_one(id)?;
            }
        }
        self.new_cycle()
    }

    /// Run until no context is active and return the number of executed
    /// instructions.
    pub fn run(&mut self) -> Result<u64> {
        while !self.is_done() {
            self.run_round()?;
        }
        Ok(self.executed)
    }

    /// Drop pending events and free every context.
    pub fn shutdown(&mut self) -> Result<()> {
        self.system.events.clear();
        self.kernel.shutdown()
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("shutdown failed: {}", err.source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mipsemu_common::{
        constants::{DATA_BASE, PAGE_SIZE, SYSCALL_BASE, TEXT_BASE},
        mips::{encode_branch, encode_i_type, encode_j_type, encode_r_type, Opcode, Register},
    };

    const SYSCALL: u32 = 0x0000_000c;
    const BREAK: u32 = 0x0000_000d;

    fn li(rt: Register, value: u16) -> u32 {
        encode_i_type(Opcode::ADDIU, rt, Register::Zero, value)
    }

    /// Emulator with one context whose text is `program` at `TEXT_BASE`.
    fn emulator_with(program: &[u32]) -> (Emulator, ContextId) {
        let mut emulator = Emulator::new(&KernelConfig::default());
        let ctx = emulator.kernel.create().unwrap();
        let context = emulator.kernel.context_mut(ctx).unwrap();
        for (i, &word) in program.iter().enumerate() {
            context.memory.write_word(TEXT_BASE + 4 * i as u32, word).unwrap();
        }
        context.registers.start_at(TEXT_BASE);
        context.set_gpr(Register::Sp, DATA_BASE + 16 * PAGE_SIZE);
        (emulator, ctx)
    }

    #[test]
    fn test_execute_one_advances_pipeline() {
        let (mut emulator, ctx) = emulator_with(&[li(Register::T0, 7), li(Register::T1, 8)]);
        assert_eq!(emulator.execute_one(ctx), Ok(true));

        let context = emulator.kernel.context(ctx).unwrap();
        assert_eq!(context.registers.pc, TEXT_BASE);
        assert_eq!(context.registers.npc, TEXT_BASE + 4);
        assert_eq!(context.gpr(Register::T0), 7);
        assert_eq!(context.instruction.opcode, Opcode::ADDIU);
        assert_eq!(emulator.executed(), 1);
    }

    #[test]
    fn test_null_words_are_not_counted() {
        let (mut emulator, ctx) = emulator_with(&[0, 0, li(Register::T0, 1)]);
        for _ in 0..3 {
            emulator.execute_one(ctx).unwrap();
        }
        assert_eq!(emulator.executed(), 1);
    }

    #[test]
    fn test_break_finishes() {
        let (mut emulator, ctx) = emulator_with(&[BREAK]);
        assert_eq!(emulator.run(), Ok(1));
        assert!(emulator.kernel.context(ctx).unwrap().is_finished());
        assert_eq!(emulator.kernel.zombies().next().map(|z| z.exit_code), Some(0));
    }

    #[test]
    fn test_exit_syscall() {
        let (mut emulator, ctx) = emulator_with(&[
            li(Register::V0, (SYSCALL_BASE + 1) as u16),
            li(Register::A0, 3),
            SYSCALL,
        ]);
        assert_eq!(emulator.run(), Ok(3));
        assert_eq!(emulator.kernel.context(ctx).unwrap().exit_code, 3);
    }

    #[test]
    fn test_unimplemented_instruction_is_fatal() {
        let (mut emulator, ctx) = emulator_with(&[0xfc00_0000]);
        let err = emulator.execute_one(ctx).unwrap_err();
        assert!(matches!(
            err.source,
            VMErrorKind::ContextFault(0, TEXT_BASE, ref kind)
                if matches!(**kind, VMErrorKind::UnimplementedInstruction(_))
        ));
    }

    #[test]
    fn test_stepping_suspended_context_fails() {
        let (mut emulator, ctx) = emulator_with(&[0]);
        emulator.kernel.suspend(ctx).unwrap();
        assert!(emulator.execute_one(ctx).is_err());
    }

    #[test]
    fn test_backtrace_follows_calls() {
        let target = TEXT_BASE + 0x100;
        let mut program = vec![encode_j_type(Opcode::JAL, target), 0];
        program.resize(0x40, 0);
        program.extend([encode_r_type(Opcode::JR, Register::Zero, Register::Ra, Register::Zero), 0]);
        let (mut emulator, ctx) = emulator_with(&program);

        emulator.execute_one(ctx).unwrap();
        assert_eq!(emulator.kernel.context(ctx).unwrap().backtrace(), &[TEXT_BASE]);

        // Delay slot, then the return and its delay slot
        for _ in 0..3 {
            emulator.execute_one(ctx).unwrap();
        }
        let context = emulator.kernel.context(ctx).unwrap();
        assert!(context.backtrace().is_empty());
        assert_eq!(context.registers.npc, TEXT_BASE + 8);
    }

    #[test]
    fn test_speculative_syscall_is_refused() {
        let (mut emulator, ctx) = emulator_with(&[0, 0, 0, SYSCALL]);
        emulator.execute_one(ctx).unwrap();
        assert_eq!(emulator.kernel.set_branch_target(ctx, TEXT_BASE + 12), Ok(true));

        assert_eq!(emulator.execute_one(ctx), Ok(false));
        assert_eq!(emulator.kernel.context(ctx).unwrap().registers.pc, TEXT_BASE + 12);
        assert_eq!(emulator.executed(), 0);

        emulator.kernel.recover(ctx).unwrap();
        let context = emulator.kernel.context(ctx).unwrap();
        assert!(!context.is_speculative());
        assert_eq!(context.registers.npc, TEXT_BASE + 4);
    }

    #[test]
    fn test_ll_sc_exclusive_window() {
        let (mut emulator, ctx) = emulator_with(&[
            encode_i_type(Opcode::LL, Register::T0, Register::Sp, 0),
            encode_i_type(Opcode::ADDIU, Register::T0, Register::T0, 1),
            encode_i_type(Opcode::SC, Register::T0, Register::Sp, 0),
        ]);
        let other = emulator.kernel.create().unwrap();

        emulator.execute_one(ctx).unwrap();
        assert!(emulator.kernel.context(ctx).unwrap().is(ContextStatus::EXCLUSIVE));
        assert!(!emulator.kernel.context(other).unwrap().is_running());

        emulator.execute_one(ctx).unwrap();
        assert!(!emulator.kernel.context(other).unwrap().is_running());

        emulator.execute_one(ctx).unwrap();
        let context = emulator.kernel.context(ctx).unwrap();
        assert!(!context.is(ContextStatus::EXCLUSIVE));
        assert_eq!(context.gpr(Register::T0), 1);
        assert!(emulator.kernel.context(other).unwrap().is_running());
    }

    #[test]
    fn test_no_speculation_inside_exclusive_window() {
        let (mut emulator, ctx) = emulator_with(&[
            encode_i_type(Opcode::LL, Register::T0, Register::Sp, 0),
            encode_i_type(Opcode::ADDIU, Register::T0, Register::T0, 1),
            encode_i_type(Opcode::SC, Register::T0, Register::Sp, 0),
        ]);
        let other = emulator.kernel.create().unwrap();

        emulator.execute_one(ctx).unwrap();
        assert_eq!(emulator.kernel.set_branch_target(ctx, TEXT_BASE + 8), Ok(true));
        assert_eq!(emulator.execute_one(ctx), Ok(false));
        assert_eq!(emulator.kernel.context(ctx).unwrap().registers.pc, TEXT_BASE);
        assert!(emulator.kernel.context(ctx).unwrap().is(ContextStatus::EXCLUSIVE));
        assert!(!emulator.kernel.context(other).unwrap().is_running());

        emulator.kernel.recover(ctx).unwrap();
        assert_eq!(emulator.execute_one(ctx), Ok(true));
        assert_eq!(emulator.execute_one(ctx), Ok(true));
        assert!(!emulator.kernel.context(ctx).unwrap().is(ContextStatus::EXCLUSIVE));
        assert!(emulator.kernel.context(other).unwrap().is_running());
    }

    #[test]
    fn test_counted_loop() {
        // t0 = 100; loop: t0 -= 1; bne t0, zero, loop; nop; break
        let (mut emulator, _) = emulator_with(&[
            li(Register::T0, 100),
            encode_i_type(Opcode::ADDIU, Register::T0, Register::T0, (-1i16) as u16),
            encode_branch(Opcode::BNE, Register::T0, Register::Zero, -8),
            0,
            BREAK,
        ]);
        assert_eq!(emulator.run(), Ok(1 + 2 * 100 + 1));
    }

    #[test]
    fn test_shutdown_drops_everything() {
        let (mut emulator, _) = emulator_with(&[0]);
        emulator.shutdown().unwrap();
        assert_eq!(emulator.kernel.alive_count(), 0);
        assert!(emulator.system.events.is_empty());
    }
}
