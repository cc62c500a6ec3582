//! Instruction handlers.
//!
//! Every decoded [`Opcode`] maps to exactly one handler through
//! [`executor`]. Handlers only touch the state handed to them in a
//! [`Machine`]: the executing context's registers and memory, and the
//! emulator-wide load-linked reservation.

mod alu;
mod branch;
mod fpu;
mod macros;
mod memory;

use mipsemu_common::mips::{Instruction, Opcode};

use crate::{cpu::RegisterFile, error::Result, kernel::ContextId, memory::Memory};

/// Outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    Ok,
    NotImplemented,
    /// `break`: the context is done.
    Finish,
    Syscall,
    /// Floating point format field invalid for the opcode.
    FormatError,
    /// `ll` opened a read-modify-write window.
    StartRmw,
    /// `sc` closed it.
    EndRmw,
}

/// State visible to an instruction handler.
pub struct Machine<'a> {
    pub registers: &'a mut RegisterFile,
    pub memory: &'a mut Memory,
    pub context: ContextId,
    /// Context holding the outstanding `ll` reservation.
    pub reservation: &'a mut Option<ContextId>,
}

pub type InstructionExecutorFn = fn(&mut Machine, &Instruction) -> Result<ExecResult>;

/// Base register plus sign-extended immediate.
pub fn effective_address(registers: &RegisterFile, ins: &Instruction) -> u32 {
    registers.gpr(ins.rs()).wrapping_add(ins.imm() as u32)
}

fn execute_nop(_: &mut Machine, _: &Instruction) -> Result<ExecResult> {
    Ok(ExecResult::Ok)
}

fn execute_syscall(_: &mut Machine, _: &Instruction) -> Result<ExecResult> {
    Ok(ExecResult::Syscall)
}

fn execute_break(_: &mut Machine, _: &Instruction) -> Result<ExecResult> {
    Ok(ExecResult::Finish)
}

fn execute_unknown(_: &mut Machine, _: &Instruction) -> Result<ExecResult> {
    Ok(ExecResult::NotImplemented)
}

/// Handler for `opcode`.
pub fn executor(opcode: Opcode) -> InstructionExecutorFn {
    use Opcode::*;

    match opcode {
        NOP | SYNC | PREF => execute_nop,
        SYSCALL => execute_syscall,
        BREAK => execute_break,

        SLL => alu::execute_sll,
        SRL => alu::execute_srl,
        SRA => alu::execute_sra,
        SLLV => alu::execute_sllv,
        SRLV => alu::execute_srlv,
        SRAV => alu::execute_srav,
        MOVZ => alu::execute_movz,
        MOVN => alu::execute_movn,
        MOVF | MOVT => alu::execute_movci,
        MFHI => alu::execute_mfhi,
        MTHI => alu::execute_mthi,
        MFLO => alu::execute_mflo,
        MTLO => alu::execute_mtlo,
        MULT => alu::execute_mult,
        MULTU => alu::execute_multu,
        DIV => alu::execute_div,
        DIVU => alu::execute_divu,
        ADD | ADDU => alu::execute_addu,
        SUB | SUBU => alu::execute_subu,
        AND => alu::execute_and,
        OR => alu::execute_or,
        XOR => alu::execute_xor,
        NOR => alu::execute_nor,
        SLT => alu::execute_slt,
        SLTU => alu::execute_sltu,
        ADDI | ADDIU => alu::execute_addiu,
        SLTI => alu::execute_slti,
        SLTIU => alu::execute_sltiu,
        ANDI => alu::execute_andi,
        ORI => alu::execute_ori,
        XORI => alu::execute_xori,
        LUI => alu::execute_lui,
        MADD => alu::execute_madd,
        MADDU => alu::execute_maddu,
        MSUB => alu::execute_msub,
        MSUBU => alu::execute_msubu,
        MUL => alu::execute_mul,
        CLZ => alu::execute_clz,
        CLO => alu::execute_clo,

        BLTZ => branch::execute_bltz,
        BGEZ => branch::execute_bgez,
        BLTZAL => branch::execute_bltzal,
        BGEZAL => branch::execute_bgezal,
        B | BEQ => branch::execute_beq,
        BAL => branch::execute_bal,
        BNE => branch::execute_bne,
        BLEZ => branch::execute_blez,
        BGTZ => branch::execute_bgtz,
        J => branch::execute_j,
        JAL => branch::execute_jal,
        JR => branch::execute_jr,
        JALR => branch::execute_jalr,
        BC1F | BC1T => branch::execute_bc1,

        LB => memory::execute_lb,
        LBU => memory::execute_lbu,
        LH => memory::execute_lh,
        LHU => memory::execute_lhu,
        LW => memory::execute_lw,
        LWL => memory::execute_lwl,
        LWR => memory::execute_lwr,
        SB => memory::execute_sb,
        SH => memory::execute_sh,
        SW => memory::execute_sw,
        SWL => memory::execute_swl,
        SWR => memory::execute_swr,
        LL => memory::execute_ll,
        SC => memory::execute_sc,
        LWC1 => memory::execute_lwc1,
        SWC1 => memory::execute_swc1,
        LDC1 => memory::execute_ldc1,
        SDC1 => memory::execute_sdc1,

        MFC1 => fpu::execute_mfc1,
        MTC1 => fpu::execute_mtc1,
        CFC1 => fpu::execute_cfc1,
        CTC1 => fpu::execute_ctc1,
        ADD_FMT => fpu::execute_add_fmt,
        SUB_FMT => fpu::execute_sub_fmt,
        MUL_FMT => fpu::execute_mul_fmt,
        DIV_FMT => fpu::execute_div_fmt,
        SQRT_FMT => fpu::execute_sqrt_fmt,
        ABS_FMT => fpu::execute_abs_fmt,
        MOV_FMT => fpu::execute_mov_fmt,
        NEG_FMT => fpu::execute_neg_fmt,
        TRUNC_W | CVT_W => fpu::execute_cvt_w,
        MOVF_FMT | MOVT_FMT => fpu::execute_movci_fmt,
        MOVZ_FMT => fpu::execute_movz_fmt,
        MOVN_FMT => fpu::execute_movn_fmt,
        CVT_S => fpu::execute_cvt_s,
        CVT_D => fpu::execute_cvt_d,
        C_COND_FMT => fpu::execute_c_cond,

        UNKNOWN => execute_unknown,
    }
}

/// Execute one decoded instruction. Register 0 reads as zero afterwards.
pub fn execute(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    executor(ins.opcode)(machine, ins)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use mipsemu_common::mips::decode_instruction;

    /// Registers, memory and reservation for running handlers in isolation.
    #[derive(Default)]
    pub struct TestMachine {
        pub registers: RegisterFile,
        pub memory: Memory,
        pub reservation: Option<ContextId>,
    }

    impl TestMachine {
        pub fn run_as(&mut self, context: ContextId, word: u32) -> ExecResult {
            let ins = decode_instruction(word);
            let mut machine = Machine {
                registers: &mut self.registers,
                memory: &mut self.memory,
                context,
                reservation: &mut self.reservation,
            };
            execute(&mut machine, &ins).expect("handler failed")
        }

        pub fn run(&mut self, word: u32) -> ExecResult {
            self.run_as(0, word)
        }
    }
}
