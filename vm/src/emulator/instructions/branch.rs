//! Branches and jumps. All of them have one delay slot: the target is
//! written to `nnpc`, so the next sequential instruction still runs.

use mipsemu_common::mips::{Instruction, Register};

use super::{macros::define_branch_instruction, ExecResult, Machine};
use crate::error::Result;

define_branch_instruction!(execute_beq, |rs: u32, rt: u32| rs == rt);
define_branch_instruction!(execute_bne, |rs: u32, rt: u32| rs != rt);
define_branch_instruction!(execute_blez, |rs: u32, _rt: u32| (rs as i32) <= 0);
define_branch_instruction!(execute_bgtz, |rs: u32, _rt: u32| (rs as i32) > 0);
define_branch_instruction!(execute_bltz, |rs: u32, _rt: u32| (rs as i32) < 0);
define_branch_instruction!(execute_bgez, |rs: u32, _rt: u32| (rs as i32) >= 0);
define_branch_instruction!(execute_bltzal, |rs: u32, _rt: u32| (rs as i32) < 0, true);
define_branch_instruction!(execute_bgezal, |rs: u32, _rt: u32| (rs as i32) >= 0, true);
define_branch_instruction!(execute_bal, |_rs: u32, _rt: u32| true, true);

pub fn execute_j(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let target = ins.jump_target(machine.registers.pc);
    machine.registers.branch(target);
    Ok(ExecResult::Ok)
}

pub fn execute_jal(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let pc = machine.registers.pc;
    machine.registers.set_gpr(Register::Ra as u32, pc.wrapping_add(8));
    machine.registers.branch(ins.jump_target(pc));
    Ok(ExecResult::Ok)
}

pub fn execute_jr(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let target = machine.registers.gpr(ins.rs());
    machine.registers.branch(target);
    Ok(ExecResult::Ok)
}

/// The target is read before the link register is written, so
/// `jalr $ra, $ra` jumps to the old value.
pub fn execute_jalr(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let target = machine.registers.gpr(ins.rs());
    let pc = machine.registers.pc;
    machine.registers.branch(target);
    machine.registers.set_gpr(ins.rd(), pc.wrapping_add(8));
    Ok(ExecResult::Ok)
}

/// `bc1f`/`bc1t`: taken when the condition code equals the `tf` bit.
pub fn execute_bc1(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    if machine.registers.fpcc(ins.cc()) == ins.tf() {
        let target = ins.branch_target(machine.registers.pc);
        machine.registers.branch(target);
    }
    Ok(ExecResult::Ok)
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::TestMachine;
    use mipsemu_common::mips::{encode_branch, encode_j_type, encode_r_type, Opcode, Register};

    use Register::*;

    const PC: u32 = 0x0040_0100;

    fn machine_at(pc: u32) -> TestMachine {
        let mut machine = TestMachine::default();
        machine.registers.start_at(pc);
        machine.registers.advance_pc();
        assert_eq!(machine.registers.pc, pc);
        machine
    }

    #[test]
    fn test_conditional_branch() {
        let mut machine = machine_at(PC);
        machine.registers.set_gpr(A0 as u32, 1);

        machine.run(encode_branch(Opcode::BNE, A0, Zero, 0x40));
        assert_eq!(machine.registers.npc, PC + 4);
        assert_eq!(machine.registers.nnpc, PC + 4 + 0x40);

        let mut machine = machine_at(PC);
        machine.run(encode_branch(Opcode::BEQ, A0, A1, -0x10));
        assert_eq!(machine.registers.nnpc, PC + 4 - 0x10);

        // Not taken: the pipeline is left alone
        let mut machine = machine_at(PC);
        machine.run(encode_branch(Opcode::BGTZ, Zero, Zero, 0x40));
        assert_eq!(machine.registers.nnpc, PC + 8);
    }

    #[test]
    fn test_link_when_not_taken() {
        let mut machine = machine_at(PC);
        machine.registers.set_gpr(A0 as u32, 5);

        machine.run(encode_branch(Opcode::BLTZAL, A0, Zero, 0x40));
        assert_eq!(machine.registers.gpr(Ra as u32), PC + 8);
        assert_eq!(machine.registers.nnpc, PC + 8);

        let mut machine = machine_at(PC);
        machine.run(encode_branch(Opcode::BAL, Zero, Zero, 0x20));
        assert_eq!(machine.registers.gpr(Ra as u32), PC + 8);
        assert_eq!(machine.registers.nnpc, PC + 4 + 0x20);
    }

    #[test]
    fn test_jumps() {
        let mut machine = machine_at(PC);
        machine.run(encode_j_type(Opcode::JAL, 0x0040_2000));
        assert_eq!(machine.registers.gpr(Ra as u32), PC + 8);
        assert_eq!(machine.registers.nnpc, 0x0040_2000);

        let mut machine = machine_at(PC);
        machine.registers.set_gpr(Ra as u32, 0x0040_0800);
        machine.run(encode_r_type(Opcode::JALR, Ra, Ra, Zero));
        assert_eq!(machine.registers.nnpc, 0x0040_0800);
        assert_eq!(machine.registers.gpr(Ra as u32), PC + 8);

        let mut machine = machine_at(PC);
        machine.registers.set_gpr(T9 as u32, 0x0041_0000);
        machine.run(encode_r_type(Opcode::JR, Zero, T9, Zero));
        assert_eq!(machine.registers.nnpc, 0x0041_0000);
    }

    #[test]
    fn test_fp_condition_branch() {
        let mut machine = machine_at(PC);
        machine.run(encode_branch(Opcode::BC1T, Zero, Zero, 0x40));
        assert_eq!(machine.registers.nnpc, PC + 8);

        machine.run(encode_branch(Opcode::BC1F, Zero, Zero, 0x40));
        assert_eq!(machine.registers.nnpc, PC + 4 + 0x40);
    }
}
