//! Integer arithmetic, logic, shifts and the HI/LO unit.
//!
//! `add`/`addi`/`sub` share the wrapping handlers with their unsigned
//! forms; overflow traps are not modeled.

use mipsemu_common::mips::Instruction;

use super::{
    macros::{
        define_immediate_instruction, define_register_instruction, define_shift_instruction,
    },
    ExecResult, Machine,
};
use crate::error::Result;

define_register_instruction!(execute_addu, |rs: u32, rt: u32| rs.wrapping_add(rt));
define_register_instruction!(execute_subu, |rs: u32, rt: u32| rs.wrapping_sub(rt));
define_register_instruction!(execute_and, |rs: u32, rt: u32| rs & rt);
define_register_instruction!(execute_or, |rs: u32, rt: u32| rs | rt);
define_register_instruction!(execute_xor, |rs: u32, rt: u32| rs ^ rt);
define_register_instruction!(execute_nor, |rs: u32, rt: u32| !(rs | rt));
define_register_instruction!(execute_slt, |rs: u32, rt: u32| ((rs as i32) < (rt as i32)) as u32);
define_register_instruction!(execute_sltu, |rs: u32, rt: u32| (rs < rt) as u32);
define_register_instruction!(execute_mul, |rs: u32, rt: u32| (rs as i32).wrapping_mul(rt as i32) as u32);

define_immediate_instruction!(execute_addiu, |rs: u32, ins: &Instruction| rs.wrapping_add(ins.imm() as u32));
define_immediate_instruction!(execute_slti, |rs: u32, ins: &Instruction| ((rs as i32) < ins.imm()) as u32);
define_immediate_instruction!(execute_sltiu, |rs: u32, ins: &Instruction| (rs < ins.imm() as u32) as u32);
define_immediate_instruction!(execute_andi, |rs: u32, ins: &Instruction| rs & ins.uimm());
define_immediate_instruction!(execute_ori, |rs: u32, ins: &Instruction| rs | ins.uimm());
define_immediate_instruction!(execute_xori, |rs: u32, ins: &Instruction| rs ^ ins.uimm());
define_immediate_instruction!(execute_lui, |_rs: u32, ins: &Instruction| ins.uimm() << 16);

define_shift_instruction!(execute_sll, |rt: u32, sa: u32| rt << sa, shamt);
define_shift_instruction!(execute_srl, |rt: u32, sa: u32| rt >> sa, shamt);
define_shift_instruction!(execute_sra, |rt: u32, sa: u32| ((rt as i32) >> sa) as u32, shamt);
define_shift_instruction!(execute_sllv, |rt: u32, sa: u32| rt << sa, variable);
define_shift_instruction!(execute_srlv, |rt: u32, sa: u32| rt >> sa, variable);
define_shift_instruction!(execute_srav, |rt: u32, sa: u32| ((rt as i32) >> sa) as u32, variable);

pub fn execute_clz(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let rs = machine.registers.gpr(ins.rs());
    machine.registers.set_gpr(ins.rd(), rs.leading_zeros());
    Ok(ExecResult::Ok)
}

pub fn execute_clo(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let rs = machine.registers.gpr(ins.rs());
    machine.registers.set_gpr(ins.rd(), rs.leading_ones());
    Ok(ExecResult::Ok)
}

pub fn execute_movz(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    if machine.registers.gpr(ins.rt()) == 0 {
        let rs = machine.registers.gpr(ins.rs());
        machine.registers.set_gpr(ins.rd(), rs);
    }
    Ok(ExecResult::Ok)
}

pub fn execute_movn(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    if machine.registers.gpr(ins.rt()) != 0 {
        let rs = machine.registers.gpr(ins.rs());
        machine.registers.set_gpr(ins.rd(), rs);
    }
    Ok(ExecResult::Ok)
}

/// `movf`/`movt`: move when the FP condition code equals the `tf` bit.
pub fn execute_movci(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    if machine.registers.fpcc(ins.cc()) == ins.tf() {
        let rs = machine.registers.gpr(ins.rs());
        machine.registers.set_gpr(ins.rd(), rs);
    }
    Ok(ExecResult::Ok)
}

pub fn execute_mfhi(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let hi = machine.registers.hi;
    machine.registers.set_gpr(ins.rd(), hi);
    Ok(ExecResult::Ok)
}

pub fn execute_mflo(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let lo = machine.registers.lo;
    machine.registers.set_gpr(ins.rd(), lo);
    Ok(ExecResult::Ok)
}

pub fn execute_mthi(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    machine.registers.hi = machine.registers.gpr(ins.rs());
    Ok(ExecResult::Ok)
}

pub fn execute_mtlo(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    machine.registers.lo = machine.registers.gpr(ins.rs());
    Ok(ExecResult::Ok)
}

fn hilo(machine: &Machine) -> u64 {
    ((machine.registers.hi as u64) << 32) | machine.registers.lo as u64
}

fn set_hilo(machine: &mut Machine, value: u64) {
    machine.registers.hi = (value >> 32) as u32;
    machine.registers.lo = value as u32;
}

fn signed_product(machine: &Machine, ins: &Instruction) -> i64 {
    let rs = machine.registers.gpr(ins.rs()) as i32 as i64;
    let rt = machine.registers.gpr(ins.rt()) as i32 as i64;
    rs * rt
}

fn unsigned_product(machine: &Machine, ins: &Instruction) -> u64 {
    let rs = machine.registers.gpr(ins.rs()) as u64;
    let rt = machine.registers.gpr(ins.rt()) as u64;
    rs * rt
}

pub fn execute_mult(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let product = signed_product(machine, ins);
    set_hilo(machine, product as u64);
    Ok(ExecResult::Ok)
}

pub fn execute_multu(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let product = unsigned_product(machine, ins);
    set_hilo(machine, product);
    Ok(ExecResult::Ok)
}

pub fn execute_madd(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let value = (hilo(machine) as i64).wrapping_add(signed_product(machine, ins));
    set_hilo(machine, value as u64);
    Ok(ExecResult::Ok)
}

pub fn execute_maddu(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let value = hilo(machine).wrapping_add(unsigned_product(machine, ins));
    set_hilo(machine, value);
    Ok(ExecResult::Ok)
}

pub fn execute_msub(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let value = (hilo(machine) as i64).wrapping_sub(signed_product(machine, ins));
    set_hilo(machine, value as u64);
    Ok(ExecResult::Ok)
}

pub fn execute_msubu(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let value = hilo(machine).wrapping_sub(unsigned_product(machine, ins));
    set_hilo(machine, value);
    Ok(ExecResult::Ok)
}

/// HI and LO are left untouched on division by zero.
pub fn execute_div(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let rs = machine.registers.gpr(ins.rs()) as i32;
    let rt = machine.registers.gpr(ins.rt()) as i32;
    if rt != 0 {
        machine.registers.lo = rs.wrapping_div(rt) as u32;
        machine.registers.hi = rs.wrapping_rem(rt) as u32;
    }
    Ok(ExecResult::Ok)
}

pub fn execute_divu(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let rs = machine.registers.gpr(ins.rs());
    let rt = machine.registers.gpr(ins.rt());
    if rt != 0 {
        machine.registers.lo = rs / rt;
        machine.registers.hi = rs % rt;
    }
    Ok(ExecResult::Ok)
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::TestMachine;
    use mipsemu_common::mips::{encode_i_type, encode_r_type, encode_shift, Opcode, Register};

    use Register::*;

    fn machine_with(values: &[(Register, u32)]) -> TestMachine {
        let mut machine = TestMachine::default();
        for &(reg, value) in values {
            machine.registers.set_gpr(reg as u32, value);
        }
        machine
    }

    #[test]
    fn test_register_arithmetic() {
        let mut machine = machine_with(&[(A0, 0xffff_ffff), (A1, 2)]);

        machine.run(encode_r_type(Opcode::ADDU, V0, A0, A1));
        assert_eq!(machine.registers.gpr(V0 as u32), 1);

        machine.run(encode_r_type(Opcode::SUBU, V0, A1, A0));
        assert_eq!(machine.registers.gpr(V0 as u32), 3);

        machine.run(encode_r_type(Opcode::SLT, V0, A0, A1));
        assert_eq!(machine.registers.gpr(V0 as u32), 1);

        machine.run(encode_r_type(Opcode::SLTU, V0, A0, A1));
        assert_eq!(machine.registers.gpr(V0 as u32), 0);

        machine.run(encode_r_type(Opcode::NOR, V0, A1, Zero));
        assert_eq!(machine.registers.gpr(V0 as u32), 0xffff_fffd);

        machine.run(encode_r_type(Opcode::MUL, V0, A0, A1));
        assert_eq!(machine.registers.gpr(V0 as u32), (-2i32) as u32);
    }

    #[test]
    fn test_immediates() {
        let mut machine = machine_with(&[(A0, 5)]);

        machine.run(encode_i_type(Opcode::ADDIU, V0, A0, (-6i16) as u16));
        assert_eq!(machine.registers.gpr(V0 as u32), 0xffff_ffff);

        machine.run(encode_i_type(Opcode::LUI, V1, Zero, 0x1234));
        assert_eq!(machine.registers.gpr(V1 as u32), 0x1234_0000);

        machine.run(encode_i_type(Opcode::ORI, V1, V1, 0x8765));
        assert_eq!(machine.registers.gpr(V1 as u32), 0x1234_8765);

        // The sign-extended immediate compares as unsigned
        machine.run(encode_i_type(Opcode::SLTIU, V0, A0, 0xffff));
        assert_eq!(machine.registers.gpr(V0 as u32), 1);

        machine.run(encode_i_type(Opcode::SLTI, V0, A0, 0xffff));
        assert_eq!(machine.registers.gpr(V0 as u32), 0);
    }

    #[test]
    fn test_shifts() {
        let mut machine = machine_with(&[(A0, 0x8000_0010), (A1, 33)]);

        machine.run(encode_shift(Opcode::SRA, V0, A0, 4));
        assert_eq!(machine.registers.gpr(V0 as u32), 0xf800_0001);

        machine.run(encode_shift(Opcode::SRL, V0, A0, 4));
        assert_eq!(machine.registers.gpr(V0 as u32), 0x0800_0001);

        // Variable shifts only use the low five bits of rs
        machine.run(encode_r_type(Opcode::SLLV, V0, A1, A0));
        assert_eq!(machine.registers.gpr(V0 as u32), 0x0000_0020);
    }

    #[test]
    fn test_hi_lo() {
        let mut machine = machine_with(&[(A0, (-3i32) as u32), (A1, 7)]);

        machine.run(encode_r_type(Opcode::MULT, Zero, A0, A1));
        assert_eq!((machine.registers.hi, machine.registers.lo), (0xffff_ffff, (-21i32) as u32));

        machine.run(encode_r_type(Opcode::MULTU, Zero, A0, A1));
        assert_eq!((machine.registers.hi, machine.registers.lo), (6, 0xffff_ffeb));

        machine.run(encode_r_type(Opcode::DIV, Zero, A0, A1));
        assert_eq!(machine.registers.lo, 0);
        assert_eq!(machine.registers.hi, (-3i32) as u32);

        // Division by zero keeps the previous result
        machine.run(encode_r_type(Opcode::DIVU, Zero, A1, Zero));
        assert_eq!(machine.registers.hi, (-3i32) as u32);

        machine.run(encode_r_type(Opcode::MFHI, V0, Zero, Zero));
        assert_eq!(machine.registers.gpr(V0 as u32), (-3i32) as u32);
    }

    #[test]
    fn test_multiply_accumulate() {
        let mut machine = machine_with(&[(A0, 3), (A1, 4)]);
        machine.registers.hi = 0;
        machine.registers.lo = 100;

        machine.run(encode_r_type(Opcode::MADD, Zero, A0, A1));
        assert_eq!((machine.registers.hi, machine.registers.lo), (0, 112));

        machine.run(encode_r_type(Opcode::MSUB, Zero, A0, A1));
        machine.run(encode_r_type(Opcode::MSUB, Zero, A0, A1));
        assert_eq!((machine.registers.hi, machine.registers.lo), (0, 88));

        machine.registers.lo = 0;
        machine.run(encode_r_type(Opcode::MSUBU, Zero, A0, A1));
        assert_eq!((machine.registers.hi, machine.registers.lo), (0xffff_ffff, (-12i32) as u32));
    }

    #[test]
    fn test_conditional_moves_and_counts() {
        let mut machine = machine_with(&[(A0, 0x00ff_0000), (A1, 1)]);

        machine.run(encode_r_type(Opcode::MOVZ, V0, A0, A1));
        assert_eq!(machine.registers.gpr(V0 as u32), 0);

        machine.run(encode_r_type(Opcode::MOVN, V0, A0, A1));
        assert_eq!(machine.registers.gpr(V0 as u32), 0x00ff_0000);

        machine.run(encode_r_type(Opcode::CLZ, V1, A0, Zero));
        assert_eq!(machine.registers.gpr(V1 as u32), 8);

        machine.registers.set_gpr(A0 as u32, 0xf000_0000);
        machine.run(encode_r_type(Opcode::CLO, V1, A0, Zero));
        assert_eq!(machine.registers.gpr(V1 as u32), 4);

        // movt $v0, $a1, $fcc0 with the condition clear
        machine.run(encode_r_type(Opcode::MOVT, V0, A1, Zero));
        assert_eq!(machine.registers.gpr(V0 as u32), 0x00ff_0000);
        machine.registers.set_fpcc(0, true);
        machine.run(encode_r_type(Opcode::MOVT, V0, A1, Zero));
        assert_eq!(machine.registers.gpr(V0 as u32), 1);
    }
}
