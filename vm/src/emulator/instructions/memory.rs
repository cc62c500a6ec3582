//! Loads and stores, including the unaligned word halves, the
//! load-linked/store-conditional pair and the COP1 transfers.

use mipsemu_common::{
    memory::{MemAccessSize, MemoryProcessor},
    mips::Instruction,
};

use super::{
    effective_address,
    macros::{define_load_instruction, define_store_instruction},
    ExecResult, Machine,
};
use crate::error::Result;

define_load_instruction!(execute_lb, MemAccessSize::Byte, |v: u64| v as u8 as i8 as i32 as u32);
define_load_instruction!(execute_lbu, MemAccessSize::Byte, |v: u64| v as u32);
define_load_instruction!(execute_lh, MemAccessSize::HalfWord, |v: u64| v as u16 as i16 as i32 as u32);
define_load_instruction!(execute_lhu, MemAccessSize::HalfWord, |v: u64| v as u32);
define_load_instruction!(execute_lw, MemAccessSize::Word, |v: u64| v as u32);

define_store_instruction!(execute_sb, MemAccessSize::Byte);
define_store_instruction!(execute_sh, MemAccessSize::HalfWord);
define_store_instruction!(execute_sw, MemAccessSize::Word);

/// Bytes covered by the left half of an unaligned word at `address`.
const fn left_size(address: u32) -> usize {
    4 - (address & 3) as usize
}

/// Bytes covered by the right half of an unaligned word at `address`.
const fn right_size(address: u32) -> usize {
    1 + (address & 3) as usize
}

/// `lwl`: fill the most significant bytes of `rt` from `address` up to the
/// next word boundary.
pub fn execute_lwl(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let address = effective_address(machine.registers, ins);
    let size = left_size(address);
    let src = machine.memory.read_bytes(address, size)?;

    let mut bytes = machine.registers.gpr(ins.rt()).to_be_bytes();
    bytes[..size].copy_from_slice(&src);
    machine.registers.set_gpr(ins.rt(), u32::from_be_bytes(bytes));
    Ok(ExecResult::Ok)
}

/// `lwr`: fill the least significant bytes of `rt` from the word boundary
/// up to and including `address`.
pub fn execute_lwr(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let address = effective_address(machine.registers, ins);
    let size = right_size(address);
    let src = machine.memory.read_bytes(address & !3, size)?;

    let mut bytes = machine.registers.gpr(ins.rt()).to_be_bytes();
    bytes[4 - size..].copy_from_slice(&src);
    machine.registers.set_gpr(ins.rt(), u32::from_be_bytes(bytes));
    Ok(ExecResult::Ok)
}

pub fn execute_swl(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let address = effective_address(machine.registers, ins);
    let size = left_size(address);
    let bytes = machine.registers.gpr(ins.rt()).to_be_bytes();
    machine.memory.write_bytes(address, &bytes[..size])?;
    Ok(ExecResult::Ok)
}

pub fn execute_swr(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let address = effective_address(machine.registers, ins);
    let size = right_size(address);
    let bytes = machine.registers.gpr(ins.rt()).to_be_bytes();
    machine.memory.write_bytes(address & !3, &bytes[4 - size..])?;
    Ok(ExecResult::Ok)
}

/// `ll`: load a word and take the reservation for this context.
pub fn execute_ll(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    *machine.reservation = Some(machine.context);
    let address = effective_address(machine.registers, ins);
    let value = machine.memory.read_word(address)?;
    machine.registers.set_gpr(ins.rt(), value);
    Ok(ExecResult::StartRmw)
}

/// `sc`: store only if this context still holds the reservation; `rt`
/// reports whether the store happened.
pub fn execute_sc(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let success = *machine.reservation == Some(machine.context);
    if success {
        let address = effective_address(machine.registers, ins);
        let value = machine.registers.gpr(ins.rt());
        machine.memory.write_word(address, value)?;
    }
    machine.registers.set_gpr(ins.rt(), success as u32);
    Ok(ExecResult::EndRmw)
}

pub fn execute_lwc1(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let address = effective_address(machine.registers, ins);
    let value = machine.memory.read_word(address)?;
    machine.registers.set_fpr_bits(ins.ft(), value);
    Ok(ExecResult::Ok)
}

pub fn execute_swc1(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let address = effective_address(machine.registers, ins);
    let value = machine.registers.fpr_bits(ins.ft());
    machine.memory.write_word(address, value)?;
    Ok(ExecResult::Ok)
}

pub fn execute_ldc1(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let address = effective_address(machine.registers, ins);
    let value = machine.memory.read_dword(address)?;
    machine.registers.set_dword(ins.ft(), value);
    Ok(ExecResult::Ok)
}

pub fn execute_sdc1(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let address = effective_address(machine.registers, ins);
    let value = machine.registers.dword(ins.ft());
    machine.memory.write_dword(address, value)?;
    Ok(ExecResult::Ok)
}

#[cfg(test)]
mod tests {
    use super::super::{test_utils::TestMachine, ExecResult};
    use crate::{
        error::{MemoryError, VMErrorKind},
        memory::Protection,
    };
    use mipsemu_common::{
        memory::MemoryProcessor,
        mips::{decode_instruction, encode_i_type, Opcode, Register},
    };

    use Register::*;

    const BASE: u32 = 0x1000_0000;

    fn machine() -> TestMachine {
        let mut machine = TestMachine::default();
        machine
            .memory
            .write_bytes(BASE, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88])
            .unwrap();
        machine.registers.set_gpr(A0 as u32, BASE);
        machine
    }

    #[test]
    fn test_sign_and_zero_extension() {
        let mut machine = machine();
        machine.memory.write_byte(BASE + 8, 0x80).unwrap();

        machine.run(encode_i_type(Opcode::LB, V0, A0, 8));
        assert_eq!(machine.registers.gpr(V0 as u32), 0xffff_ff80);

        machine.run(encode_i_type(Opcode::LBU, V0, A0, 8));
        assert_eq!(machine.registers.gpr(V0 as u32), 0x80);

        machine.run(encode_i_type(Opcode::LH, V0, A0, 8));
        assert_eq!(machine.registers.gpr(V0 as u32), 0xffff_8000);

        machine.run(encode_i_type(Opcode::LW, V0, A0, 4));
        assert_eq!(machine.registers.gpr(V0 as u32), 0x5566_7788);
    }

    #[test]
    fn test_stores() {
        let mut machine = machine();
        machine.registers.set_gpr(T0 as u32, 0xdead_beef);

        machine.run(encode_i_type(Opcode::SB, T0, A0, 0));
        machine.run(encode_i_type(Opcode::SH, T0, A0, 2));
        assert_eq!(machine.memory.read_word(BASE).unwrap(), 0xef22_beef);

        machine.run(encode_i_type(Opcode::SW, T0, A0, (-4i16) as u16));
        assert_eq!(machine.memory.read_word(BASE - 4).unwrap(), 0xdead_beef);
    }

    #[test]
    fn test_unaligned_word_load() {
        let mut machine = machine();
        machine.registers.set_gpr(V0 as u32, 0xaabb_ccdd);

        // lwl $v0, 1($a0); lwr $v0, 4($a0) assembles the word at BASE + 1
        machine.run(encode_i_type(Opcode::LWL, V0, A0, 1));
        assert_eq!(machine.registers.gpr(V0 as u32), 0x2233_44dd);
        machine.run(encode_i_type(Opcode::LWR, V0, A0, 4));
        assert_eq!(machine.registers.gpr(V0 as u32), 0x2233_4455);

        // Aligned lwl and the last-byte lwr each load a full word
        machine.run(encode_i_type(Opcode::LWL, V1, A0, 0));
        assert_eq!(machine.registers.gpr(V1 as u32), 0x1122_3344);
        machine.run(encode_i_type(Opcode::LWR, V1, A0, 7));
        assert_eq!(machine.registers.gpr(V1 as u32), 0x5566_7788);
    }

    #[test]
    fn test_unaligned_word_store() {
        let mut machine = machine();
        machine.registers.set_gpr(T0 as u32, 0xa1b2_c3d4);

        machine.run(encode_i_type(Opcode::SWL, T0, A0, 1));
        machine.run(encode_i_type(Opcode::SWR, T0, A0, 4));
        assert_eq!(
            machine.memory.read_bytes(BASE, 8).unwrap(),
            [0x11, 0xa1, 0xb2, 0xc3, 0xd4, 0x66, 0x77, 0x88]
        );
    }

    #[test]
    fn test_load_linked_store_conditional() {
        let mut machine = machine();
        machine.registers.set_gpr(T0 as u32, 7);

        assert_eq!(machine.run_as(1, encode_i_type(Opcode::LL, V0, A0, 0)), ExecResult::StartRmw);
        assert_eq!(machine.registers.gpr(V0 as u32), 0x1122_3344);
        assert_eq!(machine.reservation, Some(1));

        // Another context's sc fails and leaves memory alone
        assert_eq!(machine.run_as(2, encode_i_type(Opcode::SC, T0, A0, 0)), ExecResult::EndRmw);
        assert_eq!(machine.registers.gpr(T0 as u32), 0);
        assert_eq!(machine.memory.read_word(BASE).unwrap(), 0x1122_3344);

        machine.registers.set_gpr(T0 as u32, 7);
        machine.run_as(1, encode_i_type(Opcode::SC, T0, A0, 0));
        assert_eq!(machine.registers.gpr(T0 as u32), 1);
        assert_eq!(machine.memory.read_word(BASE).unwrap(), 7);
    }

    #[test]
    fn test_fpu_transfers() {
        let mut machine = machine();

        machine.run(encode_i_type(Opcode::LDC1, Register::from(2), A0, 0));
        assert_eq!(machine.registers.dword(2), 0x1122_3344_5566_7788);
        assert_eq!(machine.registers.fpr_bits(2), 0x5566_7788);

        machine.run(encode_i_type(Opcode::SWC1, Register::from(3), A0, 8));
        assert_eq!(machine.memory.read_word(BASE + 8).unwrap(), 0x1122_3344);

        machine.registers.set_double(4, 1.5);
        machine.run(encode_i_type(Opcode::SDC1, Register::from(4), A0, 16));
        assert_eq!(machine.memory.read_dword(BASE + 16).unwrap(), 1.5f64.to_bits());

        machine.run(encode_i_type(Opcode::LWC1, Register::from(6), A0, 4));
        assert_eq!(machine.registers.fpr_bits(6), 0x5566_7788);
    }

    #[test]
    fn test_faults_propagate() {
        let mut machine = machine();
        machine.memory.protect(BASE, 4096, Protection::READ).unwrap();

        let ins = decode_instruction(encode_i_type(Opcode::SW, T0, A0, 0));
        let mut state = super::super::Machine {
            registers: &mut machine.registers,
            memory: &mut machine.memory,
            context: 0,
            reservation: &mut machine.reservation,
        };
        let err = super::super::execute(&mut state, &ins).unwrap_err();
        assert_eq!(err.source, VMErrorKind::MemoryError(MemoryError::WriteProtection(BASE)));

        let ins = decode_instruction(encode_i_type(Opcode::LW, T0, A0, 2));
        let err = super::super::execute(&mut state, &ins).unwrap_err();
        assert_eq!(
            err.source,
            VMErrorKind::MemoryError(MemoryError::UnalignedAccess(BASE + 2, 4))
        );
    }
}
