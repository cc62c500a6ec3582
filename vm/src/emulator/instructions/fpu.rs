//! COP1: register transfers, arithmetic, comparisons and conversions.
//!
//! Arithmetic is defined for the S and D formats only; anything else
//! yields [`ExecResult::FormatError`]. Rounding modes and exceptions are not
//! modeled, every conversion to an integer truncates.

use std::ops::Neg;

use mipsemu_common::mips::{FpuFormat, Instruction};

use super::{macros::define_fpu_instruction, ExecResult, Machine};
use crate::{cpu::RegisterFile, error::Result};

define_fpu_instruction!(execute_add_fmt, binary, +);
define_fpu_instruction!(execute_sub_fmt, binary, -);
define_fpu_instruction!(execute_mul_fmt, binary, *);
define_fpu_instruction!(execute_div_fmt, binary, /);
define_fpu_instruction!(execute_sqrt_fmt, unary, sqrt);
define_fpu_instruction!(execute_abs_fmt, unary, abs);
define_fpu_instruction!(execute_neg_fmt, unary, neg);

pub fn execute_mfc1(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let value = machine.registers.fpr_bits(ins.fs());
    machine.registers.set_gpr(ins.rt(), value);
    Ok(ExecResult::Ok)
}

pub fn execute_mtc1(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let value = machine.registers.gpr(ins.rt());
    machine.registers.set_fpr_bits(ins.fs(), value);
    Ok(ExecResult::Ok)
}

pub fn execute_cfc1(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    match machine.registers.read_fcr(ins.fs()) {
        Some(value) => {
            machine.registers.set_gpr(ins.rt(), value);
            Ok(ExecResult::Ok)
        }
        None => Ok(ExecResult::NotImplemented),
    }
}

pub fn execute_ctc1(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let value = machine.registers.gpr(ins.rt());
    if machine.registers.write_fcr(ins.fs(), value) {
        Ok(ExecResult::Ok)
    } else {
        Ok(ExecResult::NotImplemented)
    }
}

/// Copy `fs` to `fd` in the instruction's format.
fn move_fpr(regs: &mut RegisterFile, ins: &Instruction) -> ExecResult {
    match ins.format() {
        Some(FpuFormat::Single) => {
            let bits = regs.fpr_bits(ins.fs());
            regs.set_fpr_bits(ins.fd(), bits);
        }
        Some(FpuFormat::Double) => {
            let bits = regs.dword(ins.fs());
            regs.set_dword(ins.fd(), bits);
        }
        _ => return ExecResult::FormatError,
    }
    ExecResult::Ok
}

fn is_move_format(ins: &Instruction) -> bool {
    matches!(ins.format(), Some(FpuFormat::Single | FpuFormat::Double))
}

pub fn execute_mov_fmt(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    Ok(move_fpr(machine.registers, ins))
}

/// `movf.fmt`/`movt.fmt`
pub fn execute_movci_fmt(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    if !is_move_format(ins) {
        return Ok(ExecResult::FormatError);
    }
    if machine.registers.fpcc(ins.cc()) == ins.tf() {
        move_fpr(machine.registers, ins);
    }
    Ok(ExecResult::Ok)
}

pub fn execute_movz_fmt(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    if !is_move_format(ins) {
        return Ok(ExecResult::FormatError);
    }
    if machine.registers.gpr(ins.rt()) == 0 {
        move_fpr(machine.registers, ins);
    }
    Ok(ExecResult::Ok)
}

pub fn execute_movn_fmt(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    if !is_move_format(ins) {
        return Ok(ExecResult::FormatError);
    }
    if machine.registers.gpr(ins.rt()) != 0 {
        move_fpr(machine.registers, ins);
    }
    Ok(ExecResult::Ok)
}

/// `c.cond.fmt`: the low three bits of `cond` select which of less-than,
/// equal and unordered set the condition code.
pub fn execute_c_cond(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let regs = &mut *machine.registers;
    let (less, equal, unordered) = match ins.format() {
        Some(FpuFormat::Single) => {
            let (a, b) = (regs.single(ins.fs()), regs.single(ins.ft()));
            (a < b, a == b, a.is_nan() || b.is_nan())
        }
        Some(FpuFormat::Double) => {
            let (a, b) = (regs.double(ins.fs()), regs.double(ins.ft()));
            (a < b, a == b, a.is_nan() || b.is_nan())
        }
        _ => return Ok(ExecResult::FormatError),
    };

    let cond = ins.cond();
    let value = (cond & 0b100 != 0 && less)
        || (cond & 0b010 != 0 && equal)
        || (cond & 0b001 != 0 && unordered);
    regs.set_fpcc(ins.compare_cc(), value);
    Ok(ExecResult::Ok)
}

pub fn execute_cvt_s(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let regs = &mut *machine.registers;
    let value = match ins.format() {
        Some(FpuFormat::Double) => regs.double(ins.fs()) as f32,
        Some(FpuFormat::Word) => regs.fpr_bits(ins.fs()) as i32 as f32,
        Some(FpuFormat::Long) => regs.dword(ins.fs()) as i64 as f32,
        _ => return Ok(ExecResult::FormatError),
    };
    regs.set_single(ins.fd(), value);
    Ok(ExecResult::Ok)
}

pub fn execute_cvt_d(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let regs = &mut *machine.registers;
    let value = match ins.format() {
        Some(FpuFormat::Single) => regs.single(ins.fs()) as f64,
        Some(FpuFormat::Word) => regs.fpr_bits(ins.fs()) as i32 as f64,
        Some(FpuFormat::Long) => regs.dword(ins.fs()) as i64 as f64,
        _ => return Ok(ExecResult::FormatError),
    };
    regs.set_double(ins.fd(), value);
    Ok(ExecResult::Ok)
}

/// `cvt.w.fmt` and `trunc.w.fmt`; out-of-range values saturate.
pub fn execute_cvt_w(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
    let regs = &mut *machine.registers;
    let value = match ins.format() {
        Some(FpuFormat::Single) => regs.single(ins.fs()) as i32,
        Some(FpuFormat::Double) => regs.double(ins.fs()) as i32,
        _ => return Ok(ExecResult::FormatError),
    };
    regs.set_fpr_bits(ins.fd(), value as u32);
    Ok(ExecResult::Ok)
}

#[cfg(test)]
mod tests {
    use super::super::{test_utils::TestMachine, ExecResult};
    use mipsemu_common::mips::{
        encode_compare, encode_cop1_move, encode_fr_type, FpuFormat, Opcode, Register,
    };

    use FpuFormat::*;

    #[test]
    fn test_arithmetic() {
        let mut machine = TestMachine::default();
        machine.registers.set_double(2, 1.5);
        machine.registers.set_double(4, 2.25);
        machine.registers.set_single(7, 9.0);

        machine.run(encode_fr_type(Opcode::ADD_FMT, Double, 0, 2, 4));
        assert_eq!(machine.registers.double(0), 3.75);

        machine.run(encode_fr_type(Opcode::DIV_FMT, Double, 0, 4, 2));
        assert_eq!(machine.registers.double(0), 1.5);

        machine.run(encode_fr_type(Opcode::NEG_FMT, Double, 6, 2, 0));
        assert_eq!(machine.registers.double(6), -1.5);

        machine.run(encode_fr_type(Opcode::SQRT_FMT, Single, 8, 7, 0));
        assert_eq!(machine.registers.single(8), 3.0);

        machine.run(encode_fr_type(Opcode::MOV_FMT, Double, 10, 4, 0));
        assert_eq!(machine.registers.double(10), 2.25);
    }

    #[test]
    fn test_invalid_format() {
        let mut machine = TestMachine::default();
        let result = machine.run(encode_fr_type(Opcode::ADD_FMT, Word, 0, 2, 4));
        assert_eq!(result, ExecResult::FormatError);

        let result = machine.run(encode_fr_type(Opcode::CVT_W, Word, 0, 2, 0));
        assert_eq!(result, ExecResult::FormatError);
    }

    #[test]
    fn test_compare_and_conditional_move() {
        let mut machine = TestMachine::default();
        machine.registers.set_single(1, 1.0);
        machine.registers.set_single(2, 2.0);
        machine.registers.set_single(3, f32::NAN);

        // c.lt.s $fcc2, $f1, $f2
        machine.run(encode_compare(Single, 0xc, 2, 1, 2));
        assert!(machine.registers.fpcc(2));

        // c.eq.s $fcc0, $f1, $f2
        machine.run(encode_compare(Single, 0x2, 0, 1, 2));
        assert!(!machine.registers.fpcc(0));

        // c.un.s $fcc0, $f1, $f3
        machine.run(encode_compare(Single, 0x1, 0, 1, 3));
        assert!(machine.registers.fpcc(0));

        // movt.s $f4, $f2, $fcc0 copies, movf.s does not
        machine.run(encode_fr_type(Opcode::MOVT_FMT, Single, 4, 2, 0));
        assert_eq!(machine.registers.single(4), 2.0);
        machine.run(encode_fr_type(Opcode::MOVF_FMT, Single, 4, 1, 0));
        assert_eq!(machine.registers.single(4), 2.0);

        // movn.s tests a general purpose register
        machine.registers.set_gpr(Register::T0 as u32, 1);
        machine.run(encode_fr_type(Opcode::MOVN_FMT, Single, 4, 1, Register::T0 as u32));
        assert_eq!(machine.registers.single(4), 1.0);
        machine.run(encode_fr_type(Opcode::MOVZ_FMT, Single, 4, 2, Register::T0 as u32));
        assert_eq!(machine.registers.single(4), 1.0);
    }

    #[test]
    fn test_conversions() {
        let mut machine = TestMachine::default();
        machine.registers.set_fpr_bits(1, (-7i32) as u32);
        machine.registers.set_double(2, -2.75);
        machine.registers.set_dword(4, 1u64 << 40);

        machine.run(encode_fr_type(Opcode::CVT_D, Word, 6, 1, 0));
        assert_eq!(machine.registers.double(6), -7.0);

        machine.run(encode_fr_type(Opcode::CVT_S, Double, 8, 2, 0));
        assert_eq!(machine.registers.single(8), -2.75);

        machine.run(encode_fr_type(Opcode::CVT_D, Long, 10, 4, 0));
        assert_eq!(machine.registers.double(10), (1u64 << 40) as f64);

        machine.run(encode_fr_type(Opcode::TRUNC_W, Double, 12, 2, 0));
        assert_eq!(machine.registers.fpr_bits(12), (-2i32) as u32);

        machine.run(encode_fr_type(Opcode::CVT_W, Single, 13, 8, 0));
        assert_eq!(machine.registers.fpr_bits(13), (-2i32) as u32);
    }

    #[test]
    fn test_register_moves() {
        let mut machine = TestMachine::default();
        machine.registers.set_gpr(Register::T0 as u32, 0x3f80_0000);

        machine.run(encode_cop1_move(Opcode::MTC1, Register::T0, 5));
        assert_eq!(machine.registers.single(5), 1.0);

        machine.run(encode_cop1_move(Opcode::MFC1, Register::T1, 5));
        assert_eq!(machine.registers.gpr(Register::T1 as u32), 0x3f80_0000);

        // ctc1 $t2, $25 then cfc1 reads the packed condition codes back
        machine.registers.set_gpr(Register::T2 as u32, 0b1000_0001);
        machine.run(encode_cop1_move(Opcode::CTC1, Register::T2, 25));
        assert!(machine.registers.fpcc(0));
        assert!(machine.registers.fpcc(7));
        machine.run(encode_cop1_move(Opcode::CFC1, Register::T3, 25));
        assert_eq!(machine.registers.gpr(Register::T3 as u32), 0b1000_0001);

        let result = machine.run(encode_cop1_move(Opcode::CFC1, Register::T3, 5));
        assert_eq!(result, ExecResult::NotImplemented);
        let result = machine.run(encode_cop1_move(Opcode::CTC1, Register::T3, 0));
        assert_eq!(result, ExecResult::NotImplemented);
    }
}
