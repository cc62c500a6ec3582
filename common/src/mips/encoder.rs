//! # Instruction Encoder for MIPS32
//!
//! Builds instruction words from an [`Opcode`] and its operands. Each helper
//! packs the operand fields at their ISA positions and then merges them with
//! the opcode's fixed bits, so operands can never clobber the bits that
//! identify the instruction.
//!
//! The encoder is mostly used to assemble small guest programs in tests and
//! benchmarks, and to check that decoding and encoding agree bit for bit.

use super::{
    instruction::{FpuFormat, Instruction},
    opcode::Opcode,
    register::Register,
};

fn place(opcode: Opcode, fields: u32) -> u32 {
    let (bits, mask) = opcode.encoding();
    bits | (fields & !mask)
}

const fn field(value: u32, lo: u32, width: u32) -> u32 {
    (value & ((1 << width) - 1)) << lo
}

/// `rd, rs, rt` instructions.
pub fn encode_r_type(opcode: Opcode, rd: Register, rs: Register, rt: Register) -> u32 {
    place(
        opcode,
        field(rs as u32, 21, 5) | field(rt as u32, 16, 5) | field(rd as u32, 11, 5),
    )
}

/// Shifts by a constant amount: `rd, rt, shamt`.
pub fn encode_shift(opcode: Opcode, rd: Register, rt: Register, shamt: u32) -> u32 {
    place(
        opcode,
        field(rt as u32, 16, 5) | field(rd as u32, 11, 5) | field(shamt, 6, 5),
    )
}

/// Immediate arithmetic and loads/stores: `rt, rs, imm`.
pub fn encode_i_type(opcode: Opcode, rt: Register, rs: Register, imm: u16) -> u32 {
    place(
        opcode,
        field(rs as u32, 21, 5) | field(rt as u32, 16, 5) | imm as u32,
    )
}

/// Relative branches; `offset` is in bytes from the delay slot.
pub fn encode_branch(opcode: Opcode, rs: Register, rt: Register, offset: i32) -> u32 {
    encode_i_type(opcode, rt, rs, (offset >> 2) as u16)
}

/// Absolute jumps within the current 256 MiB region.
pub fn encode_j_type(opcode: Opcode, address: u32) -> u32 {
    place(opcode, field(address >> 2, 0, 26))
}

/// COP1 arithmetic: `fd, fs, ft` in format `fmt`.
pub fn encode_fr_type(opcode: Opcode, fmt: FpuFormat, fd: u32, fs: u32, ft: u32) -> u32 {
    place(
        opcode,
        field(fmt.fmt(), 21, 5) | field(ft, 16, 5) | field(fs, 11, 5) | field(fd, 6, 5),
    )
}

/// `c.cond.fmt cc, fs, ft`.
pub fn encode_compare(fmt: FpuFormat, cond: u32, cc: u32, fs: u32, ft: u32) -> u32 {
    place(
        Opcode::C_COND_FMT,
        field(fmt.fmt(), 21, 5)
            | field(ft, 16, 5)
            | field(fs, 11, 5)
            | field(cc, 8, 3)
            | field(cond, 0, 4),
    )
}

/// COP1 register moves: `rt, fs`.
pub fn encode_cop1_move(opcode: Opcode, rt: Register, fs: u32) -> u32 {
    place(opcode, field(rt as u32, 16, 5) | field(fs, 11, 5))
}

/// Re-assembles a decoded instruction from its extracted fields.
pub fn encode_instruction(instruction: &Instruction) -> u32 {
    let fields = field(instruction.op(), 26, 6)
        | field(instruction.rs(), 21, 5)
        | field(instruction.rt(), 16, 5)
        | field(instruction.rd(), 11, 5)
        | field(instruction.shamt(), 6, 5)
        | field(instruction.func(), 0, 6);
    match instruction.opcode {
        Opcode::UNKNOWN => fields,
        opcode => place(opcode, fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mips::decoder::decode_instruction;

    #[test]
    fn test_round_trip_every_opcode() {
        // Fill every operand bit with a pattern, keep the opcode's fixed bits.
        for &opcode in Opcode::ALL {
            for pattern in [0u32, 0x0123_4567, 0x5555_5555, 0xffff_ffff] {
                let word = place(opcode, pattern);
                let decoded = decode_instruction(word);
                assert_eq!(encode_instruction(&decoded), word, "{opcode:?} 0x{word:08x}");
            }

            // The canonical pattern (operands zero) decodes to the opcode itself,
            // unless a higher-priority alias claims it.
            let (bits, _) = opcode.encoding();
            let decoded = decode_instruction(bits);
            assert!(decoded.opcode.matches(bits));
            assert_eq!(encode_instruction(&decoded), bits);
        }
    }

    #[test]
    fn test_operand_helpers() {
        let word = encode_r_type(Opcode::ADDU, Register::V0, Register::A0, Register::A1);
        assert_eq!(word, 0x0085_1021);

        let word = encode_i_type(Opcode::ADDIU, Register::V0, Register::Zero, 4001);
        assert_eq!(word, 0x2402_0fa1);

        let word = encode_i_type(Opcode::LW, Register::Ra, Register::Sp, (-16i16) as u16);
        let ins = decode_instruction(word);
        assert_eq!(ins.opcode, Opcode::LW);
        assert_eq!(ins.rs_reg(), Register::Sp);
        assert_eq!(ins.rt_reg(), Register::Ra);
        assert_eq!(ins.imm(), -16);

        let word = encode_shift(Opcode::SRA, Register::T0, Register::T1, 31);
        let ins = decode_instruction(word);
        assert_eq!((ins.opcode, ins.rd(), ins.rt(), ins.shamt()), (Opcode::SRA, 8, 9, 31));

        let word = encode_branch(Opcode::BNE, Register::A0, Register::Zero, -8);
        let ins = decode_instruction(word);
        assert_eq!(ins.opcode, Opcode::BNE);
        assert_eq!(ins.branch_target(0x1000), 0x0ffc);

        let word = encode_j_type(Opcode::JAL, 0x0040_0120);
        let ins = decode_instruction(word);
        assert_eq!(ins.opcode, Opcode::JAL);
        assert_eq!(ins.jump_target(0x0040_0000), 0x0040_0120);

        let word = encode_fr_type(Opcode::MUL_FMT, FpuFormat::Double, 4, 6, 8);
        let ins = decode_instruction(word);
        assert_eq!(ins.opcode, Opcode::MUL_FMT);
        assert_eq!(ins.format(), Some(FpuFormat::Double));
        assert_eq!((ins.fd(), ins.fs(), ins.ft()), (4, 6, 8));

        let word = encode_compare(FpuFormat::Single, 0x2, 3, 1, 2);
        assert_eq!(decode_instruction(word).to_string(), "c.eq.s $fcc3, $f1, $f2");

        let word = encode_cop1_move(Opcode::MFC1, Register::T0, 12);
        assert_eq!(decode_instruction(word).to_string(), "mfc1 $t0, $f12");
    }
}
