//! MIPS32 opcodes understood by the emulator.
//!
//! Each opcode is defined by a fixed-bit pattern: a word belongs to the opcode
//! when `word & mask == bits`. Patterns overlap on purpose (`nop` is a special
//! `sll`, `b` is a special `beq`), so the table order is also the decode
//! priority: the first matching row wins.

use std::fmt::Display;

use bitflags::bitflags;

use serde::{Deserialize, Serialize};
use variant_count::VariantCount;

/// Primary opcode only.
const OPCODE: u32 = 0xfc00_0000;
/// Primary opcode plus function field (SPECIAL, SPECIAL2 and COP1 arithmetic).
const SPECIAL: u32 = 0xfc00_003f;
/// Primary opcode plus the rt field selecting the REGIMM operation.
const REGIMM: u32 = 0xfc1f_0000;
/// Primary opcode, rs and rt (`b`, `bal`).
const UPPER_HALF: u32 = 0xffff_0000;
/// COP1 register moves: sub-opcode in rs, low eleven bits zero.
const COP1_MOVE: u32 = 0xffe0_07ff;
/// COP1 branches: sub-opcode in rs, nd and tf bits.
const COP1_BRANCH: u32 = 0xffe3_0000;
/// Conditional moves on a floating point condition code: function plus tf bit.
const MOVCI: u32 = 0xfc01_003f;
/// `c.cond.fmt`: function bits 7..4 fixed, condition in 3..0.
const COP1_COMPARE: u32 = 0xfc00_00f0;
const EXACT: u32 = 0xffff_ffff;

/// Operand layout, used for disassembly and by the encoder helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionFormat {
    /// No operands (`nop`, `syscall`, ...).
    None,
    /// `rd, rs, rt`
    Register,
    /// `rd, rt, shamt`
    Shift,
    /// `rd, rt, rs`
    ShiftVariable,
    /// `rs, rt` writing HI/LO
    MultDiv,
    /// `rd` read from HI/LO
    MoveFrom,
    /// `rs` written to HI/LO
    MoveTo,
    /// `rd, rs`
    Count,
    /// `rd, rs, cc`
    ConditionalMove,
    /// `rt, rs, imm`
    Immediate,
    /// `rt, uimm`
    UpperImmediate,
    /// `rt, imm(rs)`
    Memory,
    /// `ft, imm(rs)`
    FpuMemory,
    /// `rs, rt, offset`
    Branch,
    /// `rs, offset`
    BranchZero,
    /// `offset`
    BranchAlways,
    /// `target`
    Jump,
    /// `rs`
    JumpRegister,
    /// `rd, rs`
    JumpLinkRegister,
    /// `rt, fs`
    FpuMove,
    /// `cc, offset`
    FpuBranch,
    /// `fd, fs, ft`
    FpuBinary,
    /// `fd, fs`
    FpuUnary,
    /// `cc, fs, ft`
    FpuCompare,
    /// `fd, fs` converting between formats
    FpuConvert,
    /// `fd, fs, cc`
    FpuConditionalMove,
    /// `fd, fs, rt`
    FpuMoveGpr,
}

/// Functional unit class an instruction occupies, for timing models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionalUnit {
    None,
    IntAlu,
    IntMult,
    IntDiv,
    MemRead,
    MemWrite,
    FpSimple,
    FpAdd,
    FpMult,
    FpDiv,
}

bitflags! {
    /// Semantic classification bits.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct InstructionFlags: u16 {
        const MEMORY = 1 << 0;
        const LOAD = 1 << 1;
        const STORE = 1 << 2;
        const CONTROL = 1 << 3;
        const CONDITIONAL = 1 << 4;
        const CALL = 1 << 5;
        const INDIRECT = 1 << 6;
        const FLOAT = 1 << 7;
        const TRAP = 1 << 8;
        /// Part of a load-linked/store-conditional pair.
        const RMW = 1 << 9;
    }
}

macro_rules! define_opcodes {
    ($(
        $name:ident => $mnemonic:literal, $bits:expr, $mask:expr, $format:ident, $unit:ident, [$($flag:ident)|*];
    )*) => {
        #[derive(
            Debug, Default, Clone, Copy, PartialEq, Eq, Hash, VariantCount, Serialize, Deserialize,
        )]
        #[allow(clippy::upper_case_acronyms, non_camel_case_types)]
        pub enum Opcode {
            $($name,)*
            /// A word matching no definition.
            #[default]
            UNKNOWN,
        }

        impl Opcode {
            /// Every defined opcode, in decode priority order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                    Opcode::UNKNOWN => "unknown",
                }
            }

            /// Returns the `(bits, mask)` pair identifying this opcode.
            pub const fn encoding(&self) -> (u32, u32) {
                match self {
                    $(Opcode::$name => ($bits, $mask),)*
                    Opcode::UNKNOWN => (0, 0),
                }
            }

            pub const fn format(&self) -> InstructionFormat {
                match self {
                    $(Opcode::$name => InstructionFormat::$format,)*
                    Opcode::UNKNOWN => InstructionFormat::None,
                }
            }

            pub const fn unit(&self) -> FunctionalUnit {
                match self {
                    $(Opcode::$name => FunctionalUnit::$unit,)*
                    Opcode::UNKNOWN => FunctionalUnit::None,
                }
            }

            pub const fn flags(&self) -> InstructionFlags {
                match self {
                    $(Opcode::$name => InstructionFlags::from_bits_retain(0 $(| InstructionFlags::$flag.bits())*),)*
                    Opcode::UNKNOWN => InstructionFlags::empty(),
                }
            }
        }
    };
}

define_opcodes! {
    NOP => "nop", 0x0000_0000, EXACT, None, None, [];

    // SPECIAL
    SLL => "sll", 0x0000_0000, SPECIAL, Shift, IntAlu, [];
    MOVF => "movf", 0x0000_0001, MOVCI, ConditionalMove, IntAlu, [FLOAT];
    MOVT => "movt", 0x0001_0001, MOVCI, ConditionalMove, IntAlu, [FLOAT];
    SRL => "srl", 0x0000_0002, SPECIAL, Shift, IntAlu, [];
    SRA => "sra", 0x0000_0003, SPECIAL, Shift, IntAlu, [];
    SLLV => "sllv", 0x0000_0004, SPECIAL, ShiftVariable, IntAlu, [];
    SRLV => "srlv", 0x0000_0006, SPECIAL, ShiftVariable, IntAlu, [];
    SRAV => "srav", 0x0000_0007, SPECIAL, ShiftVariable, IntAlu, [];
    JR => "jr", 0x0000_0008, SPECIAL, JumpRegister, None, [CONTROL | INDIRECT];
    JALR => "jalr", 0x0000_0009, SPECIAL, JumpLinkRegister, None, [CONTROL | INDIRECT | CALL];
    MOVZ => "movz", 0x0000_000a, SPECIAL, Register, IntAlu, [];
    MOVN => "movn", 0x0000_000b, SPECIAL, Register, IntAlu, [];
    SYSCALL => "syscall", 0x0000_000c, SPECIAL, None, None, [TRAP];
    BREAK => "break", 0x0000_000d, SPECIAL, None, None, [TRAP];
    SYNC => "sync", 0x0000_000f, SPECIAL, None, None, [];
    MFHI => "mfhi", 0x0000_0010, SPECIAL, MoveFrom, IntAlu, [];
    MTHI => "mthi", 0x0000_0011, SPECIAL, MoveTo, IntAlu, [];
    MFLO => "mflo", 0x0000_0012, SPECIAL, MoveFrom, IntAlu, [];
    MTLO => "mtlo", 0x0000_0013, SPECIAL, MoveTo, IntAlu, [];
    MULT => "mult", 0x0000_0018, SPECIAL, MultDiv, IntMult, [];
    MULTU => "multu", 0x0000_0019, SPECIAL, MultDiv, IntMult, [];
    DIV => "div", 0x0000_001a, SPECIAL, MultDiv, IntDiv, [];
    DIVU => "divu", 0x0000_001b, SPECIAL, MultDiv, IntDiv, [];
    ADD => "add", 0x0000_0020, SPECIAL, Register, IntAlu, [];
    ADDU => "addu", 0x0000_0021, SPECIAL, Register, IntAlu, [];
    SUB => "sub", 0x0000_0022, SPECIAL, Register, IntAlu, [];
    SUBU => "subu", 0x0000_0023, SPECIAL, Register, IntAlu, [];
    AND => "and", 0x0000_0024, SPECIAL, Register, IntAlu, [];
    OR => "or", 0x0000_0025, SPECIAL, Register, IntAlu, [];
    XOR => "xor", 0x0000_0026, SPECIAL, Register, IntAlu, [];
    NOR => "nor", 0x0000_0027, SPECIAL, Register, IntAlu, [];
    SLT => "slt", 0x0000_002a, SPECIAL, Register, IntAlu, [];
    SLTU => "sltu", 0x0000_002b, SPECIAL, Register, IntAlu, [];

    // REGIMM
    BLTZ => "bltz", 0x0400_0000, REGIMM, BranchZero, IntAlu, [CONTROL | CONDITIONAL];
    BGEZ => "bgez", 0x0401_0000, REGIMM, BranchZero, IntAlu, [CONTROL | CONDITIONAL];
    BLTZAL => "bltzal", 0x0410_0000, REGIMM, BranchZero, IntAlu, [CONTROL | CONDITIONAL | CALL];
    BAL => "bal", 0x0411_0000, UPPER_HALF, BranchAlways, None, [CONTROL | CALL];
    BGEZAL => "bgezal", 0x0411_0000, REGIMM, BranchZero, IntAlu, [CONTROL | CONDITIONAL | CALL];

    // Jumps and branches
    J => "j", 0x0800_0000, OPCODE, Jump, None, [CONTROL];
    JAL => "jal", 0x0c00_0000, OPCODE, Jump, None, [CONTROL | CALL];
    B => "b", 0x1000_0000, UPPER_HALF, BranchAlways, None, [CONTROL];
    BEQ => "beq", 0x1000_0000, OPCODE, Branch, IntAlu, [CONTROL | CONDITIONAL];
    BNE => "bne", 0x1400_0000, OPCODE, Branch, IntAlu, [CONTROL | CONDITIONAL];
    BLEZ => "blez", 0x1800_0000, REGIMM, BranchZero, IntAlu, [CONTROL | CONDITIONAL];
    BGTZ => "bgtz", 0x1c00_0000, REGIMM, BranchZero, IntAlu, [CONTROL | CONDITIONAL];

    // Immediate arithmetic
    ADDI => "addi", 0x2000_0000, OPCODE, Immediate, IntAlu, [];
    ADDIU => "addiu", 0x2400_0000, OPCODE, Immediate, IntAlu, [];
    SLTI => "slti", 0x2800_0000, OPCODE, Immediate, IntAlu, [];
    SLTIU => "sltiu", 0x2c00_0000, OPCODE, Immediate, IntAlu, [];
    ANDI => "andi", 0x3000_0000, OPCODE, Immediate, IntAlu, [];
    ORI => "ori", 0x3400_0000, OPCODE, Immediate, IntAlu, [];
    XORI => "xori", 0x3800_0000, OPCODE, Immediate, IntAlu, [];
    LUI => "lui", 0x3c00_0000, OPCODE, UpperImmediate, IntAlu, [];

    // COP1 moves and branches
    MFC1 => "mfc1", 0x4400_0000, COP1_MOVE, FpuMove, FpSimple, [FLOAT];
    CFC1 => "cfc1", 0x4440_0000, COP1_MOVE, FpuMove, FpSimple, [FLOAT];
    MTC1 => "mtc1", 0x4480_0000, COP1_MOVE, FpuMove, FpSimple, [FLOAT];
    CTC1 => "ctc1", 0x44c0_0000, COP1_MOVE, FpuMove, FpSimple, [FLOAT];
    BC1F => "bc1f", 0x4500_0000, COP1_BRANCH, FpuBranch, None, [CONTROL | CONDITIONAL | FLOAT];
    BC1T => "bc1t", 0x4501_0000, COP1_BRANCH, FpuBranch, None, [CONTROL | CONDITIONAL | FLOAT];

    // COP1 arithmetic, any format; handlers reject formats they do not support
    ADD_FMT => "add", 0x4400_0000, SPECIAL, FpuBinary, FpAdd, [FLOAT];
    SUB_FMT => "sub", 0x4400_0001, SPECIAL, FpuBinary, FpAdd, [FLOAT];
    MUL_FMT => "mul", 0x4400_0002, SPECIAL, FpuBinary, FpMult, [FLOAT];
    DIV_FMT => "div", 0x4400_0003, SPECIAL, FpuBinary, FpDiv, [FLOAT];
    SQRT_FMT => "sqrt", 0x4400_0004, SPECIAL, FpuUnary, FpDiv, [FLOAT];
    ABS_FMT => "abs", 0x4400_0005, SPECIAL, FpuUnary, FpSimple, [FLOAT];
    MOV_FMT => "mov", 0x4400_0006, SPECIAL, FpuUnary, FpSimple, [FLOAT];
    NEG_FMT => "neg", 0x4400_0007, SPECIAL, FpuUnary, FpSimple, [FLOAT];
    TRUNC_W => "trunc.w", 0x4400_000d, SPECIAL, FpuConvert, FpSimple, [FLOAT];
    MOVF_FMT => "movf", 0x4400_0011, MOVCI, FpuConditionalMove, FpSimple, [FLOAT];
    MOVT_FMT => "movt", 0x4401_0011, MOVCI, FpuConditionalMove, FpSimple, [FLOAT];
    MOVZ_FMT => "movz", 0x4400_0012, SPECIAL, FpuMoveGpr, FpSimple, [FLOAT];
    MOVN_FMT => "movn", 0x4400_0013, SPECIAL, FpuMoveGpr, FpSimple, [FLOAT];
    CVT_S => "cvt.s", 0x4400_0020, SPECIAL, FpuConvert, FpSimple, [FLOAT];
    CVT_D => "cvt.d", 0x4400_0021, SPECIAL, FpuConvert, FpSimple, [FLOAT];
    CVT_W => "cvt.w", 0x4400_0024, SPECIAL, FpuConvert, FpSimple, [FLOAT];
    C_COND_FMT => "c", 0x4400_0030, COP1_COMPARE, FpuCompare, FpAdd, [FLOAT];

    // SPECIAL2
    MADD => "madd", 0x7000_0000, SPECIAL, MultDiv, IntMult, [];
    MADDU => "maddu", 0x7000_0001, SPECIAL, MultDiv, IntMult, [];
    MUL => "mul", 0x7000_0002, SPECIAL, Register, IntMult, [];
    MSUB => "msub", 0x7000_0004, SPECIAL, MultDiv, IntMult, [];
    MSUBU => "msubu", 0x7000_0005, SPECIAL, MultDiv, IntMult, [];
    CLZ => "clz", 0x7000_0020, SPECIAL, Count, IntAlu, [];
    CLO => "clo", 0x7000_0021, SPECIAL, Count, IntAlu, [];

    // Loads and stores
    LB => "lb", 0x8000_0000, OPCODE, Memory, MemRead, [MEMORY | LOAD];
    LH => "lh", 0x8400_0000, OPCODE, Memory, MemRead, [MEMORY | LOAD];
    LWL => "lwl", 0x8800_0000, OPCODE, Memory, MemRead, [MEMORY | LOAD];
    LW => "lw", 0x8c00_0000, OPCODE, Memory, MemRead, [MEMORY | LOAD];
    LBU => "lbu", 0x9000_0000, OPCODE, Memory, MemRead, [MEMORY | LOAD];
    LHU => "lhu", 0x9400_0000, OPCODE, Memory, MemRead, [MEMORY | LOAD];
    LWR => "lwr", 0x9800_0000, OPCODE, Memory, MemRead, [MEMORY | LOAD];
    SB => "sb", 0xa000_0000, OPCODE, Memory, MemWrite, [MEMORY | STORE];
    SH => "sh", 0xa400_0000, OPCODE, Memory, MemWrite, [MEMORY | STORE];
    SWL => "swl", 0xa800_0000, OPCODE, Memory, MemWrite, [MEMORY | STORE];
    SW => "sw", 0xac00_0000, OPCODE, Memory, MemWrite, [MEMORY | STORE];
    SWR => "swr", 0xb800_0000, OPCODE, Memory, MemWrite, [MEMORY | STORE];
    LL => "ll", 0xc000_0000, OPCODE, Memory, MemRead, [MEMORY | LOAD | RMW];
    LWC1 => "lwc1", 0xc400_0000, OPCODE, FpuMemory, MemRead, [MEMORY | LOAD | FLOAT];
    PREF => "pref", 0xcc00_0000, OPCODE, Memory, None, [];
    LDC1 => "ldc1", 0xd400_0000, OPCODE, FpuMemory, MemRead, [MEMORY | LOAD | FLOAT];
    SC => "sc", 0xe000_0000, OPCODE, Memory, MemWrite, [MEMORY | STORE | RMW];
    SWC1 => "swc1", 0xe400_0000, OPCODE, FpuMemory, MemWrite, [MEMORY | STORE | FLOAT];
    SDC1 => "sdc1", 0xf400_0000, OPCODE, FpuMemory, MemWrite, [MEMORY | STORE | FLOAT];
}

impl Opcode {
    /// Whether `word` carries this opcode's fixed bits.
    pub const fn matches(&self, word: u32) -> bool {
        let (bits, mask) = self.encoding();
        word & mask == bits
    }

    /// Primary opcode field shared by every pattern of this opcode.
    pub const fn primary(&self) -> u32 {
        self.encoding().0 >> 26
    }

    pub const fn is_memory(&self) -> bool {
        self.flags().contains(InstructionFlags::MEMORY)
    }

    pub const fn is_call(&self) -> bool {
        self.flags().contains(InstructionFlags::CALL)
    }

    pub const fn is_control(&self) -> bool {
        self.flags().contains(InstructionFlags::CONTROL)
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_mnemonic() {
        assert_eq!(Opcode::ADDU.mnemonic(), "addu");
        assert_eq!(Opcode::SLL.mnemonic(), "sll");
        assert_eq!(Opcode::BGEZAL.mnemonic(), "bgezal");
        assert_eq!(Opcode::LWL.mnemonic(), "lwl");
        assert_eq!(Opcode::TRUNC_W.mnemonic(), "trunc.w");
        assert_eq!(Opcode::UNKNOWN.mnemonic(), "unknown");
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(format!("{}", Opcode::SYSCALL), "syscall");
        assert_eq!(format!("{}", Opcode::JALR), "jalr");
    }

    #[test]
    fn test_table_is_complete() {
        // Every variant except UNKNOWN appears exactly once in the decode table.
        assert_eq!(Opcode::ALL.len() + 1, Opcode::VARIANT_COUNT);
        for (i, a) in Opcode::ALL.iter().enumerate() {
            assert!(!Opcode::ALL[i + 1..].contains(a), "{a:?} listed twice");
        }
    }

    #[test]
    fn test_patterns_are_consistent() {
        for opcode in Opcode::ALL {
            let (bits, mask) = opcode.encoding();
            assert_eq!(bits & !mask, 0, "{opcode:?} sets bits outside its mask");
            assert_eq!(mask & 0xfc00_0000, 0xfc00_0000, "{opcode:?} must fix the primary opcode");
        }
    }

    #[test]
    fn test_flags() {
        assert!(Opcode::JAL.is_call());
        assert!(Opcode::BAL.is_call());
        assert!(!Opcode::J.is_call());
        assert!(Opcode::SW.is_memory());
        assert!(Opcode::LL.flags().contains(InstructionFlags::RMW));
        assert!(!Opcode::PREF.is_memory());
        assert!(Opcode::BC1T.is_control());
    }
}
