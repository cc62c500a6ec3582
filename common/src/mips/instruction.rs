use std::fmt::Display;

use super::{
    opcode::{FunctionalUnit, InstructionFlags, InstructionFormat, Opcode},
    register::Register,
};

/// Floating point operand format, as found in the `fmt` field (or the
/// three-bit `fmt3` field of COP1X instructions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuFormat {
    Single,
    Double,
    Word,
    Long,
    PairedSingle,
}

impl FpuFormat {
    pub const fn from_fmt(fmt: u32) -> Option<Self> {
        match fmt {
            16 => Some(FpuFormat::Single),
            17 => Some(FpuFormat::Double),
            20 => Some(FpuFormat::Word),
            21 => Some(FpuFormat::Long),
            22 => Some(FpuFormat::PairedSingle),
            _ => None,
        }
    }

    pub const fn from_fmt3(fmt3: u32) -> Option<Self> {
        match fmt3 {
            0 => Some(FpuFormat::Single),
            1 => Some(FpuFormat::Double),
            4 => Some(FpuFormat::Word),
            5 => Some(FpuFormat::Long),
            6 => Some(FpuFormat::PairedSingle),
            _ => None,
        }
    }

    pub const fn fmt(&self) -> u32 {
        match self {
            FpuFormat::Single => 16,
            FpuFormat::Double => 17,
            FpuFormat::Word => 20,
            FpuFormat::Long => 21,
            FpuFormat::PairedSingle => 22,
        }
    }

    pub const fn suffix(&self) -> &'static str {
        match self {
            FpuFormat::Single => "s",
            FpuFormat::Double => "d",
            FpuFormat::Word => "w",
            FpuFormat::Long => "l",
            FpuFormat::PairedSingle => "ps",
        }
    }
}

const COMPARE_CONDITIONS: [&str; 16] = [
    "f", "un", "eq", "ueq", "olt", "ult", "ole", "ule", "sf", "ngle", "seq", "ngl", "lt", "nge",
    "le", "ngt",
];

/// A register-like location an instruction reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Gpr(Register),
    Fpr(u8),
    Hi,
    Lo,
    Fcsr,
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Gpr(reg) => write!(f, "{reg}"),
            Operand::Fpr(n) => write!(f, "$f{n}"),
            Operand::Hi => f.write_str("$hi"),
            Operand::Lo => f.write_str("$lo"),
            Operand::Fcsr => f.write_str("$fcsr"),
        }
    }
}

/// One decoded instruction word.
///
/// The fields are bit ranges of `word`; the accessors below are the single
/// definition of where each field lives.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub word: u32,
    pub opcode: Opcode,
}

impl Instruction {
    pub const fn new(word: u32, opcode: Opcode) -> Self {
        Self { word, opcode }
    }

    const fn bits(&self, hi: u32, lo: u32) -> u32 {
        (self.word >> lo) & ((1 << (hi - lo + 1)) - 1)
    }

    /// Primary opcode, bits 31..26.
    pub const fn op(&self) -> u32 {
        self.bits(31, 26)
    }

    pub const fn rs(&self) -> u32 {
        self.bits(25, 21)
    }

    pub const fn rt(&self) -> u32 {
        self.bits(20, 16)
    }

    pub const fn rd(&self) -> u32 {
        self.bits(15, 11)
    }

    pub const fn shamt(&self) -> u32 {
        self.bits(10, 6)
    }

    pub const fn func(&self) -> u32 {
        self.bits(5, 0)
    }

    /// Compare condition of `c.cond.fmt`, bits 3..0.
    pub const fn cond(&self) -> u32 {
        self.bits(3, 0)
    }

    pub const fn uimm(&self) -> u32 {
        self.bits(15, 0)
    }

    /// Sign-extended 16-bit immediate.
    pub const fn imm(&self) -> i32 {
        self.word as u16 as i16 as i32
    }

    pub const fn target(&self) -> u32 {
        self.bits(25, 0)
    }

    pub const fn fmt(&self) -> u32 {
        self.bits(25, 21)
    }

    pub const fn fmt3(&self) -> u32 {
        self.bits(2, 0)
    }

    pub const fn fr(&self) -> u32 {
        self.bits(25, 21)
    }

    pub const fn ft(&self) -> u32 {
        self.bits(20, 16)
    }

    pub const fn fs(&self) -> u32 {
        self.bits(15, 11)
    }

    pub const fn fd(&self) -> u32 {
        self.bits(10, 6)
    }

    /// Condition code selected by branches and conditional moves, bits 20..18.
    pub const fn cc(&self) -> u32 {
        self.bits(20, 18)
    }

    /// Condition code written by `c.cond.fmt`, bits 10..8.
    pub const fn compare_cc(&self) -> u32 {
        self.bits(10, 8)
    }

    /// The `tf` bit of `movf`/`movt` and `bc1f`/`bc1t`.
    pub const fn tf(&self) -> bool {
        self.bits(16, 16) == 1
    }

    pub const fn format(&self) -> Option<FpuFormat> {
        FpuFormat::from_fmt(self.fmt())
    }

    pub fn rs_reg(&self) -> Register {
        Register::from_field(self.rs())
    }

    pub fn rt_reg(&self) -> Register {
        Register::from_field(self.rt())
    }

    pub fn rd_reg(&self) -> Register {
        Register::from_field(self.rd())
    }

    pub const fn flags(&self) -> InstructionFlags {
        self.opcode.flags()
    }

    pub const fn unit(&self) -> FunctionalUnit {
        self.opcode.unit()
    }

    pub const fn is_memory(&self) -> bool {
        self.opcode.is_memory()
    }

    pub const fn is_call(&self) -> bool {
        self.opcode.is_call()
    }

    /// `jr $ra` is the only return form.
    pub const fn is_return(&self) -> bool {
        matches!(self.opcode, Opcode::JR) && self.rs() == Register::Ra as u32
    }

    /// Registers the instruction reads.
    pub fn inputs(&self) -> Vec<Operand> {
        use InstructionFormat as F;
        let rs = Operand::Gpr(self.rs_reg());
        let rt = Operand::Gpr(self.rt_reg());
        let fs = Operand::Fpr(self.fs() as u8);
        let ft = Operand::Fpr(self.ft() as u8);

        match self.opcode {
            Opcode::MFHI => vec![Operand::Hi],
            Opcode::MFLO => vec![Operand::Lo],
            Opcode::MADD | Opcode::MADDU | Opcode::MSUB | Opcode::MSUBU => {
                vec![rs, rt, Operand::Hi, Operand::Lo]
            }
            Opcode::MOVZ | Opcode::MOVN => vec![rs, rt, Operand::Gpr(self.rd_reg())],
            Opcode::MFC1 => vec![fs],
            Opcode::CFC1 => vec![Operand::Fcsr],
            Opcode::MTC1 | Opcode::CTC1 => vec![rt],
            Opcode::LWL | Opcode::LWR => vec![rs, rt],
            _ => match self.opcode.format() {
                F::None | F::Jump | F::BranchAlways | F::UpperImmediate => vec![],
                F::Register | F::MultDiv | F::Branch => vec![rs, rt],
                F::Shift => vec![rt],
                F::ShiftVariable => vec![rt, rs],
                F::MoveTo | F::Count | F::JumpRegister | F::JumpLinkRegister => vec![rs],
                F::BranchZero | F::Immediate => vec![rs],
                F::ConditionalMove => vec![rs, Operand::Fcsr],
                F::Memory if self.opcode.flags().contains(InstructionFlags::STORE) => vec![rs, rt],
                F::Memory => vec![rs],
                F::FpuMemory if self.opcode.flags().contains(InstructionFlags::STORE) => {
                    vec![rs, ft]
                }
                F::FpuMemory => vec![rs],
                F::FpuBranch => vec![Operand::Fcsr],
                F::FpuBinary | F::FpuCompare => vec![fs, ft],
                F::FpuUnary | F::FpuConvert => vec![fs],
                F::FpuConditionalMove => vec![fs, Operand::Fcsr],
                F::FpuMoveGpr => vec![fs, rt],
                F::MoveFrom | F::FpuMove => vec![],
            },
        }
    }

    /// Registers the instruction writes.
    pub fn outputs(&self) -> Vec<Operand> {
        use InstructionFormat as F;
        let rt = Operand::Gpr(self.rt_reg());
        let rd = Operand::Gpr(self.rd_reg());
        let fd = Operand::Fpr(self.fd() as u8);

        match self.opcode {
            Opcode::MTHI => vec![Operand::Hi],
            Opcode::MTLO => vec![Operand::Lo],
            Opcode::MFC1 | Opcode::CFC1 => vec![rt],
            Opcode::MTC1 => vec![Operand::Fpr(self.fs() as u8)],
            Opcode::CTC1 => vec![Operand::Fcsr],
            Opcode::SC => vec![rt],
            _ if self.is_call() => match self.opcode.format() {
                F::JumpLinkRegister => vec![rd],
                _ => vec![Operand::Gpr(Register::Ra)],
            },
            _ => match self.opcode.format() {
                F::Register | F::Shift | F::ShiftVariable | F::MoveFrom | F::Count => vec![rd],
                F::ConditionalMove => vec![rd],
                F::MultDiv => vec![Operand::Hi, Operand::Lo],
                F::Immediate | F::UpperImmediate => vec![rt],
                F::Memory if self.opcode.flags().contains(InstructionFlags::LOAD) => vec![rt],
                F::FpuMemory if self.opcode.flags().contains(InstructionFlags::LOAD) => {
                    vec![Operand::Fpr(self.ft() as u8)]
                }
                F::FpuCompare => vec![Operand::Fcsr],
                F::FpuBinary
                | F::FpuUnary
                | F::FpuConvert
                | F::FpuConditionalMove
                | F::FpuMoveGpr => vec![fd],
                _ => vec![],
            },
        }
    }

    /// Destination of a taken relative branch at `pc`.
    pub const fn branch_target(&self, pc: u32) -> u32 {
        pc.wrapping_add(4).wrapping_add((self.imm() << 2) as u32)
    }

    /// Destination of `j`/`jal` at `pc`: the 256 MiB region of the delay slot.
    pub const fn jump_target(&self, pc: u32) -> u32 {
        (pc.wrapping_add(4) & 0xf000_0000) | (self.target() << 2)
    }

    fn fmt_mnemonic(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suffix = self.format().map(|fmt| fmt.suffix()).unwrap_or("?");
        match self.opcode.format() {
            InstructionFormat::FpuCompare => write!(
                f,
                "c.{}.{}",
                COMPARE_CONDITIONS[self.cond() as usize],
                suffix
            ),
            InstructionFormat::FpuBinary
            | InstructionFormat::FpuUnary
            | InstructionFormat::FpuConvert
            | InstructionFormat::FpuConditionalMove
            | InstructionFormat::FpuMoveGpr => write!(f, "{}.{}", self.opcode, suffix),
            _ => write!(f, "{}", self.opcode),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use InstructionFormat as F;
        let (rs, rt, rd) = (self.rs_reg(), self.rt_reg(), self.rd_reg());
        let (fs, ft, fd) = (self.fs(), self.ft(), self.fd());
        let offset = self.imm() << 2;

        if self.opcode == Opcode::UNKNOWN {
            return write!(f, "unknown 0x{:08x}", self.word);
        }
        self.fmt_mnemonic(f)?;
        match self.opcode.format() {
            F::None => Ok(()),
            F::Register => write!(f, " {rd}, {rs}, {rt}"),
            F::Shift => write!(f, " {rd}, {rt}, {}", self.shamt()),
            F::ShiftVariable => write!(f, " {rd}, {rt}, {rs}"),
            F::MultDiv => write!(f, " {rs}, {rt}"),
            F::MoveFrom => write!(f, " {rd}"),
            F::MoveTo | F::JumpRegister => write!(f, " {rs}"),
            F::Count | F::JumpLinkRegister => write!(f, " {rd}, {rs}"),
            F::ConditionalMove => write!(f, " {rd}, {rs}, $fcc{}", self.cc()),
            F::Immediate => match self.opcode {
                Opcode::ANDI | Opcode::ORI | Opcode::XORI => {
                    write!(f, " {rt}, {rs}, 0x{:x}", self.uimm())
                }
                _ => write!(f, " {rt}, {rs}, {}", self.imm()),
            },
            F::UpperImmediate => write!(f, " {rt}, 0x{:x}", self.uimm()),
            F::Memory => write!(f, " {rt}, {}({rs})", self.imm()),
            F::FpuMemory => write!(f, " $f{ft}, {}({rs})", self.imm()),
            F::Branch => write!(f, " {rs}, {rt}, {offset}"),
            F::BranchZero => write!(f, " {rs}, {offset}"),
            F::BranchAlways => write!(f, " {offset}"),
            F::Jump => write!(f, " 0x{:x}", self.target() << 2),
            F::FpuMove => write!(f, " {rt}, $f{fs}"),
            F::FpuBranch => write!(f, " $fcc{}, {offset}", self.cc()),
            F::FpuBinary => write!(f, " $f{fd}, $f{fs}, $f{ft}"),
            F::FpuUnary | F::FpuConvert => write!(f, " $f{fd}, $f{fs}"),
            F::FpuCompare => write!(f, " $fcc{}, $f{fs}, $f{ft}", self.compare_cc()),
            F::FpuConditionalMove => write!(f, " $f{fd}, $f{fs}, $fcc{}", self.cc()),
            F::FpuMoveGpr => write!(f, " $f{fd}, $f{fs}, {rt}"),
        }
    }
}
