use std::fmt::Display;
use std::ops::Index;

use mipsemu_common::{constants::NUM_REGISTERS, cpu::Registers, mips::Register};

/// FPU implementation register value reported through `cfc1 $0`.
const FIR_DEFAULT: u32 = 0;

/// Architectural state of one context.
///
/// The program counter is a three stage pipeline: `pc` is the instruction
/// being executed, `npc` the delay slot and `nnpc` the instruction after it.
/// Branches only ever write `nnpc`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    gpr: [u32; NUM_REGISTERS],
    fpr: [u32; NUM_REGISTERS],
    pub hi: u32,
    pub lo: u32,
    pub fir: u32,
    pub fcsr: u32,
    pub pc: u32,
    pub npc: u32,
    pub nnpc: u32,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            gpr: [0; NUM_REGISTERS],
            fpr: [0; NUM_REGISTERS],
            hi: 0,
            lo: 0,
            fir: FIR_DEFAULT,
            fcsr: 0,
            pc: 0,
            npc: 0,
            nnpc: 0,
        }
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare the pipeline so that the next `advance_pc` fetches `entry`.
    pub fn start_at(&mut self, entry: u32) {
        self.pc = 0;
        self.npc = entry;
        self.nnpc = entry.wrapping_add(4);
    }

    pub fn advance_pc(&mut self) {
        self.pc = self.npc;
        self.npc = self.nnpc;
        self.nnpc = self.nnpc.wrapping_add(4);
    }

    /// Redirect fetch after the delay slot.
    pub fn branch(&mut self, target: u32) {
        self.nnpc = target;
    }

    /// Read a general purpose register by its 5-bit field value.
    pub fn gpr(&self, index: u32) -> u32 {
        self.gpr[(index & 0x1f) as usize]
    }

    pub fn set_gpr(&mut self, index: u32, value: u32) {
        let index = (index & 0x1f) as usize;
        if index != 0 {
            self.gpr[index] = value;
        }
    }

    pub fn fpr_bits(&self, index: u32) -> u32 {
        self.fpr[(index & 0x1f) as usize]
    }

    pub fn set_fpr_bits(&mut self, index: u32, value: u32) {
        self.fpr[(index & 0x1f) as usize] = value;
    }

    pub fn single(&self, index: u32) -> f32 {
        f32::from_bits(self.fpr_bits(index))
    }

    pub fn set_single(&mut self, index: u32, value: f32) {
        self.set_fpr_bits(index, value.to_bits());
    }

    /// Raw bits of the even/odd pair holding `index`; the even register keeps
    /// the low word.
    pub fn dword(&self, index: u32) -> u64 {
        let even = index & 0x1e;
        (self.fpr_bits(even + 1) as u64) << 32 | self.fpr_bits(even) as u64
    }

    pub fn set_dword(&mut self, index: u32, value: u64) {
        let even = index & 0x1e;
        self.set_fpr_bits(even, value as u32);
        self.set_fpr_bits(even + 1, (value >> 32) as u32);
    }

    pub fn double(&self, index: u32) -> f64 {
        f64::from_bits(self.dword(index))
    }

    pub fn set_double(&mut self, index: u32, value: f64) {
        self.set_dword(index, value.to_bits());
    }

    const fn fpcc_bit(cc: u32) -> u32 {
        if cc == 0 {
            23
        } else {
            24 + (cc & 7)
        }
    }

    /// FP condition code `cc`.
    pub fn fpcc(&self, cc: u32) -> bool {
        self.fcsr >> Self::fpcc_bit(cc) & 1 != 0
    }

    pub fn set_fpcc(&mut self, cc: u32, value: bool) {
        let bit = 1 << Self::fpcc_bit(cc);
        if value {
            self.fcsr |= bit;
        } else {
            self.fcsr &= !bit;
        }
    }

    /// Read FPU control register `fs` (the `cfc1` view). `None` for registers
    /// that do not exist.
    pub fn read_fcr(&self, fs: u32) -> Option<u32> {
        let fcsr = self.fcsr;
        let value = match fs {
            0 => self.fir,
            // FCCR: all eight condition codes packed together
            25 => (bits(fcsr, 31, 25) << 1) | bits(fcsr, 23, 23),
            // FEXR: cause and flags
            26 => (bits(fcsr, 17, 12) << 12) | (bits(fcsr, 6, 2) << 2),
            // FENR: enables, FS and rounding mode
            28 => (bits(fcsr, 11, 7) << 7) | (bits(fcsr, 24, 24) << 2) | bits(fcsr, 1, 0),
            31 => fcsr,
            _ => return None,
        };
        Some(value)
    }

    /// Write FPU control register `fs` (the `ctc1` view). Returns `false` for
    /// registers that do not exist or are read-only.
    pub fn write_fcr(&mut self, fs: u32, value: u32) -> bool {
        let fcsr = self.fcsr;
        self.fcsr = match fs {
            25 => {
                (bits(value, 7, 1) << 25)
                    | (bits(fcsr, 24, 24) << 24)
                    | (bits(value, 0, 0) << 23)
                    | bits(fcsr, 22, 0)
            }
            26 => {
                (bits(fcsr, 31, 18) << 18)
                    | (bits(value, 17, 12) << 12)
                    | (bits(fcsr, 11, 7) << 7)
                    | (bits(value, 6, 2) << 2)
                    | bits(fcsr, 1, 0)
            }
            28 => {
                (bits(fcsr, 31, 25) << 25)
                    | (bits(value, 2, 2) << 24)
                    | (bits(fcsr, 23, 12) << 12)
                    | (bits(value, 11, 7) << 7)
                    | (bits(fcsr, 6, 2) << 2)
                    | bits(value, 1, 0)
            }
            31 => value,
            _ => return false,
        };
        true
    }
}

const fn bits(value: u32, hi: u32, lo: u32) -> u32 {
    (value >> lo) & (u32::MAX >> (31 - (hi - lo)))
}

impl Registers for RegisterFile {
    fn read(&self, reg: Register) -> u32 {
        self.gpr(reg as u32)
    }

    fn write(&mut self, reg: Register, value: u32) {
        self.set_gpr(reg as u32, value)
    }
}

impl Index<Register> for RegisterFile {
    type Output = u32;

    fn index(&self, index: Register) -> &Self::Output {
        &self.gpr[index as usize]
    }
}

impl Display for RegisterFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "+--------+------------+--------+------------+--------+------------+--------+------------+")?;
        writeln!(f, "| T Regs | Value      | A Regs | Value      | S Regs | Value      | Others | Value      |")?;
        writeln!(f, "+--------+------------+--------+------------+--------+------------+--------+------------+")?;

        let t_regs = [8, 9, 10, 11, 12, 13, 14, 15, 24, 25];
        let a_regs = [4, 5, 6, 7, 2, 3];
        let s_regs = [16, 17, 18, 19, 20, 21, 22, 23, 30];
        let other_regs = [0, 1, 26, 27, 28, 29, 31];

        let max_rows = t_regs
            .len()
            .max(a_regs.len())
            .max(s_regs.len())
            .max(other_regs.len());

        let cell = |regs: &[usize], i: usize| {
            regs.get(i)
                .map(|&r| (Register::from(r as u8), self.gpr[r]))
        };

        for i in 0..max_rows {
            let t_reg = cell(&t_regs, i);
            let a_reg = cell(&a_regs, i);
            let s_reg = cell(&s_regs, i);
            let other_reg = cell(&other_regs, i);

            writeln!(
                f,
                "| {:<6} | {:#010x} | {:<6} | {:#010x} | {:<6} | {:#010x} | {:<6} | {:#010x} |",
                t_reg.map_or("", |(r, _)| r.abi_name()),
                t_reg.map_or(0, |(_, v)| v),
                a_reg.map_or("", |(r, _)| r.abi_name()),
                a_reg.map_or(0, |(_, v)| v),
                s_reg.map_or("", |(r, _)| r.abi_name()),
                s_reg.map_or(0, |(_, v)| v),
                other_reg.map_or("", |(r, _)| r.abi_name()),
                other_reg.map_or(0, |(_, v)| v),
            )?;
        }

        writeln!(f, "+--------+------------+--------+------------+--------+------------+--------+------------+")?;
        writeln!(
            f,
            "| hi {:#010x} | lo {:#010x} | fcsr {:#010x} | pc {:#010x} | npc {:#010x} |",
            self.hi, self.lo, self.fcsr, self.pc, self.npc
        )?;
        Ok(())
    }
}
