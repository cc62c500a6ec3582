use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub use crate::constants::NUM_REGISTERS;

/// A general purpose register, named after its o32 ABI role.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    #[default]
    Zero = 0,
    At = 1,
    V0 = 2,
    V1 = 3,
    A0 = 4,
    A1 = 5,
    A2 = 6,
    A3 = 7,
    T0 = 8,
    T1 = 9,
    T2 = 10,
    T3 = 11,
    T4 = 12,
    T5 = 13,
    T6 = 14,
    T7 = 15,
    S0 = 16,
    S1 = 17,
    S2 = 18,
    S3 = 19,
    S4 = 20,
    S5 = 21,
    S6 = 22,
    S7 = 23,
    T8 = 24,
    T9 = 25,
    K0 = 26,
    K1 = 27,
    Gp = 28,
    Sp = 29,
    Fp = 30,
    Ra = 31,
}

impl From<u8> for Register {
    fn from(value: u8) -> Self {
        match value {
            0 => Register::Zero,
            1 => Register::At,
            2 => Register::V0,
            3 => Register::V1,
            4 => Register::A0,
            5 => Register::A1,
            6 => Register::A2,
            7 => Register::A3,
            8 => Register::T0,
            9 => Register::T1,
            10 => Register::T2,
            11 => Register::T3,
            12 => Register::T4,
            13 => Register::T5,
            14 => Register::T6,
            15 => Register::T7,
            16 => Register::S0,
            17 => Register::S1,
            18 => Register::S2,
            19 => Register::S3,
            20 => Register::S4,
            21 => Register::S5,
            22 => Register::S6,
            23 => Register::S7,
            24 => Register::T8,
            25 => Register::T9,
            26 => Register::K0,
            27 => Register::K1,
            28 => Register::Gp,
            29 => Register::Sp,
            30 => Register::Fp,
            31 => Register::Ra,
            _ => unreachable!(),
        }
    }
}

impl Register {
    pub fn abi_name(&self) -> &'static str {
        match self {
            Register::Zero => "zero",
            Register::At => "at",
            Register::V0 => "v0",
            Register::V1 => "v1",
            Register::A0 => "a0",
            Register::A1 => "a1",
            Register::A2 => "a2",
            Register::A3 => "a3",
            Register::T0 => "t0",
            Register::T1 => "t1",
            Register::T2 => "t2",
            Register::T3 => "t3",
            Register::T4 => "t4",
            Register::T5 => "t5",
            Register::T6 => "t6",
            Register::T7 => "t7",
            Register::S0 => "s0",
            Register::S1 => "s1",
            Register::S2 => "s2",
            Register::S3 => "s3",
            Register::S4 => "s4",
            Register::S5 => "s5",
            Register::S6 => "s6",
            Register::S7 => "s7",
            Register::T8 => "t8",
            Register::T9 => "t9",
            Register::K0 => "k0",
            Register::K1 => "k1",
            Register::Gp => "gp",
            Register::Sp => "sp",
            Register::Fp => "fp",
            Register::Ra => "ra",
        }
    }

    /// Register fields are five bits wide; higher bits are ignored.
    pub fn from_field(value: u32) -> Self {
        Register::from((value & 0x1f) as u8)
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.abi_name())
    }
}
