pub mod decoder;
pub mod encoder;
pub mod instruction;
pub mod opcode;
pub mod register;

pub use decoder::decode_instruction;
pub use encoder::{
    encode_branch, encode_compare, encode_cop1_move, encode_fr_type, encode_i_type, encode_instruction,
    encode_j_type, encode_r_type, encode_shift,
};
pub use instruction::{FpuFormat, Instruction, Operand};
pub use opcode::{FunctionalUnit, InstructionFlags, InstructionFormat, Opcode};
pub use register::Register;
