pub mod constants;
pub mod cpu;
pub mod error;
pub mod memory;
pub mod mips;
