//! User-mode functional emulator for 32-bit big-endian MIPS programs.
//!
//! Guest processes and threads run as contexts scheduled round robin by a
//! single host thread. Syscalls are served by the host, except for pipes,
//! signals and process management, which are emulated.

pub mod cpu;
pub mod elf;
pub mod emulator;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod system;
