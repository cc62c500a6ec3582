use std::{backtrace::Backtrace, fmt::Display, panic::Location};

pub use mipsemu_common::error::*;

use mipsemu_common::mips::Instruction;
use thiserror::Error;

use crate::elf::ElfError;

#[derive(Debug)]
pub struct VMError {
    pub source: VMErrorKind,
    pub location: &'static Location<'static>,
    pub backtrace: Backtrace,
}

impl Display for VMError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} at ", self.source)?;
        writeln!(f, "Location: {}", self.location)?;
        write!(f, "Backtrace: {}", self.backtrace)?;
        Ok(())
    }
}

impl core::error::Error for VMError {}

impl PartialEq for VMError {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl VMError {
    /// Tag the error with the context and program counter it was raised at.
    pub fn in_context(self, ctx: usize, pc: u32) -> Self {
        Self {
            source: self.source.in_context(ctx, pc),
            ..self
        }
    }
}

impl<T> From<T> for VMError
where
    T: Into<VMErrorKind>,
{
    #[track_caller]
    fn from(source: T) -> Self {
        VMError {
            source: source.into(),
            location: Location::caller(),
            backtrace: Backtrace::capture(),
        }
    }
}

/// Fatal emulator conditions. Anything reported through this type ends the
/// whole run; guest-recoverable failures are reported to the guest instead.
#[derive(Debug, Error, PartialEq)]
pub enum VMErrorKind {
    // An error raised while a context was executing, tagged with where
    #[error("context {0} at pc=0x{1:08x}: {2}")]
    ContextFault(usize, u32, Box<VMErrorKind>),

    // Word decoded to no known instruction, or a handler does not support it
    #[error("Unimplemented instruction 0x{word:08x} (op=0x{op:02x}, func=0x{func:02x}): {instruction}", word = .0.word, op = .0.op(), func = .0.func(), instruction = .0)]
    UnimplementedInstruction(Instruction),

    // Floating point format field invalid for the opcode
    #[error("Invalid floating point format {fmt} for \"{instruction}\"", fmt = .0.fmt(), instruction = .0)]
    FormatError(Instruction),

    #[error("Unimplemented syscall {0} ({1}) at pc=0x{2:08x}")]
    UnimplementedSyscall(u32, &'static str, u32),

    // Syscall with an argument combination the emulator does not model
    #[error("Unsupported arguments for syscall {0}: {1}")]
    UnsupportedSyscall(&'static str, String),

    #[error("No handler registered for signal {0}")]
    MissingSignalHandler(u32),

    // Handlers run nested in the emulator loop and cannot wait for events
    #[error("Blocking system call inside the handler of signal {0}")]
    BlockedInSignalHandler(u32),

    #[error("Context table is full ({0} contexts)")]
    ContextTableFull(usize),

    #[error("Context {0} does not exist")]
    InvalidContext(usize),

    #[error("Context {0} is not speculative")]
    NotSpeculative(usize),

    #[error("Context {0} is already finished")]
    AlreadyFinished(usize),

    #[error("Context {0} must be finished before it is killed")]
    NotFinished(usize),

    #[error("Context {0} is not running")]
    NotRunning(usize),

    #[error("Context {0} is already suspended")]
    AlreadySuspended(usize),

    #[error("Context {0} is not suspended")]
    NotSuspended(usize),

    #[error("Zombie list is full ({0} entries)")]
    ZombieTableFull(usize),

    #[error("No free pipe descriptors")]
    PipeDescriptorsExhausted,

    // Program arguments do not fit in the environment area
    #[error("Arguments overflow the environment area")]
    EnvironmentOverflow,

    #[error("Cannot open {0}: {1}")]
    HostFile(String, String),

    #[error("Wrapped MemoryError: {0}")]
    MemoryError(#[from] mipsemu_common::error::MemoryError),

    #[error("Wrapped ElfError: {0}")]
    ElfError(#[from] ElfError),
}

impl VMErrorKind {
    /// Attach the failing context and program counter.
    pub fn in_context(self, ctx: usize, pc: u32) -> Self {
        match self {
            fault @ VMErrorKind::ContextFault(..) => fault,
            other => VMErrorKind::ContextFault(ctx, pc, Box::new(other)),
        }
    }
}

/// Result type for VM functions that can produce errors.
pub type Result<T, E = VMError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use mipsemu_common::mips::decode_instruction;

    #[test]
    fn test_context_fault_display() {
        let kind =
            VMErrorKind::UnimplementedSyscall(4021, "mount", 0x0040_0010).in_context(3, 0x0040_0010);
        assert_eq!(
            kind.to_string(),
            "context 3 at pc=0x00400010: Unimplemented syscall 4021 (mount) at pc=0x00400010"
        );

        // Tagging twice keeps the innermost location
        let again = kind.in_context(5, 0);
        assert!(matches!(again, VMErrorKind::ContextFault(3, 0x0040_0010, _)));
    }

    #[test]
    fn test_unimplemented_display() {
        let kind = VMErrorKind::UnimplementedInstruction(decode_instruction(0xffff_ffff));
        assert!(kind
            .to_string()
            .starts_with("Unimplemented instruction 0xffffffff"));
    }
}
