//! Guest operating system layer: syscalls, signals, pipes and the event
//! queue resuming contexts blocked in syscalls.

pub mod abi;
pub mod event;
pub mod host;
pub mod pipe;
pub mod signal;
pub mod syscall;

use abi::ResourceLimits;
use event::EventQueue;
use pipe::PipeTable;
use signal::SignalTable;

/// Emulator-wide state shared by every guest context.
#[derive(Debug, Default)]
pub struct System {
    pub events: EventQueue,
    pub pipes: PipeTable,
    pub signal_table: SignalTable,
    pub limits: ResourceLimits,
}
