//! The emulator instance: kernel, system state and the execute driver.
//!
//! ## Examples
//!
//! ```no_run
//! use mipsemu_config::{ContextEntry, KernelConfig};
//! use mipsemu_vm::emulator::Emulator;
//!
//! let mut emulator = Emulator::new(&KernelConfig::default());
//! emulator
//!     .load_program(&ContextEntry::new("hello.elf", vec![]))
//!     .expect("Unable to load program");
//!
//! match emulator.run() {
//!     Ok(executed) => println!("{executed} instructions"),
//!     Err(e) => println!("Execution error: {e}"),
//! }
//! ```

mod events;
mod executor;
pub mod instructions;
mod signals;
mod stats;

pub use executor::Emulator;
pub use stats::StatsLevel;
