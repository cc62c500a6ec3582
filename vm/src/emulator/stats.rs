use std::io::{self, Write};

use super::Emulator;

/// Detail of a statistics dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatsLevel {
    /// Cycle and instruction counts and the state of every context.
    Summary = 1,
    /// Also every context's call stack.
    Backtraces = 2,
}

impl Emulator {
    pub fn dump_stats(&self, level: StatsLevel, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "cycles: {}", self.cycle())?;
        writeln!(out, "instructions: {}", self.executed())?;
        writeln!(
            out,
            "contexts: {} alive, {} active, {} zombies",
            self.kernel.alive_count(),
            self.kernel.active_count(),
            self.kernel.zombie_count()
        )?;

        for context in self.kernel.contexts() {
            writeln!(
                out,
                "ctx{} pid={} status={} pc=0x{:08x}",
                context.id, context.pid, context.status, context.registers.pc
            )?;
            if level >= StatsLevel::Backtraces {
                context.write_backtrace(out)?;
            }
        }
        Ok(())
    }
}
