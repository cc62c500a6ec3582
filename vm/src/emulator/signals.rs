//! Signal delivery.
//!
//! A handler runs as a nested call inside the emulator loop: registers are
//! saved, control jumps to the handler with `ra` pointing at a sentinel
//! address, the context is stepped until it returns there, and the saved
//! registers are restored. A handler that blocks in a system call is fatal:
//! its event would complete against the restored registers.

use mipsemu_common::{constants::SIGNAL_RETURN_ADDRESS, mips::Register};
use tracing::debug;

use super::Emulator;
use crate::{
    error::{Result, VMErrorKind},
    kernel::{ContextId, ContextStatus},
    system::signal::{ignored_by_default, signal_name, SIG_DFL, SIG_IGN},
};

impl Emulator {
    /// Deliver every pending, unblocked signal of every running context.
    pub fn process_signals(&mut self) -> Result<()> {
        for id in self.kernel.ids() {
            while let Some(sig) = self
                .kernel
                .get(id)
                .filter(|context| context.is_running())
                .and_then(|context| context.signals.deliverable())
            {
                self.run_signal(id, sig)?;
            }
        }
        Ok(())
    }

    fn run_signal(&mut self, ctx: ContextId, sig: u32) -> Result<()> {
        let handler = self.system.signal_table.get(sig).map_or(SIG_DFL, |action| action.handler);
        let context = self.kernel.context_mut(ctx)?;
        context.signals.pending.remove(sig);

        match handler {
            SIG_IGN => return Ok(()),
            SIG_DFL if ignored_by_default(sig) => return Ok(()),
            SIG_DFL => {
                let mut trace = Vec::new();
                if context.write_backtrace(&mut trace).is_ok() {
                    debug!("{}", String::from_utf8_lossy(&trace));
                }
                return Err(VMErrorKind::MissingSignalHandler(sig).into());
            }
            _ => {}
        }

        debug!("ctx{ctx} 0x{handler:08x}: running {} handler", signal_name(sig));
        let saved = context.registers;
        context.set_gpr(Register::A0, sig);
        context.set_gpr(Register::T9, handler);
        context.set_gpr(Register::Ra, SIGNAL_RETURN_ADDRESS);
        context.registers.npc = handler;
        context.registers.nnpc = handler.wrapping_add(4);

        while self
            .kernel
            .get(ctx)
            .is_some_and(|context| context.is_running() && context.registers.npc != SIGNAL_RETURN_ADDRESS)
        {
            self.execute_one(ctx)?;
        }

        let Some(context) = self.kernel.get_mut(ctx) else {
            return Ok(());
        };
        if context.is(ContextStatus::SUSPENDED) {
            return Err(VMErrorKind::BlockedInSignalHandler(sig).into());
        }
        context.registers = saved;
        debug!("ctx{ctx}: returned from {} handler", signal_name(sig));
        Ok(())
    }
}
