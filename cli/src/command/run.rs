use std::{
    path::PathBuf,
    sync::atomic::{AtomicU8, Ordering},
};

use anyhow::Context;
use clap::Args;
use mipsemu_config::{Config, ContextEntry, ContextFile, KernelConfig};
use mipsemu_vm::emulator::{Emulator, StatsLevel};
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Load the contexts described in an INI file instead of <EXE>.
    #[arg(long, value_name = "FILE", conflicts_with = "exe")]
    pub ctx_config: Option<PathBuf>,

    /// Guest executable.
    #[arg(required_unless_present = "ctx_config")]
    pub exe: Option<PathBuf>,

    /// Arguments passed to the guest.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Stats level requested by the last host signal, 0 when none.
static STATS_REQUEST: AtomicU8 = AtomicU8::new(0);

extern "C" fn request_stats(sig: libc::c_int) {
    let level = if sig == libc::SIGUSR2 { 2 } else { 1 };
    STATS_REQUEST.store(level, Ordering::Relaxed);
}

fn install_stats_handlers() {
    let handler = request_stats as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for sig in [libc::SIGUSR1, libc::SIGUSR2] {
        if unsafe { libc::signal(sig, handler) } == libc::SIG_ERR {
            warn!("cannot install handler for host signal {sig}");
        }
    }
}

fn take_stats_request() -> Option<StatsLevel> {
    match STATS_REQUEST.swap(0, Ordering::Relaxed) {
        1 => Some(StatsLevel::Summary),
        2 => Some(StatsLevel::Backtraces),
        _ => None,
    }
}

fn entries(args: RunArgs) -> anyhow::Result<Vec<ContextEntry>> {
    let RunArgs { ctx_config, exe, args } = args;

    if let Some(path) = ctx_config {
        let file = ContextFile::from_path(&path)
            .with_context(|| format!("invalid context file {}", path.display()))?;
        return Ok(file.entries);
    }
    let exe = exe.context("no executable given")?;
    Ok(vec![ContextEntry::new(exe, args)])
}

/// Run the guest programs to completion and return the number of executed
/// instructions.
pub fn handle_command(args: RunArgs) -> anyhow::Result<u64> {
    let config = KernelConfig::from_env()?;
    let mut emulator = Emulator::new(&config);

    for entry in entries(args)? {
        emulator
            .load_program(&entry)
            .with_context(|| format!("cannot load {}", entry.exe.display()))?;
    }
    install_stats_handlers();

    while !emulator.is_done() {
        if let Some(level) = take_stats_request() {
            emulator.dump_stats(level, &mut std::io::stderr())?;
        }
        emulator.run_round()?;
    }

    let executed = emulator.executed();
    info!("finished after {} cycles", emulator.cycle());
    emulator.shutdown()?;
    Ok(executed)
}
