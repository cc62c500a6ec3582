//! # mipsemu
//!
//! Command-line driver of the MIPS user-mode emulator.
//!
//! ```sh
//! mipsemu ./hello arg1 arg2
//! mipsemu --ctx-config contexts.ini
//! ```
//!
//! Sending `SIGUSR1` to the emulator prints a summary of every context to
//! stderr, `SIGUSR2` adds their backtraces.

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod command;

#[derive(Debug, Parser)]
#[command(name = "mipsemu")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log every syscall and kernel transition.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(flatten)]
    pub run: command::run::RunArgs,
}

pub fn setup_logger(verbose: bool) -> tracing::subscriber::DefaultGuard {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
                .with_file(false)
                .with_line_number(false),
        )
        .with(filter)
        .set_default()
}
