use clap::Parser;

use mipsemu_cli::{command::run, setup_logger, Cli};

fn main() -> anyhow::Result<()> {
    let Cli { verbose, run } = Cli::parse();
    let _guard = setup_logger(verbose);

    let executed = run::handle_command(run)?;
    println!("{executed} instructions executed");
    Ok(())
}
