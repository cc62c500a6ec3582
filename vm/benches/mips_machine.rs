use iai_callgrind::{library_benchmark, library_benchmark_group, main};
use mipsemu_common::{
    constants::TEXT_BASE,
    memory::MemoryProcessor,
    mips::{encode_branch, encode_i_type, Opcode, Register},
};
use mipsemu_config::KernelConfig;
use mipsemu_vm::emulator::Emulator;

/// Count `iterations` down to zero, then halt.
fn run_countdown(iterations: u16) -> Result<u64, Box<dyn std::error::Error>> {
    let program = [
        encode_i_type(Opcode::ORI, Register::T0, Register::Zero, iterations),
        encode_i_type(Opcode::ADDIU, Register::T0, Register::T0, (-1i16) as u16),
        encode_branch(Opcode::BNE, Register::T0, Register::Zero, -8),
        encode_i_type(Opcode::ADDIU, Register::T1, Register::T1, 1),
        0x0000_000d,
    ];

    let mut emulator = Emulator::new(&KernelConfig::default());
    let ctx = emulator.kernel.create()?;
    let context = emulator.kernel.context_mut(ctx)?;
    for (i, word) in program.into_iter().enumerate() {
        context.memory.write_word(TEXT_BASE + 4 * i as u32, word)?;
    }
    context.registers.start_at(TEXT_BASE);

    Ok(emulator.run()?)
}

#[library_benchmark]
#[benches::multiple(100, 10_000)]
fn bench_mips_countdown(iterations: u16) {
    run_countdown(iterations).expect("Failed to run MIPS countdown loop");
}

library_benchmark_group!(
    name = bench_mips_emulator;
    benchmarks = bench_mips_countdown
);

main!(library_benchmark_groups = bench_mips_emulator);
