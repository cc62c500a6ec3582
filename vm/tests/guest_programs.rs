use mipsemu_common::{
    constants::{DATA_BASE, SYSCALL_BASE, TEXT_BASE},
    memory::MemoryProcessor,
    mips::{encode_branch, encode_i_type, encode_r_type, encode_shift, Opcode, Register},
};
use mipsemu_config::{ContextEntry, KernelConfig};
use mipsemu_vm::{
    elf::{ElfBuilder, ElfFile},
    emulator::Emulator,
    kernel::ContextId,
};

use Register::*;

const SYSCALL: u32 = 0x0000_000c;

fn li(rt: Register, value: i16) -> u32 {
    encode_i_type(Opcode::ADDIU, rt, Zero, value as u16)
}

fn syscall(n: u32) -> [u32; 2] {
    [li(V0, (SYSCALL_BASE + n) as i16), SYSCALL]
}

fn mov(rd: Register, rs: Register) -> u32 {
    encode_r_type(Opcode::ADDU, rd, rs, Zero)
}

fn lui(rt: Register, value: u16) -> u32 {
    encode_i_type(Opcode::LUI, rt, Zero, value)
}

fn image(text: &[u32], data: &[u8]) -> Vec<u8> {
    ElfBuilder::new(TEXT_BASE)
        .text(TEXT_BASE, text)
        .data(DATA_BASE, data)
        .symbol("__start", TEXT_BASE, true)
        .build()
}

fn boot(text: &[u32], data: &[u8]) -> (Emulator, ContextId) {
    let elf = ElfFile::from_bytes(&image(text, data)).unwrap();
    let mut emulator = Emulator::new(&KernelConfig::default());
    let ctx = emulator
        .load_elf(&ContextEntry::new("/guest/prog", vec![]), elf)
        .unwrap();
    (emulator, ctx)
}

#[test]
fn test_exit_code_from_file() {
    let mut text = vec![li(A0, 42)];
    text.extend(syscall(1));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exit42");
    std::fs::write(&path, image(&text, &[0; 4])).unwrap();

    let mut emulator = Emulator::new(&KernelConfig::default());
    let ctx = emulator.load_program(&ContextEntry::new(&path, vec![])).unwrap();

    assert_eq!(emulator.run(), Ok(3));
    assert_eq!(emulator.kernel.context(ctx).unwrap().exit_code, 42);
    assert_eq!(emulator.kernel.zombie_count(), 1);
}

#[test]
fn test_single_exit_syscall() {
    let (mut emulator, ctx) = boot(&[SYSCALL], &[0; 4]);
    let context = emulator.kernel.context_mut(ctx).unwrap();
    context.set_gpr(V0, SYSCALL_BASE + 1);
    context.set_gpr(A0, 42);

    assert_eq!(emulator.run(), Ok(1));
    assert_eq!(emulator.kernel.active_count(), 0);
    assert_eq!(emulator.kernel.zombie_count(), 1);
    assert_eq!(emulator.kernel.context(ctx).unwrap().exit_code, 42);
}

#[test]
fn test_fork_then_both_exit() {
    let mut text = Vec::new();
    text.extend(syscall(2));
    text.push(li(A0, 0));
    text.extend(syscall(1));

    let (mut emulator, _) = boot(&text, &[0; 4]);
    emulator.run().unwrap();

    assert_eq!(emulator.kernel.active_count(), 0);
    let zombies: Vec<_> = emulator.kernel.zombies().map(|zombie| zombie.pid).collect();
    assert_eq!(zombies.len(), 2);
    assert_ne!(zombies[0], zombies[1]);
    assert!(emulator.kernel.zombies().all(|zombie| zombie.exit_code == 0));
}

#[test]
fn test_fork_and_wait() {
    let mut text = Vec::new();
    text.extend(syscall(2));
    text.extend([encode_branch(Opcode::BEQ, V0, Zero, 4 * 10), 0]);
    // Parent: waitpid(-1, DATA_BASE, 0), then exit with the child's code
    text.extend([li(A0, -1), lui(A1, (DATA_BASE >> 16) as u16), li(A2, 0)]);
    text.extend(syscall(7));
    text.extend([
        encode_i_type(Opcode::LW, A0, A1, 0),
        encode_shift(Opcode::SRL, A0, A0, 8),
    ]);
    text.extend(syscall(1));
    assert_eq!(text.len(), 13);
    // Child
    text.push(li(A0, 7));
    text.extend(syscall(1));

    let (mut emulator, parent) = boot(&text, &[0; 4]);
    emulator.run().unwrap();

    let context = emulator.kernel.context(parent).unwrap();
    assert_eq!(context.exit_code, 7);
    assert_eq!(context.child_count, 1);
    // The child was reaped, only the parent is left
    let zombies: Vec<_> = emulator.kernel.zombies().map(|zombie| zombie.pid).collect();
    assert_eq!(zombies, [context.pid]);
}

#[test]
fn test_pipe_between_processes() {
    let mut text = Vec::new();
    text.extend(syscall(42));
    text.extend([mov(S0, V0), mov(S1, V1)]);
    text.extend(syscall(2));
    text.extend([encode_branch(Opcode::BNE, V0, Zero, 4 * 9), 0]);
    // Child: write(s1, "hi", 2); exit(0)
    text.extend([mov(A0, S1), lui(A1, (DATA_BASE >> 16) as u16), li(A2, 2)]);
    text.extend(syscall(4));
    text.push(li(A0, 0));
    text.extend(syscall(1));
    assert_eq!(text.len(), 16);
    // Parent: exit(read(s0, DATA_BASE + 0x100, 16))
    text.extend([
        mov(A0, S0),
        lui(A1, (DATA_BASE >> 16) as u16),
        encode_i_type(Opcode::ORI, A1, A1, 0x100),
        li(A2, 16),
    ]);
    text.extend(syscall(3));
    text.push(mov(A0, V0));
    text.extend(syscall(1));

    let (mut emulator, parent) = boot(&text, b"hi");
    emulator.run().unwrap();

    let context = emulator.kernel.context_mut(parent).unwrap();
    assert_eq!(context.exit_code, 2);
    assert_eq!(context.memory.read_bytes(DATA_BASE + 0x100, 2).unwrap(), b"hi");
    assert!(emulator.system.events.is_empty());
}

#[test]
fn test_reader_blocks_until_writer() {
    // The reader runs first and finds the pipe empty
    let mut text = Vec::new();
    text.extend(syscall(42));
    text.extend([mov(S0, V0), mov(S1, V1)]);
    text.extend(syscall(2));
    text.extend([encode_branch(Opcode::BEQ, V0, Zero, 4 * 9), 0]);
    // Parent reads
    text.extend([mov(A0, S0), lui(A1, (DATA_BASE >> 16) as u16), li(A2, 4)]);
    text.extend(syscall(3));
    text.push(mov(A0, V0));
    text.extend(syscall(1));
    assert_eq!(text.len(), 16);
    // Child spins a while, then writes
    text.extend([
        li(T0, 50),
        encode_i_type(Opcode::ADDIU, T0, T0, (-1i16) as u16),
        encode_branch(Opcode::BNE, T0, Zero, -8),
        0,
        mov(A0, S1),
        lui(A1, (DATA_BASE >> 16) as u16),
        encode_i_type(Opcode::ORI, A1, A1, 0x10),
        li(A2, 4),
    ]);
    text.extend(syscall(4));
    text.push(li(A0, 0));
    text.extend(syscall(1));

    let mut data = vec![0; 0x10];
    data.extend(b"data");
    let (mut emulator, parent) = boot(&text, &data);

    // Run until the parent blocks in read
    while emulator.kernel.context(parent).unwrap().is_running() {
        emulator.run_round().unwrap();
    }
    assert_eq!(emulator.system.events.len(), 1);

    emulator.run().unwrap();
    let context = emulator.kernel.context_mut(parent).unwrap();
    assert_eq!(context.exit_code, 4);
    assert_eq!(context.memory.read_bytes(DATA_BASE, 4).unwrap(), b"data");
}

#[test]
fn test_speculative_stores_are_discarded() {
    let mut text = vec![0; 0x10];
    text[2] = encode_i_type(Opcode::LW, T1, A1, 0);
    text.push(encode_i_type(Opcode::SW, T0, A1, 0));

    let (mut emulator, ctx) = boot(&text, &[0, 0, 0, 5]);
    let context = emulator.kernel.context_mut(ctx).unwrap();
    context.set_gpr(T0, 9);
    context.set_gpr(A1, DATA_BASE);

    emulator.execute_one(ctx).unwrap();
    assert_eq!(emulator.kernel.set_branch_target(ctx, TEXT_BASE + 0x40), Ok(true));

    // Wrong path: the store, then the sequential load sees it
    assert_eq!(emulator.execute_one(ctx), Ok(true));
    assert_eq!(emulator.execute_one(ctx), Ok(true));
    let context = emulator.kernel.context_mut(ctx).unwrap();
    assert_eq!(context.gpr(T1), 9);
    assert_eq!(context.memory.read_word(DATA_BASE), Ok(9));

    emulator.kernel.recover(ctx).unwrap();
    let context = emulator.kernel.context_mut(ctx).unwrap();
    assert_eq!(context.gpr(T1), 0);
    assert_eq!(context.registers.npc, TEXT_BASE + 4);
    assert_eq!(context.memory.read_word(DATA_BASE), Ok(5));
    assert_eq!(emulator.executed(), 0);
}

#[test]
fn test_arguments_reach_the_guest() {
    // exit(argc)
    let mut text = vec![encode_i_type(Opcode::LW, A0, Sp, 0)];
    text.extend(syscall(1));

    let elf = ElfFile::from_bytes(&image(&text, &[0; 4])).unwrap();
    let mut emulator = Emulator::new(&KernelConfig::default());
    let entry = ContextEntry::new("/guest/prog", vec!["a".into(), "b".into()]);
    let ctx = emulator.load_elf(&entry, elf).unwrap();

    emulator.run().unwrap();
    assert_eq!(emulator.kernel.context(ctx).unwrap().exit_code, 3);
}
