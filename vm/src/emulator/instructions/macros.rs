/// `rd = op(rs, rt)`
macro_rules! define_register_instruction {
    ($fn_name:ident, $operation:expr) => {
        pub fn $fn_name(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
            let rs = machine.registers.gpr(ins.rs());
            let rt = machine.registers.gpr(ins.rt());
            #[allow(clippy::redundant_closure_call)]
            let value = $operation(rs, rt);
            machine.registers.set_gpr(ins.rd(), value);
            Ok(ExecResult::Ok)
        }
    };
}

/// `rt = op(rs, ins)`; the operation picks the signed or unsigned immediate.
macro_rules! define_immediate_instruction {
    ($fn_name:ident, $operation:expr) => {
        pub fn $fn_name(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
            let rs = machine.registers.gpr(ins.rs());
            #[allow(clippy::redundant_closure_call)]
            let value = $operation(rs, ins);
            machine.registers.set_gpr(ins.rt(), value);
            Ok(ExecResult::Ok)
        }
    };
}

/// `rd = op(rt, shift)` with the shift amount from `shamt` or the low bits of `rs`.
macro_rules! define_shift_instruction {
    ($fn_name:ident, $operation:expr, shamt) => {
        pub fn $fn_name(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
            let rt = machine.registers.gpr(ins.rt());
            #[allow(clippy::redundant_closure_call)]
            let value = $operation(rt, ins.shamt());
            machine.registers.set_gpr(ins.rd(), value);
            Ok(ExecResult::Ok)
        }
    };
    ($fn_name:ident, $operation:expr, variable) => {
        pub fn $fn_name(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
            let rt = machine.registers.gpr(ins.rt());
            let amount = machine.registers.gpr(ins.rs()) & 0x1f;
            #[allow(clippy::redundant_closure_call)]
            let value = $operation(rt, amount);
            machine.registers.set_gpr(ins.rd(), value);
            Ok(ExecResult::Ok)
        }
    };
}

/// Relative branch taken when `cond(rs, rt)` holds; optionally links `ra`
/// whether or not the branch is taken.
macro_rules! define_branch_instruction {
    ($fn_name:ident, $condition:expr) => {
        define_branch_instruction!($fn_name, $condition, false);
    };
    ($fn_name:ident, $condition:expr, $link:expr) => {
        pub fn $fn_name(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
            let regs = &mut *machine.registers;
            let rs = regs.gpr(ins.rs());
            let rt = regs.gpr(ins.rt());
            let pc = regs.pc;
            if $link {
                regs.set_gpr(Register::Ra as u32, pc.wrapping_add(8));
            }
            #[allow(clippy::redundant_closure_call)]
            let taken = $condition(rs, rt);
            if taken {
                regs.branch(ins.branch_target(pc));
            }
            Ok(ExecResult::Ok)
        }
    };
}

/// `rt = extend(memory[rs + imm])`
macro_rules! define_load_instruction {
    ($fn_name:ident, $size:expr, $extend:expr) => {
        pub fn $fn_name(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
            let address = effective_address(machine.registers, ins);
            let value = machine.memory.read(address, $size)?;
            #[allow(clippy::redundant_closure_call)]
            let value = $extend(value);
            machine.registers.set_gpr(ins.rt(), value);
            Ok(ExecResult::Ok)
        }
    };
}

/// `memory[rs + imm] = rt`, truncated to the access size.
macro_rules! define_store_instruction {
    ($fn_name:ident, $size:expr) => {
        pub fn $fn_name(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
            let address = effective_address(machine.registers, ins);
            let value = machine.registers.gpr(ins.rt());
            machine.memory.write(address, $size, value as u64)?;
            Ok(ExecResult::Ok)
        }
    };
}

/// Floating point operation defined for the S and D formats only.
macro_rules! define_fpu_instruction {
    ($fn_name:ident, unary, $method:ident) => {
        pub fn $fn_name(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
            let regs = &mut *machine.registers;
            match ins.format() {
                Some(FpuFormat::Single) => {
                    let value = regs.single(ins.fs()).$method();
                    regs.set_single(ins.fd(), value);
                }
                Some(FpuFormat::Double) => {
                    let value = regs.double(ins.fs()).$method();
                    regs.set_double(ins.fd(), value);
                }
                _ => return Ok(ExecResult::FormatError),
            }
            Ok(ExecResult::Ok)
        }
    };
    ($fn_name:ident, binary, $op:tt) => {
        pub fn $fn_name(machine: &mut Machine, ins: &Instruction) -> Result<ExecResult> {
            let regs = &mut *machine.registers;
            match ins.format() {
                Some(FpuFormat::Single) => {
                    let value = regs.single(ins.fs()) $op regs.single(ins.ft());
                    regs.set_single(ins.fd(), value);
                }
                Some(FpuFormat::Double) => {
                    let value = regs.double(ins.fs()) $op regs.double(ins.ft());
                    regs.set_double(ins.fd(), value);
                }
                _ => return Ok(ExecResult::FormatError),
            }
            Ok(ExecResult::Ok)
        }
    };
}

pub(crate) use define_branch_instruction;
pub(crate) use define_fpu_instruction;
pub(crate) use define_immediate_instruction;
pub(crate) use define_load_instruction;
pub(crate) use define_register_instruction;
pub(crate) use define_shift_instruction;
pub(crate) use define_store_instruction;
