//! Instruction execution: one handler per operation class.
//!
//! Handlers return an [`Outcome`] telling the step loop whether to advance
//! the program counter past the committed instruction, or whether the
//! handler already redirected it (jumps, taken branches). Traps and
//! simulation exits travel the error path as a [`Stop`].

use log::trace;

use super::bus::{BusFault, MemOp};
use super::trap::Exception;
use super::{Exit, Machine};
use crate::htif::{HostIo, SyscallOutcome};
use crate::instruction::{
    AmoOp, BranchCondition, CsrOp, LoadWidth, RegImmOp, RegRegOp, RegShiftImmOp, RegUnaryOp,
    StoreWidth,
};
use crate::machine::csr::CsrSpecifier;
use crate::registers::Specifier;

/// How the step loop must treat the program counter after a handler ran.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) enum Outcome {
    /// Advance past the committed instruction (by 2 or 4 bytes).
    Advance,
    /// The handler already set the program counter.
    Jumped,
}

/// Why execution of the current instruction did not complete normally.
#[derive(Debug, Clone)]
pub(super) enum Stop {
    Trap(Exception),
    Exit(Exit),
}

impl From<Exception> for Stop {
    fn from(exception: Exception) -> Self {
        Self::Trap(exception)
    }
}

pub(super) type ExecutionResult = Result<Outcome, Stop>;

#[derive(Debug)]
pub(super) struct Executor<'m, H: HostIo> {
    pub machine: &'m mut Machine<H>,
    /// Address of the instruction being executed.
    pub pc: u32,
    /// The (expanded) 32-bit instruction word, for the trace log and mtval.
    pub raw: u32,
    /// Whether the instruction was fetched as a 16-bit encoding.
    pub compressed: bool,
}

impl<H: HostIo> Executor<'_, H> {
    pub fn op_imm(
        &mut self,
        op: RegImmOp,
        dest: Specifier,
        src: Specifier,
        immediate: i32,
    ) -> ExecutionResult {
        trace!("executing {op:?} {dest} {src} {immediate}");
        let op = match op {
            RegImmOp::Addi => RegRegOp::Add,
            RegImmOp::Slti => RegRegOp::Slt,
            RegImmOp::Sltiu => RegRegOp::Sltu,
            RegImmOp::Xori => RegRegOp::Xor,
            RegImmOp::Ori => RegRegOp::Or,
            RegImmOp::Andi => RegRegOp::And,
        };
        let result = alu(op, self.machine.registers.x(src), immediate as u32);
        self.write_back(dest, result)
    }

    pub fn op_shift_imm(
        &mut self,
        op: RegShiftImmOp,
        dest: Specifier,
        src: Specifier,
        shift_amount_u5: u32,
    ) -> ExecutionResult {
        trace!("executing {op:?} {dest} {src} {shift_amount_u5}");
        let result = shift_imm_alu(op, self.machine.registers.x(src), shift_amount_u5);
        self.write_back(dest, result)
    }

    pub fn op_unary(&mut self, op: RegUnaryOp, dest: Specifier, src: Specifier) -> ExecutionResult {
        trace!("executing {op:?} {dest} {src}");
        let result = unary_alu(op, self.machine.registers.x(src));
        self.write_back(dest, result)
    }

    pub fn op(
        &mut self,
        op: RegRegOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    ) -> ExecutionResult {
        trace!("executing {op:?} {dest} {src1} {src2}");
        let result = alu(
            op,
            self.machine.registers.x(src1),
            self.machine.registers.x(src2),
        );
        self.write_back(dest, result)
    }

    pub fn lui(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        trace!("executing lui {dest} {immediate}");
        self.write_back(dest, immediate as u32)
    }

    pub fn auipc(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        trace!("executing auipc {dest} {immediate}");
        self.write_back(dest, self.pc.wrapping_add_signed(immediate))
    }

    pub fn jal(&mut self, dest: Specifier, offset: i32) -> ExecutionResult {
        trace!("executing jal {dest} {offset}");
        self.trace_begin();
        if offset == 0 {
            self.machine.tracer.end();
            log::warn!("forever loop detected at PC {:#010x}", self.pc);
            return Err(Stop::Exit(Exit::ForeverLoop { pc: self.pc }));
        }
        let target = self.pc.wrapping_add_signed(offset) & !1;
        self.jump(dest, target)
    }

    pub fn jalr(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        trace!("executing jalr {dest} {base} {offset}");
        self.trace_begin();
        let target = self.machine.registers.x(base).wrapping_add_signed(offset);
        if target == self.pc {
            self.machine.tracer.end();
            log::warn!("forever loop detected at PC {:#010x}", self.pc);
            return Err(Stop::Exit(Exit::ForeverLoop { pc: self.pc }));
        }
        self.jump(dest, target & !1)
    }

    pub fn branch(
        &mut self,
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
    ) -> ExecutionResult {
        trace!("executing {condition:?} {src1} {src2} {offset}");
        self.trace_begin();
        self.machine.tracer.end();
        let taken = branch_taken(
            condition,
            self.machine.registers.x(src1),
            self.machine.registers.x(src2),
        );
        if !taken {
            return Ok(Outcome::Advance);
        }
        // Backward branches are predicted taken under the static predictor;
        // everything else pays the redirect penalty.
        if !self.machine.config.branch_predict || offset > 0 {
            self.machine.charge_branch_penalty();
        }
        *self.machine.registers.pc_mut() = self.pc.wrapping_add_signed(offset);
        Ok(Outcome::Jumped)
    }

    pub fn load(
        &mut self,
        width: LoadWidth,
        dest: Specifier,
        base: Specifier,
        offset: i32,
    ) -> ExecutionResult {
        trace!("executing {width:?} {dest} {offset}({base})");
        let address = self.machine.registers.x(base).wrapping_add_signed(offset);
        self.trace_begin();
        let result = self
            .machine
            .mem_access(MemOp::Load, width.into(), address, 0);
        if self.machine.config.singleram {
            self.machine.cycle_add(1);
        }
        let value = result.map_err(|fault| {
            self.machine.tracer.end();
            map_fault(fault, address)
        })?;
        self.machine.registers.set_x(dest, value);
        let value = self.machine.registers.x(dest);
        self.machine.tracer.mem_read(address, dest, value);
        Ok(Outcome::Advance)
    }

    pub fn store(
        &mut self,
        width: StoreWidth,
        src: Specifier,
        base: Specifier,
        offset: i32,
    ) -> ExecutionResult {
        trace!("executing {width:?} {src} {offset}({base})");
        let address = self.machine.registers.x(base).wrapping_add_signed(offset);
        let data = self.machine.registers.x(src);
        self.trace_begin();
        let result = self
            .machine
            .mem_access(MemOp::Store, width.into(), address, data);
        if self.machine.config.singleram {
            self.machine.cycle_add(1);
        }
        result.map_err(|fault| {
            self.machine.tracer.end();
            map_fault(fault, address)
        })?;
        let mask = match width {
            StoreWidth::Sb => 0xFF,
            StoreWidth::Sh => 0xFFFF,
            StoreWidth::Sw => 0xFFFF_FFFF,
        };
        self.machine.tracer.mem_write(address, data & mask);
        if let Some(exit) = self.machine.pending_exit.take() {
            return Err(Stop::Exit(exit));
        }
        Ok(Outcome::Advance)
    }

    pub fn fence(&mut self) -> ExecutionResult {
        trace!(pc = self.pc; "executing fence");
        // A single hart observes its own accesses in order; nothing to order.
        self.trace_begin();
        self.machine.tracer.end();
        Ok(Outcome::Advance)
    }

    /// ECALL consults the host syscall bridge, places the bridge's result (if
    /// any) in `a0`, and then always traps so the guest handler can observe
    /// it. `SYS_EXIT` terminates the simulation instead of trapping.
    pub fn ecall(&mut self) -> ExecutionResult {
        trace!("executing ecall");
        self.trace_begin();
        self.machine.tracer.end();
        let regs = &self.machine.registers;
        let func = regs.x(Specifier::A7);
        let args = [
            regs.x(Specifier::A0),
            regs.x(Specifier::from_u5(11)),
            regs.x(Specifier::from_u5(12)),
            regs.x(Specifier::from_u5(13)),
            regs.x(Specifier::from_u5(14)),
            regs.x(Specifier::from_u5(15)),
        ];
        match self.machine.dispatch_syscall(func, args) {
            SyscallOutcome::Exit(code) => return Err(Stop::Exit(Exit::Exited(code))),
            SyscallOutcome::Ret(value) => {
                self.machine.registers.set_x(Specifier::A0, value as u32);
            }
            SyscallOutcome::Unhandled => {}
        }
        Err(Exception::EnvironmentCall.into())
    }

    pub fn ebreak(&mut self) -> ExecutionResult {
        trace!("executing ebreak");
        self.trace_begin();
        self.machine.tracer.end();
        Err(Exception::Breakpoint(self.pc).into())
    }

    pub fn mret(&mut self) -> ExecutionResult {
        trace!("executing mret");
        self.trace_begin();
        self.machine.tracer.end();
        *self.machine.registers.pc_mut() = self.machine.csr.mepc;
        let mpie = self.machine.csr.status.mpie();
        self.machine.csr.status.set_mie(mpie);
        self.machine.charge_branch_penalty();
        Ok(Outcome::Jumped)
    }

    pub fn csr_reg(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        src: Specifier,
    ) -> ExecutionResult {
        trace!("executing csr {op:?} {dest} {csr:#05x} {src}");
        // CSRRS/CSRRC with the rs1 field zero must not write the CSR.
        let commit = op == CsrOp::ReadWrite || src != Specifier::X0;
        let value = self.machine.registers.x(src);
        self.csr_op(op, dest, csr, value, commit)
    }

    pub fn csr_imm(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        immediate: u32,
    ) -> ExecutionResult {
        trace!("executing csri {op:?} {dest} {csr:#05x} {immediate}");
        let commit = op == CsrOp::ReadWrite || immediate != 0;
        self.csr_op(op, dest, csr, immediate, commit)
    }

    fn csr_op(
        &mut self,
        op: CsrOp,
        dest: Specifier,
        csr: CsrSpecifier,
        value: u32,
        commit: bool,
    ) -> ExecutionResult {
        let result = self.machine.csr.read_write(csr, op, value, commit);
        self.trace_begin();
        match result {
            Ok(old_value) => {
                self.machine.registers.set_x(dest, old_value);
                let value = self.machine.registers.x(dest);
                self.machine.tracer.reg(dest, value);
                Ok(Outcome::Advance)
            }
            Err(_) => {
                self.machine.tracer.end();
                Err(Exception::IllegalInstruction(0).into())
            }
        }
    }

    /// Atomics operate on data memory only; instruction-memory addresses
    /// fault as loads. The read-modify-write is a single step of the
    /// interpreter and therefore atomic by construction.
    pub fn amo(
        &mut self,
        op: AmoOp,
        dest: Specifier,
        addr: Specifier,
        src: Specifier,
    ) -> ExecutionResult {
        trace!("executing {op:?} {dest} ({addr}) {src}");
        self.trace_begin();
        self.machine.tracer.end();
        let address = self.machine.registers.x(addr);
        let Some(data) = self.machine.bus.dmem_word(address) else {
            log::warn!(
                "unknown address {address:#010x} to read at PC {:#010x}",
                self.pc
            );
            return Err(Exception::LoadAccessFault(address).into());
        };
        if self.machine.config.singleram {
            self.machine.cycle_add(1);
        }
        let src_value = self.machine.registers.x(src);
        match op {
            AmoOp::Lr => {
                self.machine.registers.set_x(dest, data);
                self.machine.reservation.valid = true;
                self.machine.reservation.address = address;
            }
            AmoOp::Sc => {
                let reserved =
                    self.machine.reservation.valid && self.machine.reservation.address == address;
                if reserved {
                    self.machine.bus.dmem_set_word(address, src_value);
                    self.machine.registers.set_x(dest, 0);
                } else {
                    self.machine.registers.set_x(dest, 1);
                }
                self.machine.reservation.valid = false;
                self.machine.reservation.address = 0;
            }
            AmoOp::Swap => {
                self.machine.registers.set_x(dest, data);
                self.machine.bus.dmem_set_word(address, src_value);
                self.machine.invalidate_reservation(address);
            }
            _ => {
                let result = match op {
                    AmoOp::Add => data.wrapping_add(src_value),
                    AmoOp::And => data & src_value,
                    AmoOp::Or => data | src_value,
                    AmoOp::Xor => data ^ src_value,
                    AmoOp::Min => (data as i32).min(src_value as i32) as u32,
                    AmoOp::Max => (data as i32).max(src_value as i32) as u32,
                    AmoOp::Minu => data.min(src_value),
                    AmoOp::Maxu => data.max(src_value),
                    AmoOp::Lr | AmoOp::Sc | AmoOp::Swap => unreachable!(),
                };
                self.machine.registers.set_x(dest, result);
                self.machine.bus.dmem_set_word(address, result);
                self.machine.invalidate_reservation(address);
            }
        }
        Ok(Outcome::Advance)
    }

    // Common tails

    /// Register write-back shared by all plain ALU classes.
    fn write_back(&mut self, dest: Specifier, result: u32) -> ExecutionResult {
        self.machine.registers.set_x(dest, result);
        self.trace_begin();
        let value = self.machine.registers.x(dest);
        self.machine.tracer.reg(dest, value);
        Ok(Outcome::Advance)
    }

    /// Shared tail of JAL/JALR: alignment check, redirect, link write-back.
    fn jump(&mut self, dest: Specifier, target: u32) -> ExecutionResult {
        if !self.machine.config.compressed && target & 3 != 0 {
            self.machine.tracer.end();
            return Err(Exception::InstructionAddressMisaligned(target).into());
        }
        *self.machine.registers.pc_mut() = target;
        let link = self.pc.wrapping_add(if self.compressed { 2 } else { 4 });
        self.machine.registers.set_x(dest, link);
        let value = self.machine.registers.x(dest);
        self.machine.tracer.reg(dest, value);
        self.machine.charge_branch_penalty();
        Ok(Outcome::Jumped)
    }

    fn trace_begin(&mut self) {
        let cycle = self.machine.csr.counters.cycle as u32;
        self.machine.tracer.begin(cycle, self.pc, self.raw);
    }
}

fn map_fault(fault: BusFault, address: u32) -> Stop {
    let exception = match fault {
        BusFault::LoadFault => Exception::LoadAccessFault(address),
        BusFault::LoadMisaligned => Exception::LoadAddressMisaligned(address),
        BusFault::StoreFault => Exception::StoreAccessFault(address),
        BusFault::StoreMisaligned => Exception::StoreAddressMisaligned(address),
    };
    Stop::Trap(exception)
}

/// The two-source ALU. Shift amounts use the low five bits of the second
/// operand; signedness follows the operation.
fn alu(op: RegRegOp, a: u32, b: u32) -> u32 {
    use RegRegOp::*;
    match op {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Sll => a << (b & 0x1F),
        Srl => a >> (b & 0x1F),
        Sra => ((a as i32) >> (b & 0x1F)) as u32,
        Slt => ((a as i32) < (b as i32)) as u32,
        Sltu => (a < b) as u32,
        Xor => a ^ b,
        Or => a | b,
        And => a & b,
        Mul => a.wrapping_mul(b),
        Mulh => ((i64::from(a as i32) * i64::from(b as i32)) >> 32) as u32,
        Mulhsu => ((i64::from(a as i32) * i64::from(b)) >> 32) as u32,
        Mulhu => ((u64::from(a) * u64::from(b)) >> 32) as u32,
        // The quotient of division by zero has all bits set; the remainder
        // of division by zero equals the dividend.
        Div => match b {
            0 => 0xFFFF_FFFF,
            _ => (a as i32).overflowing_div(b as i32).0 as u32,
        },
        Divu => a.checked_div(b).unwrap_or(0xFFFF_FFFF),
        Rem => match b {
            0 => a,
            _ => (a as i32).overflowing_rem(b as i32).0 as u32,
        },
        Remu => a.checked_rem(b).unwrap_or(a),
        Andn => a & !b,
        Orn => a | !b,
        Xnor => !(a ^ b),
        Min => (a as i32).min(b as i32) as u32,
        Minu => a.min(b),
        Max => (a as i32).max(b as i32) as u32,
        Maxu => a.max(b),
        Rol => a.rotate_left(b & 0x1F),
        Ror => a.rotate_right(b & 0x1F),
        Sh1add => b.wrapping_add(a << 1),
        Sh2add => b.wrapping_add(a << 2),
        Sh3add => b.wrapping_add(a << 3),
        Bset => a | (1 << (b & 0x1F)),
        Bclr => a & !(1 << (b & 0x1F)),
        Bext => (a >> (b & 0x1F)) & 1,
        Binv => a ^ (1 << (b & 0x1F)),
        Clmul => {
            let mut n = 0;
            for i in 0..32 {
                if (b >> i) & 1 == 1 {
                    n ^= a << i;
                }
            }
            n
        }
        Clmulh => {
            let mut n = 0;
            for i in 1..32 {
                if (b >> i) & 1 == 1 {
                    n ^= a >> (32 - i);
                }
            }
            n
        }
        Clmulr => {
            let mut n = 0;
            for i in 0..32 {
                if (b >> i) & 1 == 1 {
                    n ^= a >> (31 - i);
                }
            }
            n
        }
    }
}

fn shift_imm_alu(op: RegShiftImmOp, a: u32, shamt: u32) -> u32 {
    use RegShiftImmOp::*;
    match op {
        Slli => a << shamt,
        Srli => a >> shamt,
        Srai => ((a as i32) >> shamt) as u32,
        Bseti => a | (1 << shamt),
        Bclri => a & !(1 << shamt),
        Binvi => a ^ (1 << shamt),
        Bexti => (a >> shamt) & 1,
        Rori => a.rotate_right(shamt),
    }
}

fn unary_alu(op: RegUnaryOp, a: u32) -> u32 {
    use RegUnaryOp::*;
    match op {
        Clz => a.leading_zeros(),
        Ctz => a.trailing_zeros(),
        Cpop => a.count_ones(),
        SextB => a as i8 as i32 as u32,
        SextH => a as i16 as i32 as u32,
        ZextH => a & 0xFFFF,
        // Each byte becomes all-ones if any of its bits is set.
        OrcB => {
            let mut n = 0;
            for shift in [0, 8, 16, 24] {
                if a & (0xFF << shift) != 0 {
                    n |= 0xFF << shift;
                }
            }
            n
        }
        Rev8 => a.swap_bytes(),
    }
}

fn branch_taken(condition: BranchCondition, a: u32, b: u32) -> bool {
    match condition {
        BranchCondition::Beq => a == b,
        BranchCondition::Bne => a != b,
        BranchCondition::Blt => (a as i32) < (b as i32),
        BranchCondition::Bge => (a as i32) >= (b as i32),
        BranchCondition::Bltu => a < b,
        BranchCondition::Bgeu => a >= b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RegRegOp::*;

    #[test]
    fn test_alu_base() {
        assert_eq!(3, alu(Add, 1, 2));
        assert_eq!(0xFFFF_FFFF, alu(Add, 0x8000_0000, 0x7FFF_FFFF));
        assert_eq!(0, alu(Add, 0xFFFF_FFFF, 1)); // wraps
        assert_eq!(0xFFFF_FFFF, alu(Sub, 0, 1));
        assert_eq!(1, alu(Slt, 0xFFFF_FFFF, 0)); // -1 < 0 signed
        assert_eq!(0, alu(Sltu, 0xFFFF_FFFF, 0));
        assert_eq!(0b0110, alu(Xor, 0b1100, 0b1010));
    }

    #[test]
    fn test_alu_shifts_use_low_five_bits() {
        assert_eq!(2, alu(Sll, 1, 33));
        assert_eq!(1, alu(Srl, 2, 33));
        assert_eq!(0xC000_0000, alu(Sra, 0x8000_0000, 33));
        assert_eq!(0x8000_0000, alu(Rol, 0x4000_0000, 33));
    }

    #[test]
    fn test_alu_mul() {
        assert_eq!(6, alu(Mul, 2, 3));
        assert_eq!(0xFFFF_FFFF, alu(Mulh, 0xFFFF_FFFF, 1)); // -1 * 1 high = -1
        assert_eq!(0, alu(Mulhu, 0xFFFF_FFFF, 1));
        assert_eq!(0xFFFF_FFFF, alu(Mulhsu, 0xFFFF_FFFF, 1));
        assert_eq!(0xFFFF_FFFE, alu(Mulhu, 0xFFFF_FFFF, 0xFFFF_FFFF));
    }

    #[test]
    fn test_alu_div() {
        assert_eq!(1, alu(Div, 5, 3));
        assert_eq!(0xFFFF_FFFF, alu(Div, 1, 0));
        assert_eq!(0xFFFF_FFFF, alu(Divu, 1, 0));
        // Signed overflow: INT_MIN / -1 returns the dividend.
        assert_eq!(0x8000_0000, alu(Div, 0x8000_0000, 0xFFFF_FFFF));
        assert_eq!(2, alu(Rem, 5, 3));
        assert_eq!(5, alu(Rem, 5, 0));
        assert_eq!(0, alu(Rem, 0x8000_0000, 0xFFFF_FFFF));
        assert_eq!(5, alu(Remu, 5, 0));
    }

    #[test]
    fn test_alu_bitmanip() {
        assert_eq!(0b1000, alu(Andn, 0b1100, 0b0100));
        assert_eq!(0xFFFF_FFFF, alu(Orn, 0, 0));
        assert_eq!(0xFFFF_FFFF, alu(Xnor, 0xAAAA_AAAA, 0xAAAA_AAAA));
        assert_eq!(0xFFFF_FFFF, alu(Min, 0xFFFF_FFFF, 1));
        assert_eq!(1, alu(Minu, 0xFFFF_FFFF, 1));
        assert_eq!(1, alu(Max, 0xFFFF_FFFF, 1));
        assert_eq!(0xFFFF_FFFF, alu(Maxu, 0xFFFF_FFFF, 1));
        assert_eq!(0b10100, alu(Sh1add, 0b1000, 0b100));
        assert_eq!(0x11, alu(Bset, 0x01, 4));
        assert_eq!(0x01, alu(Bclr, 0x11, 4));
        assert_eq!(1, alu(Bext, 0x10, 4));
        assert_eq!(0x10, alu(Binv, 0, 4));
    }

    #[test]
    fn test_alu_clmul() {
        // (x + 1) * (x + 1) = x^2 + 1 over GF(2)
        assert_eq!(0b101, alu(Clmul, 0b11, 0b11));
        assert_eq!(0, alu(Clmulh, 0b11, 0b11));
        // clmulr is clmul bit-reversed
        assert_eq!(0x8000_0000, alu(Clmulr, 0x8000_0000, 0x8000_0000));
    }

    #[test]
    fn test_unary_alu() {
        assert_eq!(32, unary_alu(RegUnaryOp::Clz, 0));
        assert_eq!(31, unary_alu(RegUnaryOp::Clz, 1));
        assert_eq!(32, unary_alu(RegUnaryOp::Ctz, 0));
        assert_eq!(4, unary_alu(RegUnaryOp::Ctz, 0x10));
        assert_eq!(8, unary_alu(RegUnaryOp::Cpop, 0xFF00_0000));
        assert_eq!(0xFFFF_FF80, unary_alu(RegUnaryOp::SextB, 0x180));
        assert_eq!(0x0000_7FFF, unary_alu(RegUnaryOp::SextH, 0xABCD_7FFF));
        assert_eq!(0xCDEF, unary_alu(RegUnaryOp::ZextH, 0x89AB_CDEF));
        assert_eq!(0x00FF_FF00, unary_alu(RegUnaryOp::OrcB, 0x0001_0100));
        assert_eq!(0x7856_3412, unary_alu(RegUnaryOp::Rev8, 0x1234_5678));
    }

    #[test]
    fn test_shift_imm_alu() {
        assert_eq!(0x10, shift_imm_alu(RegShiftImmOp::Slli, 1, 4));
        assert_eq!(0xF000_0000, shift_imm_alu(RegShiftImmOp::Rori, 0xF, 4));
        assert_eq!(1, shift_imm_alu(RegShiftImmOp::Bexti, 0x10, 4));
    }

    #[test]
    fn test_branch_conditions() {
        use BranchCondition::*;
        assert!(branch_taken(Beq, 5, 5));
        assert!(branch_taken(Bne, 5, 6));
        assert!(branch_taken(Blt, 0xFFFF_FFFF, 0));
        assert!(!branch_taken(Bltu, 0xFFFF_FFFF, 0));
        assert!(branch_taken(Bge, 0, 0xFFFF_FFFF));
        assert!(branch_taken(Bgeu, 0xFFFF_FFFF, 0));
    }
}
