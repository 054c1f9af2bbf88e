//! The simulated machine: all architectural state and the interpreter loop.
//!
//! Per instruction, the loop injects any armed interrupt, fetches through the
//! instruction bus (expanding a 16-bit parcel when the program counter points
//! at one), decodes, executes, and finally advances the program counter
//! unless the instruction already redirected it. Cycle, instret, time, and
//! mtime pre-increment before execution; branch and trap redirects charge the
//! configured penalty on top.

pub mod bus;
pub mod csr;
pub mod trap;

mod clint;
mod counters;
mod execute;
mod status;

pub use counters::Counters;
pub use status::Status;

use log::warn;

use crate::compressed;
use crate::htif::HostIo;
use crate::instruction::Instruction;
use crate::registers::Registers;
use crate::tracer::Tracer;
use crate::PrivilegeLevel;
use bus::{LoadSegmentError, MemoryMap, SystemBus};
use clint::Clint;
use csr::CsrFile;
use execute::{Executor, Outcome, Stop};
use trap::{Exception, Interrupt};

/// Build-time knobs of the simulated system.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base address of simulated memory; also the reset program counter.
    pub mem_base: u32,
    /// Total bytes of simulated memory, split evenly between the instruction
    /// and data regions.
    pub mem_size: u32,
    /// Cycles charged whenever control flow leaves the sequential path.
    pub branch_penalty: u32,
    /// Static branch prediction: backward branches predicted taken.
    pub branch_predict: bool,
    /// Instruction and data memory share a single port; loads, stores, and
    /// atomics each cost one extra cycle.
    pub singleram: bool,
    /// Support for 16-bit compressed instructions. Also relaxes the fetch
    /// alignment requirement from 4 to 2 bytes.
    pub compressed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mem_base: 0,
            mem_size: 256 * 1024,
            branch_penalty: 2,
            branch_predict: false,
            singleram: false,
            compressed: true,
        }
    }
}

/// Why the simulation ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Exit {
    /// The guest terminated, via the exit MMIO register or a `SYS_EXIT`
    /// syscall, with the given exit value.
    Exited(i32),
    /// A jump to its own address was detected; the program can make no
    /// further progress.
    ForeverLoop { pc: u32 },
}

impl Exit {
    /// The process exit code this outcome maps to.
    pub fn code(&self) -> i32 {
        match *self {
            Self::Exited(code) => code,
            Self::ForeverLoop { .. } => 1,
        }
    }
}

/// Counter snapshot for the end-of-simulation report.
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub instret: u64,
    pub cycle: u64,
    /// Instruction-size transitions charged by the compressed fetch path.
    pub overhead: u64,
}

/// The load-reserved/store-conditional monitor.
#[derive(Debug, Clone, Default)]
struct Reservation {
    valid: bool,
    address: u32,
}

/// Two-stage arming latches for the three interrupt sources.
///
/// A source condition observed while fetching instruction N causes the
/// injection to happen at the boundary before instruction N+1, and only if
/// instruction N is not a SYSTEM instruction. The software and external
/// sources take one extra stage, since they are sampled from the msip latch.
#[derive(Debug, Clone, Default)]
struct IrqLatch {
    timer: bool,
    software: bool,
    software_next: bool,
    external: bool,
    external_next: bool,
}

/// A complete RV32IMABC hart with its memories and MMIO devices.
///
/// The machine owns every piece of architectural state and is mutated only
/// through [`step`](Self::step) (and [`load`](Self::load) before execution
/// starts). There is exactly one hart and it never leaves machine mode.
#[derive(Debug)]
pub struct Machine<H: HostIo> {
    config: Config,
    registers: Registers,
    csr: CsrFile,
    clint: Clint,
    bus: SystemBus,
    host: H,
    tracer: Tracer,
    mode: PrivilegeLevel,
    irq: IrqLatch,
    reservation: Reservation,
    /// Address of the instruction currently committing; the mepc value for
    /// synchronous traps.
    prev_pc: u32,
    /// Size class of the previously committed instruction.
    last_compressed: bool,
    overhead: u64,
    /// Host-to-guest reply word, polled through the FROMHOST register.
    fromhost: u32,
    /// Set by MMIO or syscall handlers that request termination mid-instruction.
    pending_exit: Option<Exit>,
}

impl<H: HostIo> Machine<H> {
    pub fn new(config: Config, host: H) -> Self {
        let half = config.mem_size / 2;
        let map = MemoryMap {
            imem_base: config.mem_base,
            imem_size: half,
            dmem_base: config.mem_base.wrapping_add(half),
            dmem_size: half,
        };
        let registers = Registers::new(config.mem_base);
        let prev_pc = config.mem_base;
        Self {
            config,
            registers,
            csr: CsrFile::new(),
            clint: Clint::new(),
            bus: SystemBus::new(map),
            host,
            tracer: Tracer::disabled(),
            mode: PrivilegeLevel::Machine,
            irq: IrqLatch::default(),
            reservation: Reservation::default(),
            prev_pc,
            last_compressed: false,
            overhead: 0,
            fromhost: 0,
            pending_exit: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current privilege mode. Always machine mode in this core.
    pub fn mode(&self) -> PrivilegeLevel {
        self.mode
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn csr(&self) -> &CsrFile {
        &self.csr
    }

    pub fn csr_mut(&mut self) -> &mut CsrFile {
        &mut self.csr
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Attaches a per-retirement trace writer.
    pub fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = tracer;
    }

    /// Copies a program segment into simulated memory. The loader's entry
    /// point; performs no fault modelling.
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> Result<(), LoadSegmentError> {
        self.bus.load(address, bytes)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            instret: self.csr.counters.instret,
            cycle: self.csr.counters.cycle,
            overhead: self.overhead,
        }
    }

    /// Runs until the guest terminates.
    pub fn run(&mut self) -> Exit {
        loop {
            if let Some(exit) = self.step() {
                self.tracer.flush();
                return exit;
            }
        }
    }

    /// Executes one instruction (or injects one interrupt and executes the
    /// handler's first instruction). Returns `Some` when the guest
    /// terminated.
    pub fn step(&mut self) -> Option<Exit> {
        self.clint.begin_instruction();

        // Interrupts armed while fetching the previous instruction take
        // effect at this boundary, provided interrupts are still globally
        // enabled. The interrupted (not yet executed) instruction's address
        // goes to mepc, and the fetch below retrieves the handler instead.
        if self.irq.timer && self.csr.status.mie() {
            self.interrupt(Interrupt::MachineTimer);
        }
        if self.irq.software_next && self.csr.status.mie() {
            self.interrupt(Interrupt::MachineSoftware);
        }
        if self.irq.external_next && self.csr.status.mie() {
            self.interrupt(Interrupt::MachineExternal);
        }

        let pc = self.registers.pc();
        let raw = match self.fetch(pc) {
            Ok(raw) => raw,
            Err(exception) => {
                self.trap(exception);
                return None;
            }
        };

        // Advance the arming latches. A source never arms in front of a
        // SYSTEM instruction, so a CSR write disabling the source cannot race
        // with its own interrupt.
        let is_system = Instruction::is_system(raw);
        let mie = self.csr.status.mie();
        let enabled =
            |source: Interrupt| mie && self.csr.mie & (1 << source.code()) != 0 && !is_system;
        self.irq.timer = self.clint.timer_pending() && enabled(Interrupt::MachineTimer);
        self.irq.software_next = self.irq.software && enabled(Interrupt::MachineSoftware);
        self.irq.software = self.clint.software_irq();
        self.irq.external_next = self.irq.external && enabled(Interrupt::MachineExternal);
        self.irq.external = self.clint.external_irq();

        // Counters pre-increment; architectural reads compensate.
        self.csr.counters.time = self.csr.counters.time.wrapping_add(1);
        self.csr.counters.instret = self.csr.counters.instret.wrapping_add(1);
        self.cycle_add(1);

        self.prev_pc = pc;

        let halfword = raw as u16;
        let (expansion, compressed) = if self.config.compressed && compressed::is_compressed(halfword)
        {
            (compressed::expand(halfword), true)
        } else {
            (Ok(raw), false)
        };

        // One extra cycle whenever the instruction size class changes.
        if compressed != self.last_compressed {
            self.cycle_add(1);
            self.overhead += 1;
        }
        self.last_compressed = compressed;

        let word = match expansion {
            Ok(word) => word,
            Err(_) => {
                warn!("illegal compressed instruction {halfword:#06x} at PC {pc:#010x}");
                self.trap(Exception::IllegalInstruction(halfword as i16 as i32 as u32));
                return None;
            }
        };

        let instruction = match Instruction::decode(word) {
            Ok(instruction) => instruction,
            Err(_) => {
                warn!("illegal instruction {word:#010x} at PC {pc:#010x}");
                let cycle = self.csr.counters.cycle as u32;
                self.tracer.begin(cycle, pc, word);
                self.tracer.end();
                self.trap(Exception::IllegalInstruction(word));
                return None;
            }
        };

        let result = self.execute(instruction, pc, word, compressed);
        match result {
            Ok(Outcome::Advance) => {
                let len = if compressed { 2 } else { 4 };
                *self.registers.pc_mut() = pc.wrapping_add(len);
                None
            }
            Ok(Outcome::Jumped) => None,
            Err(Stop::Trap(exception)) => {
                self.trap(exception);
                None
            }
            Err(Stop::Exit(exit)) => Some(exit),
        }
    }

    fn execute(
        &mut self,
        instruction: Instruction,
        pc: u32,
        raw: u32,
        compressed: bool,
    ) -> execute::ExecutionResult {
        let mut executor = Executor {
            machine: self,
            pc,
            raw,
            compressed,
        };
        match instruction {
            Instruction::OpImm {
                op,
                dest,
                src,
                immediate,
            } => executor.op_imm(op, dest, src, immediate),
            Instruction::OpShiftImm {
                op,
                dest,
                src,
                shift_amount_u5,
            } => executor.op_shift_imm(op, dest, src, shift_amount_u5),
            Instruction::OpUnary { op, dest, src } => executor.op_unary(op, dest, src),
            Instruction::Auipc { dest, immediate } => executor.auipc(dest, immediate),
            Instruction::Lui { dest, immediate } => executor.lui(dest, immediate),
            Instruction::Op {
                op,
                dest,
                src1,
                src2,
            } => executor.op(op, dest, src1, src2),
            Instruction::Jal { dest, offset } => executor.jal(dest, offset),
            Instruction::Jalr { dest, base, offset } => executor.jalr(dest, base, offset),
            Instruction::Branch {
                condition,
                src1,
                src2,
                offset,
            } => executor.branch(condition, src1, src2, offset),
            Instruction::Load {
                width,
                dest,
                base,
                offset,
            } => executor.load(width, dest, base, offset),
            Instruction::Store {
                width,
                src,
                base,
                offset,
            } => executor.store(width, src, base, offset),
            Instruction::Fence => executor.fence(),
            Instruction::Ecall => executor.ecall(),
            Instruction::Ebreak => executor.ebreak(),
            Instruction::Mret => executor.mret(),
            Instruction::Csr { op, dest, csr, src } => executor.csr_reg(op, dest, csr, src),
            Instruction::Csri {
                op,
                dest,
                csr,
                immediate,
            } => executor.csr_imm(op, dest, csr, immediate),
            Instruction::Amo {
                op,
                dest,
                addr,
                src,
            } => executor.amo(op, dest, addr, src),
        }
    }

    /// Fetches the instruction word at `pc`, checking range before alignment.
    fn fetch(&self, pc: u32) -> Result<u32, Exception> {
        if !self.bus.map().contains_imem(pc) {
            warn!("PC {pc:#010x} out of instruction memory");
            return Err(Exception::InstructionAccessFault(pc));
        }
        let alignment_mask = if self.config.compressed { 1 } else { 3 };
        if pc & alignment_mask != 0 {
            warn!("PC {pc:#010x} alignment error");
            return Err(Exception::InstructionAddressMisaligned(pc));
        }
        // In range and aligned, so the bus cannot refuse the fetch.
        Ok(self.bus.fetch(pc).unwrap())
    }

    /// Takes a synchronous trap: saves cause/epc/tval, masks interrupts, and
    /// redirects to the handler.
    fn trap(&mut self, exception: Exception) {
        self.charge_branch_penalty();
        self.csr.mcause = exception.code();
        let mie = self.csr.status.mie();
        self.csr.status.set_mpie(mie);
        self.csr.status.set_mie(false);
        self.csr.mepc = self.prev_pc;
        self.csr.mtval = exception.tval();
        *self.registers.pc_mut() = self.trap_vector(exception.code());
    }

    /// Injects an interrupt at an instruction boundary. The interrupted
    /// instruction has not executed; its address goes to mepc.
    fn interrupt(&mut self, interrupt: Interrupt) {
        // If the previous instruction left the sequential path, it already
        // paid the redirect penalty; don't charge it twice.
        let len = if self.last_compressed { 2 } else { 4 };
        if self.registers.pc() == self.prev_pc.wrapping_add(len) {
            self.charge_branch_penalty();
        }
        self.csr.mcause = interrupt.cause();
        let mie = self.csr.status.mie();
        self.csr.status.set_mpie(mie);
        self.csr.status.set_mie(false);
        self.csr.mip |= 1 << interrupt.code();
        self.csr.mepc = self.registers.pc();
        *self.registers.pc_mut() = self.trap_vector(interrupt.code());
    }

    /// Resolves the handler address: direct mode jumps to the mtvec base,
    /// vectored mode (bit 0 of mtvec) adds four bytes per cause code.
    fn trap_vector(&self, code: u32) -> u32 {
        let mtvec = self.csr.mtvec;
        if mtvec & 1 != 0 {
            (mtvec & !1).wrapping_add(code * 4)
        } else {
            mtvec
        }
    }

    /// Charges cycles: the cycle counter always advances, mtime only if the
    /// current instruction didn't write it.
    fn cycle_add(&mut self, count: u32) {
        self.csr.counters.cycle = self.csr.counters.cycle.wrapping_add(u64::from(count));
        self.clint.advance(u64::from(count));
    }

    fn charge_branch_penalty(&mut self) {
        self.cycle_add(self.config.branch_penalty);
    }
}
