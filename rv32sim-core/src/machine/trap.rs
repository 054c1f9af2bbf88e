//! Synchronous exception and interrupt cause encodings.

/// A synchronous exception raised while executing an instruction.
///
/// The payload of each variant is the value that belongs in `mtval` when the
/// exception is taken.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Exception {
    /// Instruction address is not aligned to the fetch granule.
    /// The inner value is the misaligned address.
    InstructionAddressMisaligned(u32),
    /// Instruction fetch from outside instruction memory.
    /// The inner value is the faulting address.
    InstructionAccessFault(u32),
    /// Attempt to execute a reserved or unsupported encoding, to access a
    /// non-existent CSR, or similar. The inner value is the raw instruction
    /// when available.
    IllegalInstruction(u32),
    /// EBREAK; the inner value is the address of the instruction itself.
    Breakpoint(u32),
    /// The inner value is the misaligned load address.
    LoadAddressMisaligned(u32),
    /// The inner value is the faulting load address.
    LoadAccessFault(u32),
    /// The inner value is the misaligned store address.
    StoreAddressMisaligned(u32),
    /// The inner value is the faulting store address.
    StoreAccessFault(u32),
    /// ECALL from machine mode.
    EnvironmentCall,
}

impl Exception {
    pub const INSTRUCTION_ADDRESS_MISALIGNED: u32 = 0;
    pub const INSTRUCTION_ACCESS_FAULT: u32 = 1;
    pub const ILLEGAL_INSTRUCTION: u32 = 2;
    pub const BREAKPOINT: u32 = 3;
    pub const LOAD_ADDRESS_MISALIGNED: u32 = 4;
    pub const LOAD_ACCESS_FAULT: u32 = 5;
    pub const STORE_ADDRESS_MISALIGNED: u32 = 6;
    pub const STORE_ACCESS_FAULT: u32 = 7;
    pub const ENVIRONMENT_CALL_FROM_M_MODE: u32 = 11;

    /// Returns the exception code (cause) for this exception.
    pub const fn code(&self) -> u32 {
        match self {
            Self::InstructionAddressMisaligned(_) => Self::INSTRUCTION_ADDRESS_MISALIGNED,
            Self::InstructionAccessFault(_) => Self::INSTRUCTION_ACCESS_FAULT,
            Self::IllegalInstruction(_) => Self::ILLEGAL_INSTRUCTION,
            Self::Breakpoint(_) => Self::BREAKPOINT,
            Self::LoadAddressMisaligned(_) => Self::LOAD_ADDRESS_MISALIGNED,
            Self::LoadAccessFault(_) => Self::LOAD_ACCESS_FAULT,
            Self::StoreAddressMisaligned(_) => Self::STORE_ADDRESS_MISALIGNED,
            Self::StoreAccessFault(_) => Self::STORE_ACCESS_FAULT,
            Self::EnvironmentCall => Self::ENVIRONMENT_CALL_FROM_M_MODE,
        }
    }

    /// Returns the value that belongs in `mtval` when this exception traps.
    pub const fn tval(&self) -> u32 {
        match self {
            Self::InstructionAddressMisaligned(addr)
            | Self::InstructionAccessFault(addr)
            | Self::IllegalInstruction(addr)
            | Self::Breakpoint(addr)
            | Self::LoadAddressMisaligned(addr)
            | Self::LoadAccessFault(addr)
            | Self::StoreAddressMisaligned(addr)
            | Self::StoreAccessFault(addr) => *addr,
            Self::EnvironmentCall => 0,
        }
    }
}

/// A machine-level interrupt source.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Interrupt {
    MachineSoftware,
    MachineTimer,
    MachineExternal,
}

/// Set in `mcause` to mark the cause as an interrupt.
pub const INTERRUPT_BIT: u32 = 1 << 31;

impl Interrupt {
    /// Returns the exception code (cause) for this interrupt, which is also
    /// its bit index in `mip` and `mie`.
    pub const fn code(&self) -> u32 {
        match self {
            Self::MachineSoftware => 3,
            Self::MachineTimer => 7,
            Self::MachineExternal => 11,
        }
    }

    /// Returns the full `mcause` value, with the interrupt bit set.
    pub const fn cause(&self) -> u32 {
        INTERRUPT_BIT | self.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(2, Exception::IllegalInstruction(0).code());
        assert_eq!(11, Exception::EnvironmentCall.code());
        assert_eq!(0x8000_0007, Interrupt::MachineTimer.cause());
        assert_eq!(0x8000_0003, Interrupt::MachineSoftware.cause());
        assert_eq!(0x8000_000B, Interrupt::MachineExternal.cause());
    }

    #[test]
    fn test_tval() {
        assert_eq!(0x123, Exception::LoadAccessFault(0x123).tval());
        assert_eq!(0, Exception::EnvironmentCall.tval());
    }
}
