//! Memory system: RAM lanes, address decode, and the MMIO register block.
//!
//! All physical backing is 32-bit lanes. Sub-word accesses read or merge into
//! the lane holding the address; the router decodes, in order, the
//! instruction region, the data region, and the MMIO table. Everything the
//! host provides (console, syscalls) is reached through MMIO or the ECALL
//! bridge, both of which end up here.

use log::warn;
use thiserror::Error;

use super::{Exit, Machine};
use crate::htif::{
    HostIo, SyscallOutcome, SYSCALL_FRAME_WORDS, SYS_CLOSE, SYS_EXIT, SYS_READ, SYS_WRITE,
};
use crate::instruction::{LoadWidth, StoreWidth};
use crate::Alignment;

//
// The MMIO register block. All addresses lie outside the RAM regions.
//
pub const MMIO_MTIME: u32 = 0x9000_0000;
pub const MMIO_MTIMECMP: u32 = 0x9000_0008;
pub const MMIO_MSIP: u32 = 0x9000_0010;
pub const MMIO_PUTC: u32 = 0x9000_0020;
pub const MMIO_GETC: u32 = 0x9000_0024;
pub const MMIO_EXIT: u32 = 0x9000_0028;
pub const MMIO_TOHOST: u32 = 0x9000_002C;
pub const MMIO_FROMHOST: u32 = 0x9000_0030;

/// Direction of a data-memory access.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemOp {
    Load,
    Store,
}

/// Width (and extension rule) of a data-memory access.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemWidth {
    Byte,
    Half,
    Word,
    ByteUnsigned,
    HalfUnsigned,
}

impl From<LoadWidth> for MemWidth {
    fn from(width: LoadWidth) -> Self {
        match width {
            LoadWidth::Lb => Self::Byte,
            LoadWidth::Lh => Self::Half,
            LoadWidth::Lw => Self::Word,
            LoadWidth::Lbu => Self::ByteUnsigned,
            LoadWidth::Lhu => Self::HalfUnsigned,
        }
    }
}

impl From<StoreWidth> for MemWidth {
    fn from(width: StoreWidth) -> Self {
        match width {
            StoreWidth::Sb => Self::Byte,
            StoreWidth::Sh => Self::Half,
            StoreWidth::Sw => Self::Word,
        }
    }
}

/// Typed faults produced by the memory router.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum BusFault {
    #[error("load access fault")]
    LoadFault,
    #[error("misaligned load address")]
    LoadMisaligned,
    #[error("store access fault")]
    StoreFault,
    #[error("misaligned store address")]
    StoreMisaligned,
}

/// The two RAM regions. Virtual-to-physical translation for each region is an
/// affine offset: `physical = virtual - base`.
#[derive(Debug, Clone, Copy)]
pub struct MemoryMap {
    pub imem_base: u32,
    pub imem_size: u32,
    pub dmem_base: u32,
    pub dmem_size: u32,
}

impl MemoryMap {
    pub fn contains_imem(&self, address: u32) -> bool {
        address.wrapping_sub(self.imem_base) < self.imem_size
    }

    pub fn contains_dmem(&self, address: u32) -> bool {
        address.wrapping_sub(self.dmem_base) < self.dmem_size
    }
}

/// RAM backing: instruction and data memory as 32-bit lanes.
#[derive(Debug, Clone)]
pub struct SystemBus {
    map: MemoryMap,
    imem: Vec<u32>,
    dmem: Vec<u32>,
}

/// A program segment does not fit the simulated memory regions.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("cannot load {len} bytes at {address:#010x}: outside simulated memory")]
pub struct LoadSegmentError {
    pub address: u32,
    pub len: usize,
}

impl SystemBus {
    pub fn new(map: MemoryMap) -> Self {
        Self {
            map,
            imem: vec![0; (map.imem_size / 4) as usize],
            dmem: vec![0; (map.dmem_size / 4) as usize],
        }
    }

    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    /// `true` if `address` decodes to one of the RAM regions.
    pub fn in_ram(&self, address: u32) -> bool {
        self.map.contains_imem(address) || self.map.contains_dmem(address)
    }

    /// Reads the 32-bit lane holding `address`, or `None` outside RAM.
    pub fn lane(&self, address: u32) -> Option<u32> {
        if self.map.contains_imem(address) {
            let index = (address - self.map.imem_base) as usize / 4;
            Some(self.imem[index])
        } else if self.map.contains_dmem(address) {
            let index = (address - self.map.dmem_base) as usize / 4;
            Some(self.dmem[index])
        } else {
            None
        }
    }

    /// Replaces the 32-bit lane holding `address`. Returns `false` outside RAM.
    pub fn set_lane(&mut self, address: u32, value: u32) -> bool {
        if self.map.contains_imem(address) {
            let index = (address - self.map.imem_base) as usize / 4;
            self.imem[index] = value;
            true
        } else if self.map.contains_dmem(address) {
            let index = (address - self.map.dmem_base) as usize / 4;
            self.dmem[index] = value;
            true
        } else {
            false
        }
    }

    /// Fetches the 32-bit instruction word at `pc` from instruction memory.
    ///
    /// When `pc` is half-word aligned, the word is the high halfword of the
    /// current lane concatenated with the low halfword of the next lane.
    pub fn fetch(&self, pc: u32) -> Option<u32> {
        if !self.map.contains_imem(pc) {
            return None;
        }
        let lane = self.lane(pc)?;
        if pc & 2 == 0 {
            Some(lane)
        } else {
            let next = self.lane(pc.wrapping_add(4)).unwrap_or(0);
            Some((next << 16) | (lane >> 16))
        }
    }

    /// Reads the data-memory word holding `address`, or `None` outside dmem.
    pub fn dmem_word(&self, address: u32) -> Option<u32> {
        self.map
            .contains_dmem(address)
            .then(|| self.dmem[(address - self.map.dmem_base) as usize / 4])
    }

    /// Replaces the data-memory word holding `address`. Returns `false`
    /// outside dmem.
    pub fn dmem_set_word(&mut self, address: u32, value: u32) -> bool {
        if self.map.contains_dmem(address) {
            self.dmem[(address - self.map.dmem_base) as usize / 4] = value;
            true
        } else {
            false
        }
    }

    /// Copies `len` bytes out of data memory, for host syscall buffers.
    pub fn read_dmem_bytes(&self, address: u32, len: usize) -> Option<Vec<u8>> {
        let mut bytes = Vec::with_capacity(len);
        for i in 0..len {
            let a = address.wrapping_add(i as u32);
            bytes.push(extract_byte(self.dmem_word(a)?, a) as u8);
        }
        Some(bytes)
    }

    /// Copies bytes into data memory, for host syscall buffers.
    pub fn write_dmem_bytes(&mut self, address: u32, bytes: &[u8]) -> Option<()> {
        for (i, &byte) in bytes.iter().enumerate() {
            let a = address.wrapping_add(i as u32);
            let lane = self.dmem_word(a)?;
            self.dmem_set_word(a, merge_byte(lane, a, u32::from(byte)));
        }
        Some(())
    }

    /// Fault-free byte copy into either RAM region; the loader's entry point.
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> Result<(), LoadSegmentError> {
        let error = || LoadSegmentError {
            address,
            len: bytes.len(),
        };
        for (i, &byte) in bytes.iter().enumerate() {
            let a = address.wrapping_add(i as u32);
            let lane = self.lane(a).ok_or_else(error)?;
            self.set_lane(a, merge_byte(lane, a, u32::from(byte)));
        }
        Ok(())
    }
}

/// Extracts the byte at `address` from its 32-bit lane (zero-extended).
fn extract_byte(lane: u32, address: u32) -> u32 {
    (lane >> ((address & 3) * 8)) & 0xFF
}

/// Extracts the halfword at `address` from its 32-bit lane (zero-extended).
fn extract_half(lane: u32, address: u32) -> u32 {
    if address & 2 != 0 {
        lane >> 16
    } else {
        lane & 0xFFFF
    }
}

/// Merges a byte into its position within the lane, preserving the rest.
fn merge_byte(lane: u32, address: u32, data: u32) -> u32 {
    let shift = (address & 3) * 8;
    (lane & !(0xFF << shift)) | ((data & 0xFF) << shift)
}

/// Merges a halfword into its position within the lane, preserving the rest.
fn merge_half(lane: u32, address: u32, data: u32) -> u32 {
    if address & 2 != 0 {
        (lane & 0xFFFF) | (data << 16)
    } else {
        (lane & 0xFFFF_0000) | (data & 0xFFFF)
    }
}

impl<H: HostIo> Machine<H> {
    /// One data-memory access through the router: RAM regions first, then
    /// the MMIO table. Alignment is checked per width; sub-word accesses
    /// operate on the 32-bit lane holding the address.
    pub fn mem_access(
        &mut self,
        op: MemOp,
        width: MemWidth,
        address: u32,
        data: u32,
    ) -> Result<u32, BusFault> {
        match op {
            MemOp::Load => {
                let lane = match self.bus.lane(address) {
                    Some(lane) => lane,
                    None => self.mmio_load(address)?,
                };
                match width {
                    MemWidth::Byte => Ok(extract_byte(lane, address) as i8 as i32 as u32),
                    MemWidth::ByteUnsigned => Ok(extract_byte(lane, address)),
                    MemWidth::Half | MemWidth::HalfUnsigned => {
                        if !Alignment::HALFWORD.is_aligned(address) {
                            warn!(
                                "misaligned address {address:#010x} to read at PC {:#010x}",
                                self.registers.pc()
                            );
                            return Err(BusFault::LoadMisaligned);
                        }
                        let half = extract_half(lane, address);
                        match width {
                            MemWidth::Half => Ok(half as i16 as i32 as u32),
                            _ => Ok(half),
                        }
                    }
                    MemWidth::Word => {
                        if !Alignment::WORD.is_aligned(address) {
                            warn!(
                                "misaligned address {address:#010x} to read at PC {:#010x}",
                                self.registers.pc()
                            );
                            return Err(BusFault::LoadMisaligned);
                        }
                        Ok(lane)
                    }
                }
            }
            MemOp::Store => {
                if self.bus.in_ram(address) {
                    let lane = self.bus.lane(address).unwrap();
                    let new_lane = match width {
                        MemWidth::Byte | MemWidth::ByteUnsigned => {
                            merge_byte(lane, address, data)
                        }
                        MemWidth::Half | MemWidth::HalfUnsigned => {
                            if !Alignment::HALFWORD.is_aligned(address) {
                                warn!(
                                    "misaligned address {address:#010x} to write at PC {:#010x}",
                                    self.registers.pc()
                                );
                                return Err(BusFault::StoreMisaligned);
                            }
                            merge_half(lane, address, data)
                        }
                        MemWidth::Word => {
                            if !Alignment::WORD.is_aligned(address) {
                                warn!(
                                    "misaligned address {address:#010x} to write at PC {:#010x}",
                                    self.registers.pc()
                                );
                                return Err(BusFault::StoreMisaligned);
                            }
                            data
                        }
                    };
                    self.bus.set_lane(address, new_lane);
                    self.invalidate_reservation(address);
                    Ok(0)
                } else {
                    self.mmio_store(address, width, data).map(|()| 0)
                }
            }
        }
    }

    fn mmio_load(&mut self, address: u32) -> Result<u32, BusFault> {
        match address {
            MMIO_PUTC => Ok(0),
            MMIO_GETC => Ok(self.host.getc() as u32),
            MMIO_EXIT => Ok(0),
            MMIO_FROMHOST => Ok(std::mem::take(&mut self.fromhost)),
            MMIO_MTIME => Ok(self.clint.read_mtime_lo()),
            a if a == MMIO_MTIME + 4 => Ok(self.clint.read_mtime_hi()),
            MMIO_MTIMECMP => Ok(self.clint.read_mtimecmp_lo()),
            a if a == MMIO_MTIMECMP + 4 => Ok(self.clint.read_mtimecmp_hi()),
            MMIO_MSIP => Ok(self.clint.read_msip()),
            _ => {
                warn!(
                    "unknown address {address:#010x} to read at PC {:#010x}",
                    self.registers.pc()
                );
                Err(BusFault::LoadFault)
            }
        }
    }

    fn mmio_store(&mut self, address: u32, width: MemWidth, data: u32) -> Result<(), BusFault> {
        let mask = match width {
            MemWidth::Byte | MemWidth::ByteUnsigned => 0xFF,
            MemWidth::Half | MemWidth::HalfUnsigned => 0xFFFF,
            MemWidth::Word => 0xFFFF_FFFF,
        };
        match address {
            MMIO_PUTC => self.host.putc(data as u8),
            MMIO_GETC => {}
            MMIO_EXIT => self.pending_exit = Some(Exit::Exited(data as i32)),
            MMIO_TOHOST => self.htif_tohost(data)?,
            MMIO_MTIME => self.clint.write_mtime_lo(data, mask),
            a if a == MMIO_MTIME + 4 => self.clint.write_mtime_hi(data, mask),
            MMIO_MTIMECMP => self.clint.write_mtimecmp_lo(data, mask),
            a if a == MMIO_MTIMECMP + 4 => self.clint.write_mtimecmp_hi(data, mask),
            MMIO_MSIP => self.clint.write_msip(data, mask),
            _ => {
                warn!(
                    "unknown address {address:#010x} to write at PC {:#010x}",
                    self.registers.pc()
                );
                return Err(BusFault::StoreFault);
            }
        }
        Ok(())
    }

    /// Handles a TOHOST store: `pointer` addresses a syscall frame in data
    /// memory (`[func, a0..a5, reserved]`). The reply word becomes readable
    /// through FROMHOST.
    fn htif_tohost(&mut self, pointer: u32) -> Result<(), BusFault> {
        let mut frame = [0u32; SYSCALL_FRAME_WORDS];
        for (i, word) in frame.iter_mut().enumerate() {
            let a = pointer.wrapping_add(4 * i as u32);
            if a & 3 != 0 {
                warn!("misaligned tohost frame pointer {pointer:#010x}");
                return Err(BusFault::StoreFault);
            }
            *word = self.bus.dmem_word(a).ok_or_else(|| {
                warn!("tohost frame pointer {pointer:#010x} outside data memory");
                BusFault::StoreFault
            })?;
        }
        let args = [frame[1], frame[2], frame[3], frame[4], frame[5], frame[6]];
        match self.dispatch_syscall(frame[0], args) {
            SyscallOutcome::Ret(value) => self.fromhost = value as u32,
            SyscallOutcome::Exit(code) => self.pending_exit = Some(Exit::Exited(code)),
            SyscallOutcome::Unhandled => {}
        }
        Ok(())
    }

    /// Dispatches one guest syscall to the host bridge. Buffers are copied
    /// through data memory.
    pub(super) fn dispatch_syscall(&mut self, func: u32, args: [u32; 6]) -> SyscallOutcome {
        match func {
            SYS_EXIT => SyscallOutcome::Exit(args[0] as i32),
            SYS_WRITE => {
                let (fd, pointer, len) = (args[0] as i32, args[1], args[2] as usize);
                match self.bus.read_dmem_bytes(pointer, len) {
                    Some(bytes) => SyscallOutcome::Ret(self.host.write(fd, &bytes)),
                    None => {
                        warn!("write buffer {pointer:#010x}+{len} outside data memory");
                        SyscallOutcome::Ret(-1)
                    }
                }
            }
            SYS_READ => {
                let (fd, pointer, len) = (args[0] as i32, args[1], args[2] as usize);
                let mut buffer = vec![0u8; len];
                let count = self.host.read(fd, &mut buffer);
                if count > 0
                    && self
                        .bus
                        .write_dmem_bytes(pointer, &buffer[..count as usize])
                        .is_none()
                {
                    warn!("read buffer {pointer:#010x}+{len} outside data memory");
                    return SyscallOutcome::Ret(-1);
                }
                SyscallOutcome::Ret(count)
            }
            SYS_CLOSE => SyscallOutcome::Ret(0),
            _ => {
                warn!("unhandled syscall {func}");
                SyscallOutcome::Unhandled
            }
        }
    }

    /// Drops the LR reservation if a store just hit the reserved word.
    pub(super) fn invalidate_reservation(&mut self, address: u32) {
        if self.reservation.valid && address & !3 == self.reservation.address & !3 {
            self.reservation.valid = false;
        }
    }
}
