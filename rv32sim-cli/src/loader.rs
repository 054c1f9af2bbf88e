//! ELF program loading.

use goblin::elf::program_header::PT_LOAD;
use goblin::error::Error;
use log::debug;
use rv32sim_core::htif::HostIo;
use rv32sim_core::Machine;

/// Copies all loadable segments of the ELF image into simulated memory.
///
/// The simulated reset vector is the configured memory base, not the ELF
/// entry point; bare-metal images for this system place their startup code
/// there.
pub fn load_elf<H: HostIo>(machine: &mut Machine<H>, program_elf: &[u8]) -> Result<(), Error> {
    let elf_header = goblin::elf::Elf::parse(program_elf)?;

    let segments = elf_header
        .program_headers
        .iter()
        .filter(|h| h.p_type == PT_LOAD);

    for h in segments {
        debug!(
            "loading segment: file range [{:#010x?}..{:#010x?}] to [{:#010x?}..{:#010x?}]",
            h.p_offset,
            h.p_offset + h.p_filesz,
            h.p_paddr,
            h.p_paddr + h.p_memsz,
        );

        let buf = &program_elf[h.file_range()];
        machine
            .load(h.p_paddr as u32, buf)
            .map_err(|e| Error::Malformed(e.to_string()))?;
    }

    Ok(())
}
