//! Host I/O bridge backed by the process's standard streams.

use log::warn;
use rv32sim_core::htif::HostIo;
use std::io::{Read, Write};

/// [`HostIo`] implementation wiring the guest console and syscalls to the
/// simulator process's stdin/stdout/stderr.
#[derive(Debug, Default)]
pub struct StdHost;

impl StdHost {
    pub fn new() -> Self {
        Self
    }
}

impl HostIo for StdHost {
    fn putc(&mut self, byte: u8) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(&[byte]);
        let _ = stdout.flush();
    }

    fn getc(&mut self) -> i32 {
        let mut buffer = [0u8; 1];
        match std::io::stdin().lock().read(&mut buffer) {
            Ok(1) => i32::from(buffer[0]),
            _ => -1,
        }
    }

    fn write(&mut self, fd: i32, buf: &[u8]) -> i32 {
        let result = match fd {
            1 => std::io::stdout().lock().write_all(buf),
            2 => std::io::stderr().lock().write_all(buf),
            _ => {
                warn!("guest write to unsupported fd {fd}");
                return -1;
            }
        };
        match result {
            Ok(()) => buf.len() as i32,
            Err(_) => -1,
        }
    }

    fn read(&mut self, fd: i32, buf: &mut [u8]) -> i32 {
        if fd != 0 {
            warn!("guest read from unsupported fd {fd}");
            return -1;
        }
        match std::io::stdin().lock().read(buf) {
            Ok(count) => count as i32,
            Err(_) => -1,
        }
    }
}
