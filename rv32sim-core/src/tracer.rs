//! Per-retirement trace log writer.
//!
//! When a log sink is attached, each retired instruction produces a line of
//! the form `<cycle> <pc> <inst> x<rd> (<abi>) <= 0x<value>`, with loads and
//! stores carrying an additional ` read`/` write` annotation. The content is
//! advisory; tests pattern-match it, nothing else consumes it.

use crate::registers::Specifier;
use std::io::Write;

pub struct Tracer {
    out: Option<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.out.is_some())
            .finish()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Tracer {
    /// A tracer that swallows everything.
    pub fn disabled() -> Self {
        Self { out: None }
    }

    /// A tracer writing to the given sink.
    pub fn to_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out: Some(out) }
    }

    pub fn enabled(&self) -> bool {
        self.out.is_some()
    }

    /// Starts a retirement line: cycle, pc, and the raw instruction word.
    /// The line is left open for one of the continuation methods below.
    pub fn begin(&mut self, cycle: u32, pc: u32, raw_instruction: u32) {
        if let Some(out) = &mut self.out {
            let _ = write!(out, "{cycle:10} {pc:08x} {raw_instruction:08x}");
        }
    }

    /// Finishes the line with a register write-back.
    pub fn reg(&mut self, dest: Specifier, value: u32) {
        if let Some(out) = &mut self.out {
            let _ = writeln!(
                out,
                " x{:02} ({}) <= 0x{value:08x}",
                u8::from(dest),
                dest.abi_name()
            );
        }
    }

    /// Finishes the line with a memory-load annotation.
    pub fn mem_read(&mut self, address: u32, dest: Specifier, value: u32) {
        if let Some(out) = &mut self.out {
            let _ = writeln!(
                out,
                " read 0x{address:08x}, x{:02} ({}) <= 0x{value:08x}",
                u8::from(dest),
                dest.abi_name()
            );
        }
    }

    /// Finishes the line with a memory-store annotation.
    pub fn mem_write(&mut self, address: u32, value: u32) {
        if let Some(out) = &mut self.out {
            let _ = writeln!(out, " write 0x{address:08x} <= 0x{value:08x}");
        }
    }

    /// Finishes the line with no annotation.
    pub fn end(&mut self) {
        if let Some(out) = &mut self.out {
            let _ = writeln!(out);
        }
    }

    pub fn flush(&mut self) {
        if let Some(out) = &mut self.out {
            let _ = out.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_format() {
        let buf = SharedBuf::default();
        let mut tracer = Tracer::to_writer(Box::new(buf.clone()));
        tracer.begin(12, 0x0000_0004, 0x0015_0513);
        tracer.reg(Specifier::A0, 0x1234_5678);
        tracer.begin(13, 0x0000_0008, 0x0001_2083);
        tracer.mem_read(0x0002_0000, Specifier::RA, 7);
        tracer.flush();
        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            Some("        12 00000004 00150513 x10 (a0) <= 0x12345678"),
            lines.next()
        );
        assert_eq!(
            Some("        13 00000008 00012083 read 0x00020000, x01 (ra) <= 0x00000007"),
            lines.next()
        );
        assert_eq!(None, lines.next());
    }
}
