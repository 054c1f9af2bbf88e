mod host;
mod loader;

use clap::Parser;
use host::StdHost;
use rv32sim_core::tracer::Tracer;
use rv32sim_core::{Config, Exit, Machine};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(version, about = "Instruction set simulator for RV32IMABC", long_about = None)]
struct Args {
    /// Suppress the end-of-simulation report.
    #[arg(short, long)]
    quiet: bool,
    /// Cycles charged when control flow leaves the sequential path.
    #[arg(short, long, default_value_t = 2)]
    branch: u32,
    /// Memory base address (decimal or 0x-prefixed hex).
    #[arg(short = 'm', long, value_parser = parse_address, default_value = "0")]
    membase: u32,
    /// Memory size in KiB, split evenly between instruction and data memory.
    #[arg(short = 'n', long, default_value_t = 256)]
    memsize: u32,
    /// Fuse instruction and data memory onto a single RAM port.
    #[arg(short, long)]
    single: bool,
    /// Enable static branch prediction (backward branches predicted taken).
    #[arg(short, long)]
    predict: bool,
    /// Write a per-instruction trace log to this file.
    #[arg(short, long)]
    log: Option<PathBuf>,
    /// Disable support for 16-bit compressed instructions.
    #[arg(long)]
    no_compressed: bool,
    /// The ELF executable to simulate.
    elf: PathBuf,
}

fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut buf = Vec::new();
    if let Err(e) = File::open(&args.elf).and_then(|mut f| f.read_to_end(&mut buf)) {
        eprintln!("cannot read {}: {e}", args.elf.display());
        std::process::exit(1);
    }

    let config = Config {
        mem_base: args.membase,
        mem_size: args.memsize * 1024,
        branch_penalty: args.branch,
        branch_predict: args.predict,
        singleram: args.single,
        compressed: !args.no_compressed,
    };

    let mut machine = Machine::new(config, StdHost::new());

    if let Err(e) = loader::load_elf(&mut machine, &buf) {
        eprintln!("cannot load elf file {}: {e}", args.elf.display());
        std::process::exit(1);
    }

    if let Some(path) = &args.log {
        match File::create(path) {
            Ok(file) => machine.set_tracer(Tracer::to_writer(Box::new(BufWriter::new(file)))),
            Err(e) => {
                eprintln!("cannot open log file {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }

    let start = Instant::now();
    let exit = machine.run();
    let elapsed = start.elapsed().as_secs_f64();

    if let Exit::ForeverLoop { pc } = exit {
        eprintln!("Warning: forever loop detected at PC {pc:#010x}");
    }

    if !args.quiet {
        let stats = machine.stats();
        let cpi = stats.cycle as f64 / stats.instret.max(1) as f64;
        let overhead = stats.overhead as f64 * 100.0 / stats.instret.max(1) as f64;
        println!(
            "\nExecuting {} instructions, {} cycles, {cpi:.3} CPI, {overhead:.3}% overhead",
            stats.instret, stats.cycle,
        );
        println!("Program terminate");
        println!();
        println!("Simulation statistics");
        println!("=====================");
        println!("Simulation time  : {elapsed:.3} s");
        println!("Simulation cycles: {}", stats.cycle);
        println!(
            "Simulation speed : {:.3} MHz",
            stats.cycle as f64 / elapsed.max(f64::EPSILON) / 1_000_000.0
        );
        println!();
    }

    std::process::exit(exit.code());
}
