use std::{io::Write, path::PathBuf};

use anyhow::{Context, ensure};
use clap::Parser;
use clap_num::maybe_hex;

use chip8_vm::{MEMORY_SIZE, MachineState, Opcode, ROM_START_ADDRESS};

/// Prints a CHIP-8 ROM as one decoded instruction per line.
#[derive(Parser)]
#[command(about)]
struct Args {
    /// Path to the ROM file to disassemble
    rom_path: PathBuf,

    /// Address of the first instruction
    #[arg(long, default_value = "0x200", value_parser = maybe_hex::<u16>)]
    start: u16,

    /// Number of instructions to print; without it, stops at the end of the ROM
    #[arg(long, value_parser = maybe_hex::<u16>)]
    count: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;

    let mut machine = MachineState::new();
    machine
        .load(&rom)
        .context("Failed to load ROM into CHIP-8 memory")?;

    let start = usize::from(args.start);
    ensure!(
        start < MEMORY_SIZE - 1,
        "Start address {:#05X} is outside memory",
        args.start
    );

    // The second byte of the last word must still be in memory
    let end = match args.count {
        Some(_) => MEMORY_SIZE - 1,
        None => ROM_START_ADDRESS + rom.len(),
    };
    let count = args.count.map_or(usize::MAX, usize::from);

    let memory = machine.memory();
    let mut out = std::io::stdout().lock();
    for address in (start..end).step_by(2).take(count) {
        let word = u16::from_be_bytes([memory[address], memory[address + 1]]);
        writeln!(out, "{address:03X}: {word:04X}  {}", Opcode::decode(word))?;
    }

    Ok(())
}
