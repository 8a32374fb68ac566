use std::fmt;

use crate::{Chip8Error, FONT, FONT_END_ADDRESS, FONT_START_ADDRESS, u4, u12};

// Memory layout of the CHIP-8 platform
pub const ROM_START_ADDRESS: usize = 0x200;
pub const MEMORY_SIZE: usize = 4096;
pub const STACK_DEPTH: usize = 16;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;

/// CHIP-8 machine state: registers, memory, call stack and timers
#[derive(Clone)]
pub struct MachineState {
    /// 4KB memory array
    pub(crate) memory: [u8; MEMORY_SIZE],

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u12,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Return addresses, valid up to `sp`
    pub(crate) stack: [u16; STACK_DEPTH],
    pub(crate) sp: usize,

    /// Delay timer: decrements at 60Hz until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements at 60Hz, beeps while non-zero
    pub(crate) sound_timer: u8,
}

impl MachineState {
    pub fn new() -> Self {
        let mut memory = [0; MEMORY_SIZE];
        memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);

        MachineState {
            memory,
            pc: ROM_START_ADDRESS as u16,
            i: u12::default(),
            v: [0; 16],
            stack: [0; STACK_DEPTH],
            sp: 0,
            delay_timer: 0,
            sound_timer: 0,
        }
    }

    /// Copies a program into memory at 0x200 and points the program counter at it.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        let rom_end = ROM_START_ADDRESS + rom.len();
        self.memory
            .get_mut(ROM_START_ADDRESS..rom_end)
            .ok_or(Chip8Error::CapacityExceeded {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            })?
            .copy_from_slice(rom);

        self.pc = ROM_START_ADDRESS as u16;
        Ok(())
    }

    /// Pushes a return address. The stack is left untouched when it is full.
    pub fn push(&mut self, address: u16) -> Result<(), Chip8Error> {
        let slot = self
            .stack
            .get_mut(self.sp)
            .ok_or(Chip8Error::StackOverflow { address })?;
        *slot = address;
        self.sp += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16, Chip8Error> {
        if self.sp == 0 {
            return Err(Chip8Error::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    /// Fetches the 16-bit big-endian opcode at the program counter.
    pub fn fetch(&self) -> Result<u16, Chip8Error> {
        let pc = self.pc as usize;
        if pc > MEMORY_SIZE - 2 {
            return Err(Chip8Error::ProgramCounterOutOfRange { pc: self.pc });
        }

        Ok(u16::from_be_bytes([self.memory[pc], self.memory[pc + 1]]))
    }

    pub(crate) fn read(&self, address: usize) -> Result<u8, Chip8Error> {
        self.memory
            .get(address)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfBounds { address })
    }

    pub(crate) fn write(&mut self, address: usize, value: u8) -> Result<(), Chip8Error> {
        let byte = self
            .memory
            .get_mut(address)
            .ok_or(Chip8Error::MemoryOutOfBounds { address })?;
        *byte = value;
        Ok(())
    }

    pub(crate) fn decrement_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn index(&self) -> u12 {
        self.i
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn register(&self, x: u4) -> u8 {
        self.v[x]
    }

    /// The pushed return addresses, oldest first.
    pub fn stack(&self) -> &[u16] {
        &self.stack[..self.sp]
    }

    pub fn stack_pointer(&self) -> usize {
        self.sp
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.sound_timer > 0
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Multi-line dump of the machine state, meant for post-mortem diagnosis.
impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for idx in 0..8 {
            writeln!(
                f,
                "V{:X}: {:02X}    V{:X}: {:02X}",
                idx,
                self.v[idx],
                idx + 8,
                self.v[idx + 8]
            )?;
        }
        writeln!(f)?;
        writeln!(f, "I:  {:03X}   PC: {:03X}", self.i, self.pc)?;
        writeln!(f, "DT: {:02X}    SP: {:02}", self.delay_timer, self.sp)?;
        match self.fetch() {
            Ok(opcode) => writeln!(f, "ST: {:02X}    Opcode @ PC: {:04X}", self.sound_timer, opcode)?,
            Err(_) => writeln!(f, "ST: {:02X}    Opcode @ PC: ----", self.sound_timer)?,
        }
        writeln!(f)?;
        write!(f, "Stack:")?;
        for address in self.stack() {
            write!(f, " {address:03X}")?;
        }
        writeln!(f)?;
        write!(f, "Memory @ I: {:02X}", self.memory[usize::from(self.i)])
    }
}
