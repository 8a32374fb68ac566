use rand::{SeedableRng, rngs::StdRng};

use crate::{
    Chip8Error, Chip8Result, Clock, Display, Input, MachineState, Opcode, SystemClock, TimerDriver,
    execute::Flow,
};

/// CHIP-8 virtual machine: machine state plus the timer driver and random
/// source that instructions act on.
pub struct Chip8<C: Clock = SystemClock> {
    pub(crate) machine: MachineState,
    pub(crate) timers: TimerDriver<C>,
    pub(crate) rng: StdRng,
    /// Opcodes that matched no instruction pattern
    pub(crate) decode_misses: u64,
    pub(crate) last_decode_miss: Option<u16>,
}

impl Chip8<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::default())
    }
}

impl Default for Chip8<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Chip8<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            machine: MachineState::new(),
            timers: TimerDriver::new(clock),
            rng: StdRng::from_os_rng(),
            decode_misses: 0,
            last_decode_miss: None,
        }
    }

    /// Makes `RND` deterministic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Loads a ROM into memory at 0x200.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        self.machine.load(rom)?;
        log::info!("loaded {} byte program", rom.len());
        Ok(())
    }

    /// Executes a single CPU cycle (fetch, decode, execute) and then services the timers.
    pub fn tick<D, I>(&mut self, display: &mut D, input: &mut I) -> Result<Chip8Result, Chip8Error>
    where
        D: Display + ?Sized,
        I: Input + ?Sized,
    {
        let opcode = self.machine.fetch()?;
        let decoded_opcode = Opcode::decode(opcode);

        match self.execute(decoded_opcode, display, input)? {
            Flow::Next => self.machine.pc = self.machine.pc.wrapping_add(2),
            Flow::Jump => {}
            Flow::Halt => return Ok(Chip8Result::Shutdown),
        }

        self.timers.service(&mut self.machine);
        Ok(Chip8Result::Continue)
    }

    pub fn machine(&self) -> &MachineState {
        &self.machine
    }

    pub fn timers(&self) -> &TimerDriver<C> {
        &self.timers
    }

    /// Number of opcodes executed as no-ops because they matched no instruction.
    pub fn decode_misses(&self) -> u64 {
        self.decode_misses
    }

    pub fn last_decode_miss(&self) -> Option<u16> {
        self.last_decode_miss
    }
}
