use std::{num::NonZeroU32, time::Duration};

use crate::{Chip8, Chip8Error, Chip8Result, Clock, Display, Input, MachineState, SystemClock};

pub const DEFAULT_CPU_HZ: NonZeroU32 = NonZeroU32::new(1000).unwrap();
pub const DEFAULT_IO_HZ: NonZeroU32 = NonZeroU32::new(60).unwrap();

/// Instruction and I/O rates for a [`Chip8Runner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunnerConfig {
    pub cpu_hz: NonZeroU32,
    pub io_hz: NonZeroU32,
}

impl RunnerConfig {
    pub fn cpu_time_step(&self) -> Duration {
        Duration::from_secs(1) / self.cpu_hz.get()
    }

    pub fn io_time_step(&self) -> Duration {
        Duration::from_secs(1) / self.io_hz.get()
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cpu_hz: DEFAULT_CPU_HZ,
            io_hz: DEFAULT_IO_HZ,
        }
    }
}

/// Throughput measured over the interval since the previous I/O service.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Throughput {
    pub instructions_per_second: f64,
    pub frames_per_second: f64,
    /// Instructions executed since the runner started
    pub total_instructions: u64,
}

/// The platform side of an emulation session: owns the devices the CPU
/// talks to and gets serviced at the I/O rate.
pub trait Host {
    type Display: Display;
    type Input: Input;
    type Error: std::error::Error + Send + Sync + 'static;

    fn devices(&mut self) -> (&mut Self::Display, &mut Self::Input);

    /// Refreshes input state. Returning `false` ends the session.
    fn poll_input(&mut self) -> Result<bool, Self::Error>;

    /// Shows the current frame (and plays sound while the sound timer runs).
    fn present(&mut self, machine: &MachineState) -> Result<(), Self::Error>;

    fn report(&mut self, throughput: &Throughput) {
        log::debug!(
            "cpu {:.2}kHz  {:2.0}fps",
            throughput.instructions_per_second / 1000.0,
            throughput.frames_per_second
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError<E: std::error::Error + 'static> {
    #[error("Error while executing cpu instruction: {0}")]
    Chip8(#[from] Chip8Error),

    #[error("Host I/O failed: {0}")]
    Host(#[source] E),
}

/// High-level emulator runner that paces instruction execution and I/O.
///
/// Each iteration sleeps until the next instruction is due, runs at most one
/// instruction, then services the host if the I/O interval has elapsed. When
/// it falls behind it catches up by iterating faster, never by batching.
pub struct Chip8Runner<C: Clock = SystemClock> {
    chip8: Chip8<C>,
    clock: C,
    config: RunnerConfig,
    last_instruction: Option<Duration>,
    last_io: Duration,
    instructions_since_io: u64,
    total_instructions: u64,
}

impl<C: Clock + Clone> Chip8Runner<C> {
    pub fn new(chip8: Chip8<C>, config: RunnerConfig) -> Self {
        let clock = chip8.timers().clock().clone();
        let last_io = clock.now();

        Self {
            chip8,
            clock,
            config,
            last_instruction: None,
            last_io,
            instructions_since_io: 0,
            total_instructions: 0,
        }
    }

    /// Runs until the host ends the session, a key wait is cancelled or a fatal error occurs.
    pub fn run<H: Host>(&mut self, host: &mut H) -> Result<(), RunError<H::Error>> {
        while self.iterate(host)? {}
        Ok(())
    }

    /// One scheduling iteration. Returns `false` once the session is over.
    pub fn iterate<H: Host>(&mut self, host: &mut H) -> Result<bool, RunError<H::Error>> {
        let cpu_time_step = self.config.cpu_time_step();

        if let Some(last) = self.last_instruction {
            let elapsed = self.clock.now().saturating_sub(last);
            self.clock.sleep(cpu_time_step.saturating_sub(elapsed));
        }

        let now = self.clock.now();
        let due = self
            .last_instruction
            .is_none_or(|last| now.saturating_sub(last) >= cpu_time_step);

        if due {
            let (display, input) = host.devices();
            match self.chip8.tick(display, input)? {
                Chip8Result::Continue => {}
                Chip8Result::Shutdown => return Ok(false),
            }

            self.last_instruction = Some(now);
            self.instructions_since_io += 1;
            self.total_instructions += 1;
        }

        let since_io = self.clock.now().saturating_sub(self.last_io);
        if since_io >= self.config.io_time_step() {
            let secs = since_io.as_secs_f64();
            host.report(&Throughput {
                instructions_per_second: self.instructions_since_io as f64 / secs,
                frames_per_second: 1.0 / secs,
                total_instructions: self.total_instructions,
            });
            self.instructions_since_io = 0;

            if !host.poll_input().map_err(RunError::Host)? {
                return Ok(false);
            }
            host.present(self.chip8.machine()).map_err(RunError::Host)?;

            self.last_io = self.clock.now();
        }

        Ok(true)
    }

    pub fn chip8(&self) -> &Chip8<C> {
        &self.chip8
    }

    pub fn total_instructions(&self) -> u64 {
        self.total_instructions
    }
}
