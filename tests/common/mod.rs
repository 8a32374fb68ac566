#![allow(dead_code)]

use std::{collections::VecDeque, time::Duration};

use chip8_vm::{
    Chip8, Display, FrameBuffer, Host, Input, Keypad, MachineState, ManualClock,
    Throughput, u4,
};

/// Assembles opcodes into a big-endian ROM image.
pub fn rom(opcodes: &[u16]) -> Vec<u8> {
    opcodes.iter().flat_map(|op| op.to_be_bytes()).collect()
}

pub fn chip8_with(opcodes: &[u16]) -> (Chip8<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let mut chip8 = Chip8::with_clock(clock.clone()).with_seed(0xC8);
    chip8.load(&rom(opcodes)).unwrap();
    (chip8, clock)
}

/// Headless keypad. Key waits are answered from a script: each entry calls
/// the service callback `polls` times, advancing the clock by `poll_interval`
/// before each call, then reports `key`. An empty script acts as a closed source.
/// What each service call said about the sound timer lands in `tone`.
pub struct ScriptedInput {
    pub keypad: Keypad,
    pub script: VecDeque<(usize, u4)>,
    pub clock: ManualClock,
    pub poll_interval: Duration,
    pub service_calls: usize,
    pub tone: Vec<bool>,
}

impl ScriptedInput {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            keypad: Keypad::new(),
            script: VecDeque::new(),
            clock,
            poll_interval: Duration::from_millis(10),
            service_calls: 0,
            tone: Vec::new(),
        }
    }

    pub fn then_key(mut self, polls: usize, key: u8) -> Self {
        self.script.push_back((polls, u4::new(key)));
        self
    }
}

impl Input for ScriptedInput {
    fn is_pressed(&self, key: u4) -> bool {
        self.keypad.is_pressed(key)
    }

    fn wait_for_next_key(&mut self, service: &mut dyn FnMut() -> bool) -> Option<u4> {
        let (polls, key) = self.script.pop_front()?;
        for _ in 0..polls {
            self.clock.advance(self.poll_interval);
            self.tone.push(service());
            self.service_calls += 1;
        }
        Some(key)
    }
}

/// Host that ends the session after a fixed number of input polls.
pub struct TestHost {
    pub display: FrameBuffer,
    pub input: ScriptedInput,
    pub max_polls: usize,
    pub polls: usize,
    pub presents: usize,
    pub reports: Vec<Throughput>,
    pub last_sound_timer: u8,
}

impl TestHost {
    pub fn new(clock: ManualClock, max_polls: usize) -> Self {
        Self {
            display: FrameBuffer::new(),
            input: ScriptedInput::new(clock),
            max_polls,
            polls: 0,
            presents: 0,
            reports: Vec::new(),
            last_sound_timer: 0,
        }
    }
}

impl Host for TestHost {
    type Display = FrameBuffer;
    type Input = ScriptedInput;
    type Error = std::io::Error;

    fn devices(&mut self) -> (&mut FrameBuffer, &mut ScriptedInput) {
        (&mut self.display, &mut self.input)
    }

    fn poll_input(&mut self) -> Result<bool, std::io::Error> {
        self.polls += 1;
        Ok(self.polls < self.max_polls)
    }

    fn present(&mut self, machine: &MachineState) -> Result<(), std::io::Error> {
        self.presents += 1;
        self.last_sound_timer = machine.sound_timer();
        Ok(())
    }

    fn report(&mut self, throughput: &Throughput) {
        self.reports.push(*throughput);
    }
}

/// Display whose pixels read back as an out-of-range value.
pub struct CorruptDisplay;

impl Display for CorruptDisplay {
    fn clear(&mut self) {}

    fn get(&self, _x: usize, _y: usize) -> u8 {
        3
    }

    fn set(&mut self, _x: usize, _y: usize, bit: u8) -> Result<(), chip8_vm::InvalidPixel> {
        if bit > 1 {
            return Err(chip8_vm::InvalidPixel(bit));
        }
        Ok(())
    }
}
