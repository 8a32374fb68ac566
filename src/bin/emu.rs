use std::{
    collections::VecDeque,
    num::NonZeroU32,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use pixels::{Pixels, SurfaceTexture};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source, source::SquareWave};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, KeyCode, NamedKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowId},
};

use chip8_vm::{
    Chip8, Chip8Runner, DEFAULT_CPU_HZ, DEFAULT_IO_HZ, DISPLAY_X, DISPLAY_Y, FrameBuffer, Grid,
    Host, Input, Keypad, MachineState, RunnerConfig, Throughput, u4,
};

/// The rate at which pixels fade out (phosphor decay).
const DISPLAY_PHOSPHOR_RATE: f32 = 10.0;

/// How long a key wait blocks on the window event queue before servicing the timers.
const KEY_WAIT_POLL: Duration = Duration::from_millis(10);

/// Mapping from physical keyboard keys to CHIP-8 hex keypad (0x0-0xF).
const KEY_MAP: [KeyCode; 16] = [
    KeyCode::KeyX,   // 0x00
    KeyCode::Digit1, // 0x01
    KeyCode::Digit2, // 0x02
    KeyCode::Digit3, // 0x03
    KeyCode::KeyQ,   // 0x04
    KeyCode::KeyW,   // 0x05
    KeyCode::KeyE,   // 0x06
    KeyCode::KeyA,   // 0x07
    KeyCode::KeyS,   // 0x08
    KeyCode::KeyD,   // 0x09
    KeyCode::KeyZ,   // 0x0A
    KeyCode::KeyC,   // 0x0B
    KeyCode::Digit4, // 0x0C
    KeyCode::KeyR,   // 0x0D
    KeyCode::KeyF,   // 0x0E
    KeyCode::KeyV,   // 0x0F
];

#[derive(Debug, thiserror::Error)]
enum FrontendError {
    #[error("Failed to create window: {0}")]
    Window(String),

    #[error("Pixels render error: {0}")]
    Pixels(#[from] pixels::Error),

    #[error("Failed to resize pixels surface: {0}")]
    Resize(#[from] pixels::TextureError),
}

/// Window, surface and keyboard state, updated from winit callbacks.
struct WindowState {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    scale: u32,

    keypad: Keypad,
    /// Fresh key presses in arrival order, consumed by key waits.
    pressed: VecDeque<u4>,

    exit_requested: bool,
    error: Option<FrontendError>,
}

impl WindowState {
    fn new(scale: u32) -> Self {
        Self {
            window: None,
            pixels: None,
            scale,
            keypad: Keypad::new(),
            pressed: VecDeque::new(),
            exit_requested: false,
            error: None,
        }
    }

    fn try_resumed(&mut self, event_loop: &ActiveEventLoop) -> Result<(), FrontendError> {
        if self.window.is_some() {
            return Ok(());
        }

        let window = {
            let size = LogicalSize::new(
                DISPLAY_X as u32 * self.scale,
                DISPLAY_Y as u32 * self.scale,
            );
            let min_size = LogicalSize::new(DISPLAY_X as u32, DISPLAY_Y as u32);

            Arc::new(
                event_loop
                    .create_window(
                        Window::default_attributes()
                            .with_title("chip8-vm")
                            .with_inner_size(size)
                            .with_min_inner_size(min_size),
                    )
                    .map_err(|e| FrontendError::Window(e.to_string()))?,
            )
        };

        let window_size = window.inner_size();
        let surface_texture =
            SurfaceTexture::new(window_size.width, window_size.height, window.clone());
        self.pixels = Some(Pixels::new(
            DISPLAY_X as u32,
            DISPLAY_Y as u32,
            surface_texture,
        )?);
        self.window = Some(window);

        Ok(())
    }

    fn try_window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        event: WindowEvent,
    ) -> Result<(), FrontendError> {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        ..
                    },
                ..
            } => {
                self.exit_requested = true;
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(pixels) = self.pixels.as_mut() {
                    pixels.resize_surface(size.width, size.height)?;
                }
            }

            // Releases are not delivered to unfocused windows
            WindowEvent::Focused(false) => self.keypad.release_all(),

            WindowEvent::KeyboardInput { event, .. } => {
                let Some(idx) = KEY_MAP.iter().position(|&k| k == event.physical_key) else {
                    return Ok(());
                };
                let key = u4::new(idx as u8);

                match event.state {
                    ElementState::Pressed => {
                        if self.keypad.set_key(key, true) {
                            self.pressed.push_back(key);
                        }
                    }
                    ElementState::Released => {
                        self.keypad.set_key(key, false);
                    }
                }
            }

            _ => (),
        }
        Ok(())
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.try_resumed(event_loop) {
            self.error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.try_window_event(event_loop, event) {
            self.error = Some(e);
            event_loop.exit();
        }
    }
}

/// Keyboard input read by pumping the winit event loop on demand.
struct WindowInput {
    event_loop: EventLoop<()>,
    state: WindowState,
    /// Square wave, paused while the sound timer is 0.
    tone: Sink,
}

impl WindowInput {
    /// Dispatches pending window events, blocking up to `timeout` for the
    /// first one. Returns false once the window is closing.
    fn pump(&mut self, timeout: Duration) -> Result<bool, FrontendError> {
        let status = self
            .event_loop
            .pump_app_events(Some(timeout), &mut self.state);

        if let Some(e) = self.state.error.take() {
            return Err(e);
        }
        Ok(!self.state.exit_requested && matches!(status, PumpStatus::Continue))
    }

    fn set_tone(&self, on: bool) {
        if on {
            self.tone.play();
        } else {
            self.tone.pause();
        }
    }
}

impl Input for WindowInput {
    fn is_pressed(&self, key: u4) -> bool {
        self.state.keypad.is_pressed(key)
    }

    fn wait_for_next_key(&mut self, service: &mut dyn FnMut() -> bool) -> Option<u4> {
        // Only presses that happen during the wait count
        self.state.pressed.clear();

        loop {
            match self.pump(KEY_WAIT_POLL) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    // Kept for main to report once the runner stops
                    self.state.error = Some(e);
                    return None;
                }
            }

            if let Some(key) = self.state.pressed.pop_front() {
                return Some(key);
            }
            // No frames are presented during the wait
            let sounding = service();
            self.set_tone(sounding);
        }
    }
}

struct Emulator {
    screen: FrameBuffer,
    input: WindowInput,

    /// Stores the brightness of each pixel (0.0 to 1.0) to implement phosphor decay.
    brightness: Grid<f32>,
    last_present: Instant,

    /// Audio output stream (must be kept alive).
    _audio_stream: OutputStream,
}

impl Emulator {
    fn new(event_loop: EventLoop<()>, scale: u32) -> anyhow::Result<Self> {
        // Initialize audio
        let mut _audio_stream = OutputStreamBuilder::open_default_stream()
            .context("Failed to open audio output stream")?;
        _audio_stream.log_on_drop(false);

        let tone = Sink::connect_new(_audio_stream.mixer());
        tone.pause();
        tone.append(SquareWave::new(440.0).amplify(0.5));

        let mut input = WindowInput {
            event_loop,
            state: WindowState::new(scale),
            tone,
        };
        // Creates the window
        input.pump(Duration::ZERO).context("Failed to open window")?;

        Ok(Self {
            screen: FrameBuffer::new(),
            input,
            brightness: [[0.0; DISPLAY_X]; DISPLAY_Y],
            last_present: Instant::now(),
            _audio_stream,
        })
    }
}

impl Host for Emulator {
    type Display = FrameBuffer;
    type Input = WindowInput;
    type Error = FrontendError;

    fn devices(&mut self) -> (&mut FrameBuffer, &mut WindowInput) {
        (&mut self.screen, &mut self.input)
    }

    fn poll_input(&mut self) -> Result<bool, FrontendError> {
        self.input.pump(Duration::ZERO)
    }

    fn present(&mut self, machine: &MachineState) -> Result<(), FrontendError> {
        self.input.set_tone(machine.should_beep());

        let now = Instant::now();
        let dt = (now - self.last_present).as_secs_f32();
        self.last_present = now;

        let Some(pixels) = self.input.state.pixels.as_mut() else {
            return Ok(());
        };

        for (i, pxl) in pixels.frame_mut().chunks_exact_mut(4).enumerate() {
            let x = i % DISPLAY_X;
            let y = i / DISPLAY_X;

            // Lit pixels jump to full brightness, unlit ones fade out over time
            let brightness = &mut self.brightness[y][x];
            *brightness = if self.screen.pixel(x, y) {
                1.0
            } else {
                (*brightness - DISPLAY_PHOSPHOR_RATE * dt).max(0.0)
            };

            let rgba = [0, 0xff, 0, (*brightness * 255.0) as u8];
            pxl.copy_from_slice(&rgba);
        }

        pixels.render()?;
        Ok(())
    }

    fn report(&mut self, throughput: &Throughput) {
        if let Some(window) = &self.input.state.window {
            window.set_title(&format!(
                "chip8-vm - cpu {:.2}kHz {:2.0}fps",
                throughput.instructions_per_second / 1000.0,
                throughput.frames_per_second
            ));
        }
    }
}

/// CHIP-8 virtual machine with a window frontend.
///
/// Keys 1-4, Q-R, A-F, Z-V map to CHIP-8 keys.
/// Escape is used to exit the emulator.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,

    /// Instructions executed per second
    #[arg(long, default_value_t = DEFAULT_CPU_HZ)]
    cpu_hz: NonZeroU32,

    /// Display refreshes and keyboard polls per second
    #[arg(long, default_value_t = DEFAULT_IO_HZ)]
    io_hz: NonZeroU32,

    /// Window pixels per CHIP-8 pixel
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=40))]
    scale: u32,

    /// Seed for the random number instruction
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;

    let mut chip8 = Chip8::new();
    if let Some(seed) = args.seed {
        chip8 = chip8.with_seed(seed);
    }
    chip8
        .load(&rom)
        .context("Failed to load ROM into CHIP-8 memory")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut emulator =
        Emulator::new(event_loop, args.scale).context("Failed to initialize application")?;

    let mut runner = Chip8Runner::new(
        chip8,
        RunnerConfig {
            cpu_hz: args.cpu_hz,
            io_hz: args.io_hz,
        },
    );

    let result = runner.run(&mut emulator);
    if result.is_err() {
        let chip8 = runner.chip8();
        log::error!(
            "machine state at halt:\n{}\nlast timer tick {:?} ago",
            chip8.machine(),
            chip8.timers().since_last_decrement()
        );
    }
    result.context("Emulation halted")?;

    // A window failure during a key wait ends the session without an error from the runner
    if let Some(e) = emulator.input.state.error.take() {
        return Err(e).context("Window error");
    }
    Ok(())
}
