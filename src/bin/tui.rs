use std::{
    num::NonZeroU32,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span, Text},
    widgets::{Block, Paragraph, Widget},
};

use chip8_vm::{
    Chip8, Chip8Runner, DEFAULT_CPU_HZ, DEFAULT_IO_HZ, DISPLAY_X, DISPLAY_Y, FrameBuffer, Host,
    Input, KEY_COUNT, Keypad, MachineState, RunnerConfig, STACK_DEPTH, Throughput, u4,
};

/// Keyboard characters for CHIP-8 keys 0x0-0xF.
const KEY_MAP: [char; KEY_COUNT] = [
    'x', '1', '2', '3', 'q', 'w', 'e', 'a', 's', 'd', 'z', 'c', '4', 'r', 'f', 'v',
];

// Terminals do not report key releases, so a key is held until this long after its last press or repeat.
const KEY_RELEASE_TIMEOUT: Duration = Duration::from_millis(50);

const KEY_WAIT_POLL: Duration = Duration::from_millis(10);

struct TerminalInput {
    keypad: Keypad,
    key_press_times: [Option<Instant>; KEY_COUNT],
    should_quit: bool,
}

impl TerminalInput {
    fn new() -> Self {
        Self {
            keypad: Keypad::new(),
            key_press_times: [None; KEY_COUNT],
            should_quit: false,
        }
    }

    /// Applies a terminal event and returns the keypad key it freshly pressed, if any.
    fn handle_event(&mut self, event: Event) -> Option<u4> {
        let Event::Key(key) = event else {
            return None;
        };
        if key.kind == KeyEventKind::Release {
            return None;
        }

        // Ctrl+C and Esc quit
        if key.code == KeyCode::Esc
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            self.should_quit = true;
            return None;
        }

        let idx = KEY_MAP
            .iter()
            .position(|&c| key.code == KeyCode::Char(c))?;
        self.key_press_times[idx] = Some(Instant::now());

        let pad_key = u4::new(idx as u8);
        self.keypad.set_key(pad_key, true).then_some(pad_key)
    }

    fn check_key_timeout(&mut self) {
        let now = Instant::now();

        for (idx, press_time) in self.key_press_times.iter_mut().enumerate() {
            if let Some(time) = press_time
                && now.duration_since(*time) > KEY_RELEASE_TIMEOUT
            {
                *press_time = None;
                self.keypad.set_key(u4::new(idx as u8), false);
            }
        }
    }

    /// Handles every pending terminal event without blocking.
    fn drain(&mut self) -> std::io::Result<()> {
        while event::poll(Duration::ZERO)? {
            let event = event::read()?;
            self.handle_event(event);
        }
        self.check_key_timeout();
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> std::io::Result<Option<Event>> {
        if event::poll(timeout)? {
            event::read().map(Some)
        } else {
            Ok(None)
        }
    }
}

impl Input for TerminalInput {
    fn is_pressed(&self, key: u4) -> bool {
        self.keypad.is_pressed(key)
    }

    fn wait_for_next_key(&mut self, service: &mut dyn FnMut() -> bool) -> Option<u4> {
        loop {
            if self.should_quit {
                return None;
            }

            match self.next_event(KEY_WAIT_POLL) {
                Ok(Some(event)) => {
                    if let Some(key) = self.handle_event(event) {
                        return Some(key);
                    }
                }
                Ok(None) => {}
                // The terminal is gone, nothing more will arrive
                Err(_) => return None,
            }

            self.check_key_timeout();
            service();
        }
    }
}

struct TerminalFrontend {
    terminal: DefaultTerminal,
    screen: FrameBuffer,
    /// Display panel contents, rebuilt only when the frame buffer changes
    screen_text: Text<'static>,
    input: TerminalInput,
    throughput: Throughput,
}

impl Host for TerminalFrontend {
    type Display = FrameBuffer;
    type Input = TerminalInput;
    type Error = std::io::Error;

    fn devices(&mut self) -> (&mut FrameBuffer, &mut TerminalInput) {
        (&mut self.screen, &mut self.input)
    }

    fn poll_input(&mut self) -> std::io::Result<bool> {
        self.input.drain()?;
        Ok(!self.input.should_quit)
    }

    fn present(&mut self, machine: &MachineState) -> std::io::Result<()> {
        if self.screen.take_dirty() {
            self.screen_text = screen_text(&self.screen);
        }

        let view = View {
            screen: &self.screen_text,
            machine,
            keypad: &self.input.keypad,
            throughput: &self.throughput,
        };
        self.terminal
            .draw(|frame| frame.render_widget(&view, frame.area()))?;
        Ok(())
    }

    fn report(&mut self, throughput: &Throughput) {
        self.throughput = *throughput;
    }
}

/// Renders the frame buffer with half blocks, two display rows per line.
fn screen_text(screen: &FrameBuffer) -> Text<'static> {
    screen
        .rows()
        .chunks_exact(2)
        .map(|pair| {
            let cells: String = pair[0]
                .iter()
                .zip(&pair[1])
                .map(|(&top, &bottom)| match (top, bottom) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                })
                .collect();
            Line::from(cells)
        })
        .collect()
}

/// One frame of the terminal UI.
struct View<'a> {
    screen: &'a Text<'static>,
    machine: &'a MachineState,
    keypad: &'a Keypad,
    throughput: &'a Throughput,
}

const SIDE_WIDTH: u16 = 19;
const SPEED_HEIGHT: u16 = 4;
const REGISTERS_HEIGHT: u16 = 13;
const KEYPAD_HEIGHT: u16 = 6;

impl Widget for &View<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Two display rows share one terminal row
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + SIDE_WIDTH;
        const MIN_HEIGHT: u16 = SPEED_HEIGHT + REGISTERS_HEIGHT + KEYPAD_HEIGHT + 3;

        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            let message = format!("Need a {MIN_WIDTH}x{MIN_HEIGHT} terminal");
            Paragraph::new(message)
                .style(Style::default().fg(Color::Red))
                .alignment(Alignment::Center)
                .block(Block::bordered())
                .render(
                    area.centered(Constraint::Length(40), Constraint::Length(3)),
                    buf,
                );
            return;
        }

        let [left, right] =
            Layout::horizontal([Constraint::Fill(1), Constraint::Length(SIDE_WIDTH)]).areas(area);
        let [display, _] = Layout::vertical([
            Constraint::Length(DISPLAY_Y as u16 / 2 + 2),
            Constraint::Fill(1),
        ])
        .areas(left);
        let [speed, registers, keypad, stack] = Layout::vertical([
            Constraint::Length(SPEED_HEIGHT),
            Constraint::Length(REGISTERS_HEIGHT),
            Constraint::Length(KEYPAD_HEIGHT),
            Constraint::Fill(1),
        ])
        .areas(right);

        self.draw_screen(display, buf);
        self.draw_speed(speed, buf);
        self.draw_registers(registers, buf);
        self.draw_keypad(keypad, buf);
        self.draw_stack(stack, buf);
    }
}

impl View<'_> {
    fn draw_screen(&self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(self.screen.clone())
            .style(Style::default().fg(Color::Green))
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" CHIP-8 "))
            .render(area, buf);
    }

    fn draw_speed(&self, area: Rect, buf: &mut Buffer) {
        let t = self.throughput;
        let text = Text::from(vec![
            Line::from(format!("{:.2} kHz", t.instructions_per_second / 1000.0)),
            Line::from(format!("{:.0} fps", t.frames_per_second)),
        ]);

        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Speed "))
            .render(area, buf);
    }

    fn draw_registers(&self, area: Rect, buf: &mut Buffer) {
        let m = self.machine;
        let v = m.registers();

        let header = [
            format!("PC {:03X}   I {:03X}", m.pc(), m.index()),
            format!("DT {:02X}   ST {:02X}", m.delay_timer(), m.sound_timer()),
            String::new(),
        ];
        let pairs = (0..8).map(|n| format!("V{n:X} {:02X}   V{:X} {:02X}", v[n], n + 8, v[n + 8]));
        let lines: Vec<Line> = header.into_iter().chain(pairs).map(Line::from).collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Registers "))
            .render(area, buf);
    }

    fn draw_keypad(&self, area: Rect, buf: &mut Buffer) {
        const ROWS: [[usize; 4]; 4] = [
            [0x1, 0x2, 0x3, 0xC],
            [0x4, 0x5, 0x6, 0xD],
            [0x7, 0x8, 0x9, 0xE],
            [0xA, 0x0, 0xB, 0xF],
        ];
        let held = self.keypad.keys();

        let lines: Vec<Line> = ROWS
            .iter()
            .map(|row| {
                let mut spans = Vec::with_capacity(row.len() * 2);
                for (n, &key) in row.iter().enumerate() {
                    if n > 0 {
                        spans.push(Span::raw(" "));
                    }
                    let style = if held[key] {
                        Style::default().fg(Color::Black).bg(Color::Green)
                    } else {
                        Style::default()
                    };
                    spans.push(Span::styled(format!("{key:X}"), style));
                }
                Line::from(spans)
            })
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Keypad "))
            .render(area, buf);
    }

    /// Innermost return address first.
    fn draw_stack(&self, area: Rect, buf: &mut Buffer) {
        let visible = usize::from(area.height.saturating_sub(2));
        let stack = self.machine.stack();

        let mut lines: Vec<Line> = stack
            .iter()
            .enumerate()
            .rev()
            .take(visible)
            .map(|(depth, address)| Line::from(format!("{depth:2}  {address:03X}")))
            .collect();
        if stack.is_empty() {
            lines.push(Line::from("-"));
        }

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(format!(" Stack {}/{} ", stack.len(), STACK_DEPTH)))
            .render(area, buf);
    }
}

/// CHIP-8 virtual machine in the terminal.
///
/// Keys 1-4, Q-R, A-F, Z-V map to CHIP-8 keys.
/// Esc or Ctrl+C exits.
#[derive(Parser)]
#[command(about)]
struct Args {
    /// CHIP-8 program to run
    rom_path: PathBuf,

    /// Instructions executed per second
    #[arg(long, default_value_t = DEFAULT_CPU_HZ)]
    cpu_hz: NonZeroU32,

    /// Screen redraws and keyboard polls per second
    #[arg(long, default_value_t = DEFAULT_IO_HZ)]
    io_hz: NonZeroU32,

    /// Seed for the random number instruction
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;

    let mut chip8 = Chip8::new();
    if let Some(seed) = args.seed {
        chip8 = chip8.with_seed(seed);
    }
    chip8
        .load(&rom)
        .context("Failed to load ROM into CHIP-8 memory")?;

    let mut runner = Chip8Runner::new(
        chip8,
        RunnerConfig {
            cpu_hz: args.cpu_hz,
            io_hz: args.io_hz,
        },
    );

    let mut frontend = TerminalFrontend {
        terminal: ratatui::init(),
        screen: FrameBuffer::new(),
        screen_text: Text::default(),
        input: TerminalInput::new(),
        throughput: Throughput::default(),
    };
    let result = runner.run(&mut frontend);
    ratatui::restore();

    if result.is_err() {
        let chip8 = runner.chip8();
        eprintln!(
            "Machine state at halt:\n{}\nLast timer tick {:?} ago",
            chip8.machine(),
            chip8.timers().since_last_decrement()
        );
    }
    result.context("Emulation halted")
}
