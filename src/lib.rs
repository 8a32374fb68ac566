//! A CHIP-8 virtual machine: machine state, instruction decode and dispatch,
//! 60Hz timers and a dual-rate scheduler. Pixel output and keyboard input are
//! supplied by the caller through the [`Display`] and [`Input`] traits.

mod chip8;
mod display;
mod execute;
mod font;
mod input;
mod machine;
mod nibble;
mod opcode;
mod runner;
mod timer;
mod types;

pub use chip8::*;
pub use display::*;
pub use execute::Flow;
pub use font::*;
pub use input::*;
pub use machine::*;
pub use nibble::*;
pub use opcode::*;
pub use runner::*;
pub use timer::*;
pub use types::*;
