use crate::display::InvalidPixel;

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
/// A type alias for a per-pixel buffer the size of the CHIP-8 display
pub type Grid<T> = [[T; DISPLAY_X]; DISPLAY_Y];

/// Result type for a single CHIP-8 CPU cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chip8Result {
    /// Continue executing instructions.
    Continue,
    /// The input source shut down while a key wait was pending; the session is over.
    Shutdown,
}

/// Fatal errors that halt a CHIP-8 session
#[derive(Debug, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    CapacityExceeded { size: usize, max_size: usize },

    #[error("Program counter out of range: {pc:#06X}")]
    ProgramCounterOutOfRange { pc: u16 },

    #[error("Stack overflow: cannot push return address {address:#06X}")]
    StackOverflow { address: u16 },

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },

    #[error(transparent)]
    InvalidPixel(#[from] InvalidPixel),
}
