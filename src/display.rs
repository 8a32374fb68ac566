use crate::{DISPLAY_X, DISPLAY_Y, Grid};

/// Pixel surface the CPU draws into. Coordinates wrap around the surface edges.
pub trait Display {
    fn clear(&mut self);

    /// Returns the pixel at `(x, y)`, 0 or 1.
    fn get(&self, x: usize, y: usize) -> u8;

    /// Sets the pixel at `(x, y)`; only 0 and 1 are valid values.
    fn set(&mut self, x: usize, y: usize, bit: u8) -> Result<(), InvalidPixel>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Pixel values must be 0 or 1, got {0}")]
pub struct InvalidPixel(pub u8);

/// Headless 64x32 monochrome frame buffer.
#[derive(Clone)]
pub struct FrameBuffer {
    pixels: Grid<bool>,
    dirty: bool,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            pixels: [[false; DISPLAY_X]; DISPLAY_Y],
            dirty: true,
        }
    }

    /// Get the state of a pixel (true = on, false = off).
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.pixels[y % DISPLAY_Y][x % DISPLAY_X]
    }

    pub fn rows(&self) -> &Grid<bool> {
        &self.pixels
    }

    pub fn lit_pixels(&self) -> usize {
        self.pixels.iter().flatten().filter(|&&on| on).count()
    }

    /// Returns whether anything changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for FrameBuffer {
    fn clear(&mut self) {
        self.pixels = [[false; DISPLAY_X]; DISPLAY_Y];
        self.dirty = true;
    }

    fn get(&self, x: usize, y: usize) -> u8 {
        u8::from(self.pixel(x, y))
    }

    fn set(&mut self, x: usize, y: usize, bit: u8) -> Result<(), InvalidPixel> {
        let on = match bit {
            0 => false,
            1 => true,
            _ => return Err(InvalidPixel(bit)),
        };

        let pixel = &mut self.pixels[y % DISPLAY_Y][x % DISPLAY_X];
        if *pixel != on {
            *pixel = on;
            self.dirty = true;
        }
        Ok(())
    }
}
