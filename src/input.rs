use crate::u4;

pub const KEY_COUNT: usize = 16;

/// Source of hex keypad state.
pub trait Input {
    fn is_pressed(&self, key: u4) -> bool;

    /// Blocks until the next key press and returns it.
    ///
    /// `service` must be called on a short interval while waiting. It runs
    /// the timers and returns whether the sound timer is still active.
    /// Returns `None` only if the input source shut down before a key arrived.
    fn wait_for_next_key(&mut self, service: &mut dyn FnMut() -> bool) -> Option<u4>;
}

/// State of the 16-key hex keypad (true = pressed).
#[derive(Clone, Debug, Default)]
pub struct Keypad {
    keys: [bool; KEY_COUNT],
}

impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of a key. Returns true if this is a fresh press.
    pub fn set_key(&mut self, key: u4, pressed: bool) -> bool {
        let was_pressed = std::mem::replace(&mut self.keys[key], pressed);
        pressed && !was_pressed
    }

    pub fn is_pressed(&self, key: u4) -> bool {
        self.keys[key]
    }

    pub fn keys(&self) -> &[bool; KEY_COUNT] {
        &self.keys
    }

    pub fn release_all(&mut self) {
        self.keys = [false; KEY_COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_key_reports_fresh_presses_only() {
        let mut keypad = Keypad::new();
        assert!(keypad.set_key(u4::new(0xA), true));
        assert!(!keypad.set_key(u4::new(0xA), true));
        assert!(keypad.is_pressed(u4::new(0xA)));

        assert!(!keypad.set_key(u4::new(0xA), false));
        assert!(!keypad.is_pressed(u4::new(0xA)));
    }

    #[test]
    fn release_all_clears_every_key() {
        let mut keypad = Keypad::new();
        keypad.set_key(u4::new(1), true);
        keypad.set_key(u4::new(0xF), true);
        keypad.release_all();
        assert_eq!(keypad.keys(), &[false; KEY_COUNT]);
    }
}
