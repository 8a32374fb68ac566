use rand::Rng;

use crate::{
    Chip8, Chip8Error, Clock, Display, FONT_GLYPH_HEIGHT, FONT_START_ADDRESS, Input, Opcode,
    OpcodeALU, u4, u12,
};

const SPRITE_WIDTH: usize = 8;

/// What the caller does with the program counter after an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Advance past the instruction.
    Next,
    /// The instruction set the program counter itself.
    Jump,
    /// The input source shut down during a key wait; nothing was changed.
    Halt,
}

impl<C: Clock> Chip8<C> {
    /// Applies one decoded instruction. Skips are applied here; the default
    /// advance past the instruction itself is left to the caller.
    pub fn execute<D, I>(
        &mut self,
        opcode: Opcode,
        display: &mut D,
        input: &mut I,
    ) -> Result<Flow, Chip8Error>
    where
        D: Display + ?Sized,
        I: Input + ?Sized,
    {
        let m = &mut self.machine;

        match opcode {
            Opcode::ClearDisplay => {
                display.clear();
            }
            Opcode::Sys { nnn } => {
                log::trace!("ignoring SYS {nnn:#05X} at {:#05X}", m.pc);
            }
            Opcode::Jump { nnn } => {
                m.pc = nnn.into();
                return Ok(Flow::Jump);
            }
            Opcode::JumpWithOffset { nnn } => {
                m.pc = u16::from(nnn) + u16::from(m.v[0]);
                return Ok(Flow::Jump);
            }
            Opcode::Call { nnn } => {
                m.push(m.pc.wrapping_add(2))?;
                m.pc = nnn.into();
                return Ok(Flow::Jump);
            }
            Opcode::Return => {
                m.pc = m.pop()?;
                return Ok(Flow::Jump);
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                if m.v[x] == nn {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                if m.v[x] != nn {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegEqualReg { x, y } => {
                if m.v[x] == m.v[y] {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                if m.v[x] != m.v[y] {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SetRegImm { x, nn } => {
                m.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                m.v[x] = m.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                m.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                m.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                m.i = m.i.wrapping_add(m.v[x].into());
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(display, x, y, n)?;
            }
            Opcode::SkipIfPressed { x } => {
                if input.is_pressed(u4::from_masked(m.v[x])) {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SkipIfNotPressed { x } => {
                if !input.is_pressed(u4::from_masked(m.v[x])) {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::WaitForKey { x } => {
                return Ok(self.execute_wait_for_key(input, x));
            }
            Opcode::ReadDelayTimer { x } => {
                m.v[x] = m.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                m.delay_timer = m.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                m.sound_timer = m.v[x];
            }
            Opcode::FontChar { x } => {
                let glyph = FONT_START_ADDRESS + usize::from(m.v[x]) * FONT_GLYPH_HEIGHT;
                m.i = u12::from_masked(glyph as u16);
            }
            Opcode::BCD { x } => {
                let value = m.v[x];
                let i = usize::from(m.i);
                m.write(i, value / 100)?;
                m.write(i + 1, (value / 10) % 10)?;
                m.write(i + 2, value % 10)?;
            }
            Opcode::StoreRegs { x } => {
                let i = usize::from(m.i);
                for reg_index in 0..=usize::from(x) {
                    m.write(i + reg_index, m.v[reg_index])?;
                }
            }
            Opcode::LoadRegs { x } => {
                let i = usize::from(m.i);
                for reg_index in 0..=usize::from(x) {
                    m.v[reg_index] = m.read(i + reg_index)?;
                }
            }
            Opcode::Unknown(opcode) => {
                log::warn!("unknown opcode {opcode:#06X} at {:#05X}, skipping", m.pc);
                self.decode_misses += 1;
                self.last_decode_miss = Some(opcode);
            }
        };

        Ok(Flow::Next)
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        let v = &mut self.machine.v;

        // The flag is written last so that it wins when x is VF
        match op {
            OpcodeALU::Set => v[x] = v[y],
            OpcodeALU::Or => v[x] |= v[y],
            OpcodeALU::And => v[x] &= v[y],
            OpcodeALU::Xor => v[x] ^= v[y],
            OpcodeALU::Add => {
                let (res, overflow) = v[x].overflowing_add(v[y]);
                v[x] = res;
                v[0xF] = u8::from(overflow);
            }
            OpcodeALU::Sub => {
                let not_borrow = v[x] > v[y];
                v[x] = v[x].wrapping_sub(v[y]);
                v[0xF] = u8::from(not_borrow);
            }
            OpcodeALU::SubReverse => {
                let not_borrow = v[y] > v[x];
                v[x] = v[y].wrapping_sub(v[x]);
                v[0xF] = u8::from(not_borrow);
            }
            OpcodeALU::ShiftRight => {
                let lsb = v[x] & 1;
                v[x] >>= 1;
                v[0xF] = lsb;
            }
            OpcodeALU::ShiftLeft => {
                let msb = v[x] >> 7;
                v[x] <<= 1;
                v[0xF] = msb;
            }
        }
    }

    fn execute_draw<D>(&mut self, display: &mut D, x: u4, y: u4, n: u4) -> Result<(), Chip8Error>
    where
        D: Display + ?Sized,
    {
        let m = &mut self.machine;
        let x_pos = usize::from(m.v[x]);
        let y_pos = usize::from(m.v[y]);

        // Pixels are read-modify-written one at a time, rows top first, so
        // overlapping wrapped pixels within one sprite see earlier writes
        let mut any_erased = false;
        for row in 0..usize::from(n) {
            let sprite_byte = m.read(usize::from(m.i) + row)?;

            for col in 0..SPRITE_WIDTH {
                let bit = (sprite_byte >> (7 - col)) & 1;
                let (px, py) = (x_pos + col, y_pos + row);
                let current = display.get(px, py);

                if current & bit == 1 {
                    any_erased = true;
                }
                display.set(px, py, current ^ bit)?;
            }
        }

        m.v[0xF] = u8::from(any_erased);
        Ok(())
    }

    fn execute_wait_for_key<I>(&mut self, input: &mut I, x: u4) -> Flow
    where
        I: Input + ?Sized,
    {
        log::debug!("waiting for key into V{x:X}");

        // Timers keep running in real time while the program is blocked
        let key = {
            let Self {
                machine, timers, ..
            } = self;
            input.wait_for_next_key(&mut || {
                timers.service(machine);
                machine.should_beep()
            })
        };

        match key {
            Some(key) => {
                log::debug!("key {key:X} pressed");
                self.machine.v[x] = key.get();
                Flow::Next
            }
            None => Flow::Halt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameBuffer, ManualClock};

    struct NoKeys;

    impl Input for NoKeys {
        fn is_pressed(&self, _key: u4) -> bool {
            false
        }

        fn wait_for_next_key(&mut self, _service: &mut dyn FnMut() -> bool) -> Option<u4> {
            None
        }
    }

    fn chip8() -> Chip8<ManualClock> {
        Chip8::with_clock(ManualClock::new()).with_seed(7)
    }

    fn run(chip8: &mut Chip8<ManualClock>, raw: u16) -> Flow {
        chip8
            .execute(Opcode::decode(raw), &mut FrameBuffer::new(), &mut NoKeys)
            .unwrap()
    }

    #[test]
    fn add_sets_carry_on_overflow() {
        let mut chip8 = chip8();
        chip8.machine.v[1] = 0xF0;
        chip8.machine.v[2] = 0x20;
        run(&mut chip8, 0x8124);
        assert_eq!(chip8.machine.v[1], 0x10);
        assert_eq!(chip8.machine.v[0xF], 1);

        run(&mut chip8, 0x8124);
        assert_eq!(chip8.machine.v[1], 0x30);
        assert_eq!(chip8.machine.v[0xF], 0);
    }

    #[test]
    fn sub_flag_is_strict_greater_than() {
        let mut chip8 = chip8();
        chip8.machine.v[1] = 5;
        chip8.machine.v[2] = 5;
        run(&mut chip8, 0x8125);
        assert_eq!(chip8.machine.v[1], 0);
        assert_eq!(chip8.machine.v[0xF], 0);

        chip8.machine.v[1] = 3;
        run(&mut chip8, 0x8127);
        assert_eq!(chip8.machine.v[1], 2);
        assert_eq!(chip8.machine.v[0xF], 1);
    }

    #[test]
    fn shifts_operate_on_vx_and_report_shifted_bit() {
        let mut chip8 = chip8();
        chip8.machine.v[3] = 0b1000_0001;
        chip8.machine.v[4] = 0xFF;
        run(&mut chip8, 0x8346);
        assert_eq!(chip8.machine.v[3], 0b0100_0000);
        assert_eq!(chip8.machine.v[0xF], 1);

        run(&mut chip8, 0x834E);
        assert_eq!(chip8.machine.v[3], 0b1000_0000);
        assert_eq!(chip8.machine.v[0xF], 0);

        run(&mut chip8, 0x834E);
        assert_eq!(chip8.machine.v[3], 0);
        assert_eq!(chip8.machine.v[0xF], 1);
    }

    #[test]
    fn flag_overwrites_result_when_target_is_vf() {
        let mut chip8 = chip8();
        chip8.machine.v[0xF] = 0xFF;
        chip8.machine.v[0] = 0x01;
        run(&mut chip8, 0x8F04);
        assert_eq!(chip8.machine.v[0xF], 1);
    }

    #[test]
    fn bitwise_ops_leave_flag_alone() {
        let mut chip8 = chip8();
        chip8.machine.v[0xF] = 0x42;
        chip8.machine.v[0] = 0b1100;
        chip8.machine.v[1] = 0b1010;
        run(&mut chip8, 0x8011);
        assert_eq!(chip8.machine.v[0], 0b1110);
        run(&mut chip8, 0x8012);
        assert_eq!(chip8.machine.v[0], 0b1010);
        run(&mut chip8, 0x8013);
        assert_eq!(chip8.machine.v[0], 0);
        assert_eq!(chip8.machine.v[0xF], 0x42);
    }

    #[test]
    fn random_is_masked() {
        let mut chip8 = chip8();
        for _ in 0..32 {
            run(&mut chip8, 0xC50F);
            assert_eq!(chip8.machine.v[5] & 0xF0, 0);
        }
    }

    #[test]
    fn index_add_wraps_at_12_bits() {
        let mut chip8 = chip8();
        chip8.machine.i = u12::new(0xFFF);
        chip8.machine.v[2] = 2;
        run(&mut chip8, 0xF21E);
        assert_eq!(chip8.machine.i, u12::new(0x001));
    }

    #[test]
    fn font_char_points_at_glyph() {
        let mut chip8 = chip8();
        chip8.machine.v[6] = 0xA;
        run(&mut chip8, 0xF629);
        assert_eq!(chip8.machine.i, u12::new(50));
        assert_eq!(chip8.machine.read(50).unwrap(), 0xF0);
    }

    #[test]
    fn bcd_near_memory_end_fails() {
        let mut chip8 = chip8();
        chip8.machine.i = u12::new(0xFFE);
        let result = chip8.execute(Opcode::decode(0xF033), &mut FrameBuffer::new(), &mut NoKeys);
        assert!(matches!(
            result,
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        ));
    }

    #[test]
    fn jumps_suppress_advance() {
        let mut chip8 = chip8();
        assert_eq!(run(&mut chip8, 0x1300), Flow::Jump);
        assert_eq!(chip8.machine.pc, 0x300);

        chip8.machine.v[0] = 0x10;
        assert_eq!(run(&mut chip8, 0xB300), Flow::Jump);
        assert_eq!(chip8.machine.pc, 0x310);

        assert_eq!(run(&mut chip8, 0x6000), Flow::Next);
    }

    #[test]
    fn unknown_opcode_is_recorded() {
        let mut chip8 = chip8();
        assert_eq!(run(&mut chip8, 0xFFFF), Flow::Next);
        assert_eq!(chip8.decode_misses(), 1);
        assert_eq!(chip8.last_decode_miss(), Some(0xFFFF));
    }

    #[test]
    fn closed_input_halts_key_wait() {
        let mut chip8 = chip8();
        chip8.machine.v[2] = 9;
        assert_eq!(run(&mut chip8, 0xF20A), Flow::Halt);
        assert_eq!(chip8.machine.v[2], 9);
    }
}
