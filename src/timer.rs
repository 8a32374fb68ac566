use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::MachineState;

pub const TIMER_HZ: u32 = 60;
pub const TIMER_TIME_STEP: Duration = Duration::from_nanos(1_000_000_000 / TIMER_HZ as u64);

/// Monotonic time source, measured from an arbitrary epoch.
pub trait Clock {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        // Needs sub-millisecond precision at 1kHz
        spin_sleep::sleep(duration);
    }
}

/// Simulated time that only moves when advanced. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Decrements the delay and sound timers at 60Hz of sampled elapsed time,
/// independently of how fast instructions run.
#[derive(Debug)]
pub struct TimerDriver<C> {
    clock: C,
    last_decrement: Duration,
}

impl<C: Clock> TimerDriver<C> {
    pub fn new(clock: C) -> Self {
        let last_decrement = clock.now();
        Self {
            clock,
            last_decrement,
        }
    }

    /// Decrements both timers if more than one timer period has passed since
    /// the last decrement. Returns whether it did.
    pub fn service(&mut self, machine: &mut MachineState) -> bool {
        let now = self.clock.now();
        if now.saturating_sub(self.last_decrement) <= TIMER_TIME_STEP {
            return false;
        }

        machine.decrement_timers();
        self.last_decrement = now;
        log::trace!(
            "timers decremented: DT={} ST={}",
            machine.delay_timer,
            machine.sound_timer
        );
        true
    }

    /// Time since the timers were last decremented.
    pub fn since_last_decrement(&self) -> Duration {
        self.clock.now().saturating_sub(self.last_decrement)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_a_full_period() {
        let clock = ManualClock::new();
        let mut driver = TimerDriver::new(clock.clone());
        let mut machine = MachineState::new();
        machine.delay_timer = 5;
        machine.sound_timer = 1;

        clock.advance(TIMER_TIME_STEP);
        assert!(!driver.service(&mut machine));
        assert_eq!(machine.delay_timer, 5);

        clock.advance(Duration::from_nanos(1));
        assert!(driver.service(&mut machine));
        assert_eq!(machine.delay_timer, 4);
        assert_eq!(machine.sound_timer, 0);
    }

    #[test]
    fn decrements_at_most_once_per_call() {
        let clock = ManualClock::new();
        let mut driver = TimerDriver::new(clock.clone());
        let mut machine = MachineState::new();
        machine.delay_timer = 10;

        clock.advance(Duration::from_secs(1));
        assert!(driver.service(&mut machine));
        assert!(!driver.service(&mut machine));
        assert_eq!(machine.delay_timer, 9);
        assert_eq!(driver.since_last_decrement(), Duration::ZERO);
    }

    #[test]
    fn manual_clock_sleep_advances_shared_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.sleep(Duration::from_millis(3));
        assert_eq!(other.now(), Duration::from_millis(3));
    }
}
