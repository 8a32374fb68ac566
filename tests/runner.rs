mod common;

use std::{num::NonZeroU32, time::Duration};

use chip8_vm::{Chip8Runner, Clock, RunnerConfig};
use common::{TestHost, chip8_with};

#[test]
fn runs_about_1000_instructions_and_60_io_services_per_second() {
    // Infinite loop at 0x200
    let (chip8, clock) = chip8_with(&[0x1200]);
    let mut runner = Chip8Runner::new(chip8, RunnerConfig::default());
    let mut host = TestHost::new(clock.clone(), 60);

    runner.run(&mut host).unwrap();

    assert_eq!(host.polls, 60);
    assert_eq!(host.presents, 59);
    let elapsed = clock.now();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_millis(1050));
    let executed = runner.total_instructions();
    assert!((1000..=1050).contains(&executed), "{executed} instructions");

    let last = host.reports.last().unwrap();
    assert!((last.frames_per_second - 60.0).abs() < 3.0);
    assert!((last.instructions_per_second - 1000.0).abs() < 60.0);
    assert_eq!(last.total_instructions, executed);
}

#[test]
fn executes_at_most_one_instruction_per_iteration() {
    let (chip8, clock) = chip8_with(&[0x1200]);
    let mut runner = Chip8Runner::new(chip8, RunnerConfig::default());
    let mut host = TestHost::new(clock.clone(), usize::MAX);

    // Fall far behind schedule
    runner.iterate(&mut host).unwrap();
    clock.advance(Duration::from_millis(500));

    for _ in 0..10 {
        let before = runner.total_instructions();
        assert!(runner.iterate(&mut host).unwrap());
        assert_eq!(runner.total_instructions(), before + 1);
    }
}

#[test]
fn instruction_rate_is_configurable() {
    let (chip8, clock) = chip8_with(&[0x1200]);
    let config = RunnerConfig {
        cpu_hz: NonZeroU32::new(200).unwrap(),
        io_hz: NonZeroU32::new(10).unwrap(),
    };
    let mut runner = Chip8Runner::new(chip8, config);
    let mut host = TestHost::new(clock.clone(), 10);

    runner.run(&mut host).unwrap();

    assert_eq!(host.polls, 10);
    let executed = runner.total_instructions();
    assert!((200..=210).contains(&executed), "{executed} instructions");
}

#[test]
fn timers_decay_in_real_time_while_running() {
    // DT = ST = 30, then spin
    let (chip8, clock) = chip8_with(&[0x601E, 0xF015, 0xF018, 0x1206]);
    let mut runner = Chip8Runner::new(chip8, RunnerConfig::default());
    let mut host = TestHost::new(clock, 15);

    runner.run(&mut host).unwrap();

    // 15 services at ~17ms is ~255ms, about 15 timer periods
    let m = runner.chip8().machine();
    let dt = m.delay_timer();
    assert!((13..=17).contains(&dt), "DT = {dt}");
    assert_eq!(m.sound_timer(), dt);
    // The final poll ends the session before anything is presented
    assert!(host.last_sound_timer > dt);
}

#[test]
fn key_wait_blocks_execution_but_not_timers() {
    // DT = 100, wait for a key into V1, then spin
    let (chip8, clock) = chip8_with(&[0x6064, 0xF015, 0xF10A, 0x1206]);
    let mut runner = Chip8Runner::new(chip8, RunnerConfig::default());
    let mut host = TestHost::new(clock.clone(), 2);
    host.input = common::ScriptedInput::new(clock.clone()).then_key(50, 0xE);

    runner.run(&mut host).unwrap();

    let m = runner.chip8().machine();
    assert_eq!(m.registers()[1], 0xE);
    // 50 polls of 10ms span 500ms; the timer drops once every other poll
    let dt = m.delay_timer();
    assert!((70..=76).contains(&dt), "DT = {dt}");
}

#[test]
fn cancelled_key_wait_ends_the_session() {
    let (chip8, clock) = chip8_with(&[0xF10A]);
    let mut runner = Chip8Runner::new(chip8, RunnerConfig::default());
    let mut host = TestHost::new(clock, usize::MAX);

    runner.run(&mut host).unwrap();

    assert_eq!(runner.total_instructions(), 0);
    assert_eq!(runner.chip8().machine().pc(), 0x200);
}

#[test]
fn fatal_errors_propagate() {
    let (chip8, clock) = chip8_with(&[0x00EE]);
    let mut runner = Chip8Runner::new(chip8, RunnerConfig::default());
    let mut host = TestHost::new(clock, usize::MAX);

    let err = runner.run(&mut host).unwrap_err();
    assert!(matches!(
        err,
        chip8_vm::RunError::Chip8(chip8_vm::Chip8Error::StackUnderflow)
    ));
}
