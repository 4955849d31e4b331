// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Engine sessions driven against host doubles of the line.

mod common;

use pretty_assertions::assert_eq;

use common::{bits_at, line_bits, MockDivider, MockPort, MockTimer, BUFFER, ECHO, START, SYNC};
use pico_timecode::clock::base_divider;
use pico_timecode::control::{CalibrateMode, CalibrationPlan};
use pico_timecode::engine::{
    Engine, EngineConfig, EngineShared, FlashFrame, JamConfig, RunMode, RxSource, StartMode,
    Status,
};
use pico_timecode::timecode::packet::{LtcFrame, SYNC_WORD, SYNC_WORD_DOUBLED};
use pico_timecode::{EngineError, FrameRate, Timecode};

type TestEngine<'a, 't> = Engine<'a, MockPort, MockDivider, &'t mut MockTimer>;

fn tc(rate: FrameRate, df: bool, h: u8, m: u8, s: u8, f: u8) -> Timecode {
    Timecode::at(rate, df, h, m, s, f).unwrap()
}

fn run_config(start: Timecode) -> EngineConfig {
    EngineConfig {
        timecode: start,
        flash: FlashFrame::Off,
        ..EngineConfig::default()
    }
}

fn jam_config(rate: FrameRate, frames: u8) -> EngineConfig {
    EngineConfig {
        timecode: Timecode::new(rate),
        mode: StartMode::Jam,
        jam: JamConfig { frames, offset: 2 },
        ..EngineConfig::default()
    }
}

fn engine<'a, 't>(
    shared: &'a EngineShared,
    timer: &'t mut MockTimer,
    config: EngineConfig,
) -> TestEngine<'a, 't> {
    Engine::new(
        shared,
        MockPort::default(),
        MockDivider::default(),
        timer,
        config,
    )
}

/// Poll until at least `frames` echo words have been queued, draining the buffer each pass the
/// way the encoder would. Returns the echo and buffer words in order.
fn stream(engine: &mut TestEngine, frames: usize) -> (Vec<u32>, Vec<u32>) {
    let (mut echo, mut buffer) = (Vec::new(), Vec::new());
    let mut now = 0;
    while echo.len() < frames {
        engine.poll(now).unwrap();
        buffer.extend(engine.port_mut().take_tx(BUFFER));
        echo.extend(engine.port_mut().take_tx(ECHO));
        now += 1;
    }
    (echo, buffer)
}

/// Feed one RX frame and poll once.
fn receive(engine: &mut TestEngine, rx: &Timecode, now: u64) {
    engine.port_mut().feed_frame(rx.to_ltc());
    engine.poll(now).unwrap();
}

#[test]
fn run_counts_through_the_second() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let start = tc(FrameRate::Fps25, false, 10, 0, 0, 0);
    let mut engine = engine(&shared, &mut timer, run_config(start));

    engine.start(0);
    assert!(!engine.port().is_enabled(START));
    assert_eq!(shared.status(), Status::Run);
    assert_eq!(
        engine.clock().divider().value,
        base_divider(FrameRate::Fps25)
    );

    let (echo, _) = stream(&mut engine, 30);
    assert!(engine.port().is_enabled(START));
    assert_eq!(echo[0], start.to_raw());
    assert_eq!(echo[24], tc(FrameRate::Fps25, false, 10, 0, 0, 24).to_raw());
    assert_eq!(echo[25], tc(FrameRate::Fps25, false, 10, 0, 1, 0).to_raw());
}

/// Run a 29.97 drop-frame session from `start` and check each TX frame in turn.
fn assert_drop_frame_run(start: (u8, u8, u8), expected: &[(u8, u8, u8)]) {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let (m, s, f) = start;
    let mut engine = engine(
        &shared,
        &mut timer,
        run_config(tc(FrameRate::Fps29_97, true, 0, m, s, f)),
    );
    engine.start(0);

    let (echo, _) = stream(&mut engine, expected.len());
    for (k, &(m, s, f)) in expected.iter().enumerate() {
        let mut seen = Timecode::new(FrameRate::Fps29_97);
        seen.set_raw(echo[k]);
        assert_eq!(
            (seen.minutes(), seen.seconds(), seen.frames(), seen.drop_frame()),
            (m, s, f, true),
            "frame {k}"
        );
    }
}

#[test]
fn drop_frame_skips_at_the_minute() {
    assert_drop_frame_run(
        (0, 59, 28),
        &[(0, 59, 28), (0, 59, 29), (1, 0, 2), (1, 0, 3)],
    );
    assert_drop_frame_run(
        (10, 59, 28),
        &[(10, 59, 28), (10, 59, 29), (11, 0, 2), (11, 0, 3)],
    );
}

#[test]
fn drop_frame_keeps_the_tenth_minute() {
    assert_drop_frame_run(
        (9, 59, 28),
        &[(9, 59, 28), (9, 59, 29), (10, 0, 0), (10, 0, 1), (10, 0, 2)],
    );
}

#[test]
fn line_stream_is_framed_and_even() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let start = tc(FrameRate::Fps25, false, 1, 2, 3, 4);
    let mut engine = engine(&shared, &mut timer, run_config(start));
    engine.start(0);

    let (echo, buffer) = stream(&mut engine, 12);
    let bits = line_bits(&buffer);
    assert!(bits.len() >= 10 * 80);

    for (k, raw) in echo.iter().take(10).enumerate() {
        let at = k * 80;
        assert_eq!(bits_at(&bits, at, 16), SYNC_WORD as u64, "sync of frame {k}");

        let frame = LtcFrame::from_words(
            bits_at(&bits, at + 16, 32) as u32,
            bits_at(&bits, at + 48, 32) as u32,
        );
        assert!(frame.has_even_parity(), "parity of frame {k}");

        let mut decoded = Timecode::new(FrameRate::Fps25);
        decoded.set_ltc(frame).unwrap();
        assert_eq!(decoded.to_raw(), *raw);
    }
}

#[test]
fn underflow_halts_the_session() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&shared, &mut timer, EngineConfig::default());
    engine.start(0);
    engine.poll(0).unwrap();

    shared.signal_underflow();
    assert_eq!(engine.poll(1), Err(EngineError::Underflow));

    assert_eq!(engine.mode(), RunMode::Halted);
    assert!(shared.is_stopped());
    assert!(!engine.port().any_enabled());
    assert!(engine.port().parked);
    assert_eq!(shared.status(), Status::Underflow);
    assert_eq!(shared.status().to_string(), "Underflow Error");
}

#[test]
fn monitor_needs_a_receiving_session() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&shared, &mut timer, EngineConfig::default());
    engine.start(0);
    engine.poll(0).unwrap();

    shared.request_mode(RunMode::Monitor);
    engine.poll(1).unwrap();
    assert_eq!(engine.mode(), RunMode::Run);
    assert_eq!(shared.mode(), RunMode::Run);
}

#[test]
fn halt_request_stops_the_run_loop() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let config = EngineConfig {
        calval: 0.5,
        ..EngineConfig::default()
    };

    {
        let mut engine = engine(&shared, &mut timer, config);
        let mut now = 0;
        let stopper = &shared;
        let result = engine.run(
            || {
                now += 1;
                if now == 5 {
                    stopper.request_mode(RunMode::Halted);
                }
                now
            },
            |_| {},
        );
        assert_eq!(result, Ok(()));
        assert_eq!(engine.mode(), RunMode::Halted);
        assert!(!engine.port().any_enabled());
    }

    assert!(shared.is_stopped());
    assert!(!shared.stop_requested());
    assert_eq!(shared.calval(), 0.0);
    assert_eq!(timer.deadline, None);
}

#[test]
fn jam_locks_after_consistent_frames() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&shared, &mut timer, jam_config(FrameRate::Fps25, 4));

    assert_eq!(engine.mode(), RunMode::Jamming(4));
    engine.start(0);
    assert_eq!(
        engine.port_mut().take_tx(SYNC),
        [SYNC_WORD_DOUBLED]
    );

    let mut rx = tc(FrameRate::Fps25, false, 1, 0, 0, 0);
    for (i, left) in [3u8, 2, 1].into_iter().enumerate() {
        receive(&mut engine, &rx, i as u64);
        assert_eq!(engine.mode(), RunMode::Jamming(left));
        assert_eq!(shared.status().to_string(), format!("Jamming: {left}"));
        assert_eq!(shared.rx.get().to_raw(), rx.to_raw());
        rx.next_frame();
    }
    assert_eq!(engine.port().tx_len(ECHO), 0);
    assert!(!engine.port().is_enabled(START));

    receive(&mut engine, &rx, 3);
    assert_eq!(engine.mode(), RunMode::Run);
    assert!(engine.port().is_enabled(START));

    let mut expected = rx;
    expected.advance(2);
    let echo = engine.port_mut().take_tx(ECHO);
    assert_eq!(echo[0], expected.to_raw());
}

#[test]
fn skipped_frame_restarts_the_count() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&shared, &mut timer, jam_config(FrameRate::Fps25, 4));
    engine.start(0);

    let mut rx = tc(FrameRate::Fps25, false, 2, 0, 0, 0);
    receive(&mut engine, &rx, 0);
    rx.next_frame();
    receive(&mut engine, &rx, 1);
    assert_eq!(engine.mode(), RunMode::Jamming(2));

    rx.advance(2);
    receive(&mut engine, &rx, 2);
    assert_eq!(engine.mode(), RunMode::Jamming(4));

    for (i, left) in [3u8, 2, 1].into_iter().enumerate() {
        rx.next_frame();
        receive(&mut engine, &rx, 3 + i as u64);
        assert_eq!(engine.mode(), RunMode::Jamming(left));
    }
    rx.next_frame();
    receive(&mut engine, &rx, 6);
    assert_eq!(engine.mode(), RunMode::Run);
}

#[test]
fn undecodable_packet_restarts_the_count() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&shared, &mut timer, jam_config(FrameRate::Fps25, 4));
    engine.start(0);

    let rx = tc(FrameRate::Fps25, false, 3, 0, 0, 0);
    receive(&mut engine, &rx, 0);
    assert_eq!(engine.mode(), RunMode::Jamming(3));

    engine.port_mut().feed_frame(LtcFrame::from_words(0x0000_000F, 0));
    engine.poll(1).unwrap();
    assert_eq!(engine.mode(), RunMode::Jamming(4));
    assert_eq!(shared.rx.get().to_raw(), rx.to_raw());
}

#[test]
fn hold_monitor_keeps_receiving_after_lock() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let config = EngineConfig {
        hold_monitor: true,
        ..jam_config(FrameRate::Fps30, 2)
    };
    let mut engine = engine(&shared, &mut timer, config);
    engine.start(0);

    let mut rx = tc(FrameRate::Fps30, false, 0, 10, 0, 0);
    receive(&mut engine, &rx, 0);
    rx.next_frame();
    receive(&mut engine, &rx, 1);

    assert_eq!(engine.mode(), RunMode::Monitor);
    assert!(!engine.is_calibrating());
    assert_eq!(shared.status().to_string(), "RX");
}

#[test]
fn monitor_decodes_its_own_output() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let config = EngineConfig {
        mode: StartMode::Monitor,
        rx_source: RxSource::Loopback,
        ..run_config(tc(FrameRate::Fps24, false, 5, 0, 0, 0))
    };
    let mut engine = engine(&shared, &mut timer, config);
    engine.start(0);
    engine.poll(0).unwrap();
    assert_eq!(engine.mode(), RunMode::Monitor);

    let looped = tc(FrameRate::Fps24, false, 5, 0, 0, 1);
    receive(&mut engine, &looped, 1);
    assert_eq!(shared.rx.get().to_raw(), looped.to_raw());
    assert_eq!(engine.mode(), RunMode::Monitor);
}

#[test]
fn request_made_while_receiving_is_applied_next_poll() {
    static SHARED: EngineShared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&SHARED, &mut timer, jam_config(FrameRate::Fps25, 8));
    engine.start(0);

    // the other core asks for a halt while this poll is draining RX
    engine.port_mut().on_rx_level = Some(Box::new(|| SHARED.request_mode(RunMode::Halted)));
    let rx = tc(FrameRate::Fps25, false, 4, 0, 0, 0);
    receive(&mut engine, &rx, 0);
    assert_eq!(engine.mode(), RunMode::Jamming(7));
    assert_eq!(SHARED.mode(), RunMode::Jamming(7));

    engine.port_mut().on_rx_level = None;
    engine.poll(1).unwrap();
    assert_eq!(engine.mode(), RunMode::Halted);
    assert_eq!(SHARED.mode(), RunMode::Halted);
    assert!(SHARED.stop_requested());
}

#[test]
fn stale_request_does_not_reach_a_new_session() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    shared.request_mode(RunMode::Halted);

    let mut engine = engine(&shared, &mut timer, EngineConfig::default());
    engine.start(0);
    engine.poll(0).unwrap();
    assert_eq!(engine.mode(), RunMode::Run);
    assert!(!shared.stop_requested());
}

#[test]
fn start_counts_do_not_pile_up() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&shared, &mut timer, jam_config(FrameRate::Fps25, 4));
    engine.start(0);

    engine.port_mut().feed_rx(START, &[120, 80, 120]);
    engine.poll(0).unwrap();
    assert_eq!(engine.port().rx_len(START), 0);
}

/// A Jam session that learns over a short timeline.
fn calibrating_config(calibrate: CalibrateMode) -> EngineConfig {
    EngineConfig {
        calibrate,
        period_ms: 2000,
        plan: CalibrationPlan {
            settle_ms: 1000,
            observe_settle_ms: 1000,
            tick_ms: 1000,
            tight_ticks: 2,
            total_ticks: 4,
            tight_period_ms: 1000,
        },
        ..jam_config(FrameRate::Fps25, 2)
    }
}

/// Lock onto a 25 fps stream whose phase matches ours, leaving the engine in Monitor.
fn lock_aligned(engine: &mut TestEngine, shared: &EngineShared) -> Timecode {
    // RX data starts 2/3 of a bit after the TX frame
    shared.tx_stamp.publish(1_000_000);
    shared.rx_stamp.publish(1_000_333);

    let mut rx = tc(FrameRate::Fps25, false, 6, 0, 0, 0);
    receive(engine, &rx, 0);
    rx.next_frame();
    receive(engine, &rx, 40);
    assert_eq!(engine.mode(), RunMode::Monitor);
    rx
}

#[test]
fn calibration_learns_through_the_engine() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&shared, &mut timer, calibrating_config(CalibrateMode::Once));
    engine.start(0);

    let mut rx = lock_aligned(&mut engine, &shared);
    assert!(engine.is_calibrating());
    assert_eq!(shared.status(), Status::Calibrating);

    let mut learned = None;
    let mut now = 40;
    while learned.is_none() && now < 10_000 {
        now += 40;
        rx.next_frame();
        engine.port_mut().feed_frame(rx.to_ltc());
        learned = engine.poll(now).unwrap();
    }

    let learned = learned.expect("no value learned");
    assert_eq!(learned.rate, FrameRate::Fps25);
    assert!(!learned.drop_frame);
    assert_eq!(learned.period_ms, 2000);
    assert!(learned.calval.abs() < 0.01, "{}", learned.calval);

    // without hold_monitor the session drops back to Run once learning is done
    engine.poll(now + 1).unwrap();
    assert_eq!(engine.mode(), RunMode::Run);
    assert!(!engine.is_calibrating());
}

#[test]
fn run_request_discards_learning() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&shared, &mut timer, calibrating_config(CalibrateMode::Always));
    engine.start(0);
    let mut rx = lock_aligned(&mut engine, &shared);

    let mut now = 40;
    while now < 1500 {
        now += 40;
        rx.next_frame();
        engine.port_mut().feed_frame(rx.to_ltc());
        assert_eq!(engine.poll(now), Ok(None));
    }
    assert!(engine.is_calibrating());

    shared.request_mode(RunMode::Run);
    engine.poll(now + 1).unwrap();
    assert_eq!(engine.mode(), RunMode::Run);
    assert!(!engine.is_calibrating());
    assert_eq!(shared.status(), Status::Run);

    // well past the end of the timeline, nothing is learned
    while now < 10_000 {
        now += 40;
        rx.next_frame();
        engine.port_mut().feed_frame(rx.to_ltc());
        assert_eq!(engine.poll(now), Ok(None));
    }
}

#[test]
fn halt_during_learning_never_persists() {
    let shared = EngineShared::new();
    let mut timer = MockTimer::default();
    let mut engine = engine(&shared, &mut timer, calibrating_config(CalibrateMode::Once));
    engine.start(0);
    let mut rx = lock_aligned(&mut engine, &shared);

    // the run loop, persisting whatever is learned
    let mut persisted = Vec::new();
    let mut now = 40;
    while !shared.stop_requested() {
        now += 40;
        assert!(now < 10_000, "halt never applied");
        if now == 2000 {
            assert!(engine.is_calibrating());
            shared.request_mode(RunMode::Halted);
        }
        rx.next_frame();
        engine.port_mut().feed_frame(rx.to_ltc());
        if let Some(learned) = engine.poll(now).unwrap() {
            persisted.push(learned);
        }
    }
    engine.shutdown();

    assert!(persisted.is_empty());
    assert_eq!(engine.mode(), RunMode::Halted);
    assert!(!engine.is_calibrating());
    assert!(shared.is_stopped());

    // nothing is picked up later either
    assert_eq!(engine.poll(5000), Ok(None));
}
