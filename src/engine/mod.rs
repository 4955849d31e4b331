// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Timecode Engine
//!
//! The real-time loop that keeps the line state machines fed. One [`Engine`] is one session:
//! it is built from an [`EngineConfig`], started, polled until a stop is requested, and shut
//! down. A new mode means a new engine with a fresh [`ChannelSet`].
//!
//! Each [`Engine::poll`]:
//!
//! 1. Halts on a TX underflow flagged by the buffer interrupt.
//! 2. Drains complete RX packets, feeding the Jam lock or the phase corrector.
//! 3. Refills the TX queues while running or monitoring.
//! 4. Services the dither deadline and the calibration tick.
//!
//! State the monitor core reads lives in [`EngineShared`], which is `const` constructible so
//! the firmware can keep it in a `static`.
//!
//! ## Modules
//!
//! - [`channel`] - Line channels and the [`LinePort`] trait.
//! - [`stream`] - TX refill and blink timing.
//! - [`jam`] - Jam lock validation.

pub mod channel;
pub mod jam;
pub mod stream;

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use log::{error, info, warn};

use crate::clock::{ClockDivider, MicroAdjust, OneShot, DEFAULT_PERIOD_MS};
use crate::control::{phase_error, CalibrateMode, CalibrationPlan, Learned, PhaseCorrector, Tick};
use crate::error::EngineError;
use crate::timecode::packet::{LtcFrame, SYNC_WORD_DOUBLED};
use crate::timecode::shared::{read_stable, Published, SharedTimecode};
use crate::timecode::{FrameRate, Timecode};

pub use channel::{Channel, ChannelKind, ChannelSet, LinePort, RxSource, StartMode, StartTrigger};
pub use jam::{JamConfig, JamLock, JamStatus};
pub use stream::{FlashFrame, TxProducer, BLINK_PRELOAD, FRAME_MARKS, PRELOAD_MARKS};

/// Engine run state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunMode {
    Halted,
    Run,
    Monitor,
    /// Waiting for this many more consistent RX frames.
    Jamming(u8),
}

impl RunMode {
    /// Whether TX frames are produced in this mode.
    pub fn transmits(self) -> bool {
        matches!(self, RunMode::Run | RunMode::Monitor)
    }
}

/// Everything needed to build a session.
#[derive(Copy, Clone, Debug)]
pub struct EngineConfig {
    /// Starting TX value. Its rate, drop-frame and user bits apply to the session.
    pub timecode: Timecode,
    pub mode: StartMode,
    /// Stay in Monitor after a Jam instead of returning to Run.
    pub hold_monitor: bool,
    pub flash: FlashFrame,
    pub jam: JamConfig,
    /// Calibration value applied from the start.
    pub calval: f32,
    pub period_ms: u32,
    pub calibrate: CalibrateMode,
    pub plan: CalibrationPlan,
    pub rx_source: RxSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timecode: Timecode::new(FrameRate::Fps30),
            mode: StartMode::Run,
            hold_monitor: false,
            flash: FlashFrame::Frame(11),
            jam: JamConfig::default(),
            calval: 0.0,
            period_ms: DEFAULT_PERIOD_MS,
            calibrate: CalibrateMode::Off,
            plan: CalibrationPlan::default(),
            rx_source: RxSource::External,
        }
    }
}

/// State shared between the engine, the monitor and interrupt handlers.
///
/// Interrupt handlers only use [`Published`] words and the atomic flags.
pub struct EngineShared {
    pub tx: SharedTimecode,
    pub rx: SharedTimecode,
    mode: Mutex<Cell<RunMode>>,
    /// Pending operator request, taken by the engine on its next poll.
    request: Mutex<Cell<Option<RunMode>>>,
    calval: Mutex<Cell<f32>>,

    stop: AtomicBool,
    stopped: AtomicBool,
    underflow: AtomicBool,
    calibrating: AtomicBool,

    /// Raw value of the frame now on the line.
    pub tx_echo: Published,
    /// Microsecond stamp of the last TX frame start.
    pub tx_stamp: Published,
    /// Microsecond stamp of the last RX data start.
    pub rx_stamp: Published,
}

impl Default for EngineShared {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineShared {
    pub const fn new() -> Self {
        Self {
            tx: SharedTimecode::new(FrameRate::Fps30),
            rx: SharedTimecode::new(FrameRate::Fps30),
            mode: Mutex::new(Cell::new(RunMode::Halted)),
            request: Mutex::new(Cell::new(None)),
            calval: Mutex::new(Cell::new(0.0)),
            stop: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
            underflow: AtomicBool::new(false),
            calibrating: AtomicBool::new(false),
            tx_echo: Published::new(0),
            tx_stamp: Published::new(0),
            rx_stamp: Published::new(0),
        }
    }

    /// Mode the engine is in. Only the engine writes it.
    pub fn mode(&self) -> RunMode {
        critical_section::with(|cs| self.mode.borrow(cs).get())
    }

    fn set_mode(&self, mode: RunMode) {
        critical_section::with(|cs| self.mode.borrow(cs).set(mode));
    }

    /// Request a mode from the monitor side. The engine applies it on its next poll; a later
    /// request replaces one not yet taken.
    pub fn request_mode(&self, mode: RunMode) {
        critical_section::with(|cs| self.request.borrow(cs).set(Some(mode)));
    }

    fn take_request(&self) -> Option<RunMode> {
        critical_section::with(|cs| self.request.borrow(cs).take())
    }

    /// Calibration value currently applied.
    pub fn calval(&self) -> f32 {
        critical_section::with(|cs| self.calval.borrow(cs).get())
    }

    fn set_calval(&self, calval: f32) {
        critical_section::with(|cs| self.calval.borrow(cs).set(calval));
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Called from the buffer interrupt when the TX queue ran dry.
    pub fn signal_underflow(&self) {
        self.underflow.store(true, Ordering::Release);
        self.stop.store(true, Ordering::Release);
    }

    pub fn underflowed(&self) -> bool {
        self.underflow.load(Ordering::Acquire)
    }

    /// Operator-facing status line.
    pub fn status(&self) -> Status {
        if self.underflowed() {
            return Status::Underflow;
        }
        match self.mode() {
            RunMode::Halted => Status::Halted,
            RunMode::Run => Status::Run,
            RunMode::Monitor if self.calibrating.load(Ordering::Acquire) => Status::Calibrating,
            RunMode::Monitor => Status::Monitor,
            RunMode::Jamming(n) => Status::Jamming(n),
        }
    }
}

/// What the monitor shows for the engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Halted,
    Run,
    Monitor,
    /// Monitoring while learning a calibration value.
    Calibrating,
    Jamming(u8),
    Underflow,
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Status::Halted => f.write_str("Halted"),
            Status::Run => f.write_str("Run"),
            Status::Monitor => f.write_str("RX"),
            Status::Calibrating => f.write_str("CAL"),
            Status::Jamming(n) => write!(f, "Jamming: {n}"),
            Status::Underflow => f.write_str("Underflow Error"),
        }
    }
}

/// One timecode session.
pub struct Engine<'a, P, D, T> {
    shared: &'a EngineShared,
    port: P,
    clock: MicroAdjust<D, T>,
    channels: ChannelSet,
    producer: TxProducer,
    corrector: PhaseCorrector,
    jam: Option<JamLock>,
    config: EngineConfig,

    mode: RunMode,
    tx_started: bool,
    rx_frames: u32,
    rx_rejected: u32,
}

impl<'a, P, D, T> Engine<'a, P, D, T>
where
    P: LinePort,
    D: ClockDivider,
    T: OneShot,
{
    /// Build a session. Nothing runs until [`start`](Self::start).
    pub fn new(
        shared: &'a EngineShared,
        port: P,
        divider: D,
        timer: T,
        mut config: EngineConfig,
    ) -> Self {
        if config.mode == StartMode::Monitor {
            config.hold_monitor = true;
        }

        let tc = config.timecode;
        shared.tx.set(tc);
        shared.rx.update(|rx| {
            *rx = Timecode::new(tc.rate());
            // tc already holds a valid rate/drop-frame pair
            let _ = rx.set_fps_df(tc.rate(), tc.drop_frame());
        });

        let (mode, jam) = match config.mode {
            StartMode::Run => (RunMode::Run, None),
            StartMode::Monitor => (RunMode::Monitor, None),
            StartMode::Jam => (
                RunMode::Jamming(config.jam.frames.max(1)),
                Some(JamLock::new(config.jam.frames, tc.drop_frame())),
            ),
        };
        shared.set_mode(mode);
        // a request left over from the last session does not carry into this one
        let _ = shared.take_request();

        Self {
            shared,
            port,
            clock: MicroAdjust::new(divider, timer),
            channels: ChannelSet::for_mode(config.mode, config.rx_source),
            producer: TxProducer::new(config.flash),
            corrector: PhaseCorrector::new(config.plan, config.period_ms),
            jam,
            config,
            mode,
            tx_started: false,
            rx_frames: 0,
            rx_rejected: 0,
        }
    }

    /// Preload the channels, enable everything except `Start`, and start the clock trim.
    pub fn start(&mut self, now_ms: u64) {
        self.shared.stop.store(false, Ordering::Release);
        self.shared.underflow.store(false, Ordering::Release);
        self.shared.stopped.store(false, Ordering::Release);

        if let Some(sync) = self.channels.sync() {
            self.port.push(&sync, SYNC_WORD_DOUBLED);
        }
        if let Some(blink) = self.channels.blink() {
            for word in BLINK_PRELOAD {
                self.port.push(&blink, word);
            }
        }

        for ch in self.channels.iter() {
            if !matches!(ch.kind, ChannelKind::Start(_)) {
                self.port.set_enabled(ch, true);
            }
        }

        let rate = self.rate();
        self.clock.start(rate);
        self.clock
            .request(self.config.calval, Some(self.config.period_ms), now_ms);
        self.shared.set_calval(self.clock.calval());

        if self.mode == RunMode::Monitor {
            self.corrector
                .begin(now_ms, rate, self.config.timecode.drop_frame(), false);
        }

        info!(
            "engine start: {:?} at {} {} calval {:.3}",
            self.mode,
            rate,
            self.config.timecode,
            self.config.calval
        );
    }

    /// One pass of the real-time loop. Returns a learned calibration when a session completes.
    pub fn poll(&mut self, now_ms: u64) -> Result<Option<Learned>, EngineError> {
        if self.shared.underflowed() {
            error!("Underflow Error");
            self.set_mode(RunMode::Halted);
            self.shutdown();
            return Err(EngineError::Underflow);
        }

        self.apply_requested_mode(now_ms);
        self.drain_rx(now_ms);

        if self.mode.transmits() {
            let frames = self
                .producer
                .refill(&mut self.port, &self.channels, &self.shared.tx);
            if frames > 0 && !self.tx_started {
                if let Some(start) = self.channels.start() {
                    self.port.set_enabled(&start, true);
                }
                self.tx_started = true;
            }
        }

        self.clock.service(now_ms);

        let mut learned = None;
        if self.mode == RunMode::Monitor {
            match self.corrector.tick(now_ms, self.clock.target()) {
                Tick::Adjust(c) => self.clock.request(c.calval, Some(c.period_ms), now_ms),
                Tick::Learned(l) => {
                    self.clock.request(l.calval, Some(l.period_ms), now_ms);
                    learned = Some(l);
                }
                Tick::Observed(_) | Tick::Wait => {}
            }

            if !self.config.hold_monitor && !self.corrector.is_learning() {
                self.corrector.cancel();
                self.set_mode(RunMode::Run);
            }
        }

        self.shared.set_calval(self.clock.calval());
        self.shared
            .calibrating
            .store(self.corrector.is_learning(), Ordering::Release);
        Ok(learned)
    }

    /// Poll until a stop is requested, then shut down.
    pub fn run(
        &mut self,
        mut now_ms: impl FnMut() -> u64,
        mut on_learned: impl FnMut(Learned),
    ) -> Result<(), EngineError> {
        self.start(now_ms());
        while !self.shared.stop_requested() {
            if let Some(learned) = self.poll(now_ms())? {
                on_learned(learned);
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Disable every channel, park the outputs and cancel the clock trim.
    pub fn shutdown(&mut self) {
        for ch in self.channels.iter() {
            self.port.set_enabled(ch, false);
        }
        self.port.park();

        self.clock.stop();
        self.corrector.cancel();
        self.shared.set_calval(0.0);
        self.shared.calibrating.store(false, Ordering::Release);
        self.shared.tx.update(|tc| tc.clock_flag = false);

        self.shared.stop.store(false, Ordering::Release);
        self.shared.stopped.store(true, Ordering::Release);
        info!(
            "engine stopped: {} frames decoded, {} rejected, {} dither deadlines missed",
            self.rx_frames,
            self.rx_rejected,
            self.clock.missed()
        );
    }

    fn rate(&self) -> FrameRate {
        self.config.timecode.rate()
    }

    fn set_mode(&mut self, mode: RunMode) {
        if mode != self.mode {
            if !matches!((self.mode, mode), (RunMode::Jamming(_), RunMode::Jamming(_))) {
                info!("mode {:?} -> {:?}", self.mode, mode);
            }
            self.mode = mode;
        }
        self.shared.set_mode(mode);
    }

    /// Pick up a mode change made through [`EngineShared::request_mode`].
    fn apply_requested_mode(&mut self, now_ms: u64) {
        let Some(requested) = self.shared.take_request() else {
            return;
        };
        if requested == self.mode {
            return;
        }

        match requested {
            RunMode::Run => {
                self.corrector.cancel();
                self.config.hold_monitor = false;
                self.jam = None;
                self.set_mode(RunMode::Run);
            }
            RunMode::Monitor if self.channels.has_rx() && self.tx_started => {
                self.jam = None;
                self.config.hold_monitor = true;
                self.corrector
                    .begin(now_ms, self.rate(), self.config.timecode.drop_frame(), false);
                self.set_mode(RunMode::Monitor);
            }
            RunMode::Halted => {
                self.corrector.cancel();
                self.set_mode(RunMode::Halted);
                self.shared.request_stop();
            }
            _ => warn!("mode {:?} needs a new session", requested),
        }
    }

    fn drain_rx(&mut self, now_ms: u64) {
        let Some(sync) = self.channels.sync() else {
            return;
        };

        // the start program pushes a pulse count per edge; only its IRQ is used
        if let Some(start) = self.channels.start() {
            while self.port.rx_level(&start) > 0 && self.port.pop(&start).is_some() {}
        }

        while self.port.rx_level(&sync) >= 2 {
            let (Some(low), Some(high)) = (self.port.pop(&sync), self.port.pop(&sync)) else {
                break;
            };
            let frame = LtcFrame::from_words(low, high);

            let decoded = self.shared.rx.update(|rx| rx.set_ltc(frame).map(|_| *rx));
            match decoded {
                Ok(rx) => {
                    self.rx_frames = self.rx_frames.wrapping_add(1);
                    self.on_rx_frame(&rx, now_ms);
                }
                Err(e) => {
                    self.rx_rejected = self.rx_rejected.wrapping_add(1);
                    warn!("rx packet {:08x} {:08x}: {}", low, high, e);
                    if let Some(jam) = self.jam.as_mut() {
                        jam.reject();
                        let n = jam.remaining();
                        self.set_mode(RunMode::Jamming(n));
                    }
                }
            }
        }
    }

    fn on_rx_frame(&mut self, rx: &Timecode, now_ms: u64) {
        match self.mode {
            RunMode::Jamming(_) => {
                let Some(jam) = self.jam.as_mut() else {
                    return;
                };
                match jam.feed(rx) {
                    JamStatus::Counting(n) => self.set_mode(RunMode::Jamming(n)),
                    JamStatus::Restarted => {
                        let n = jam.remaining();
                        self.set_mode(RunMode::Jamming(n));
                    }
                    JamStatus::Locked => self.lock_to(rx, now_ms),
                }
            }
            RunMode::Monitor => {
                let (tx_us, rx_us) =
                    read_stable(|| (self.shared.tx_stamp.load(), self.shared.rx_stamp.load()));
                if let Some(d) = phase_error(rx_us, tx_us, self.rate()) {
                    self.corrector.sample(d, now_ms);
                }
            }
            RunMode::Run | RunMode::Halted => {}
        }
    }

    /// Take over the RX value plus the pipeline offset and enter Monitor.
    fn lock_to(&mut self, rx: &Timecode, now_ms: u64) {
        let offset = self.config.jam.offset as u32;
        let tx = self.shared.tx.update(|tc| {
            tc.set_raw(rx.to_raw());
            tc.advance(offset);
            tc.clock_flag = rx.clock_flag;
            *tc
        });
        self.jam = None;
        info!("jam locked to {}, TX starts at {}", rx, tx);

        let learning = self.config.calibrate != CalibrateMode::Off;
        self.set_mode(RunMode::Monitor);
        if learning || self.config.hold_monitor {
            self.corrector
                .begin(now_ms, self.rate(), tx.drop_frame(), learning);
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn clock(&self) -> &MicroAdjust<D, T> {
        &self.clock
    }

    pub fn is_calibrating(&self) -> bool {
        self.corrector.is_learning()
    }
}
