// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Phase correction and crystal calibration learning.
//!
//! While the engine monitors a locked RX stream, every decoded frame contributes a phase
//! sample. Samples are folded into one mean per [`SAMPLE_BUCKET_MS`], and once per tick the
//! means from the last control period are averaged.
//!
//! Without learning the average is only logged. With learning the [`Pid`] turns the average
//! into a calibration value for [`MicroAdjust`](crate::clock::MicroAdjust):
//!
//! 1. Settle for [`CalibrationPlan::settle_ms`] after lock.
//! 2. Take over from the current calibration value and tick every second, averaging over one
//!    second for the first [`CalibrationPlan::tight_ticks`] ticks.
//! 3. Average over the configured period until [`CalibrationPlan::total_ticks`].
//! 4. Report the mean of the last [`OUTPUT_HISTORY`] outputs as the learned value.

use log::{debug, info};

use super::pid::Pid;
use super::rolling::Rolling;
use crate::clock::{MAX_CALVAL, MAX_PERIOD_MS};
use crate::timecode::FrameRate;

/// Span of RX frames folded into one history entry.
pub const SAMPLE_BUCKET_MS: u64 = 1000;

/// History entries kept, one per bucket over the longest period plus slack.
pub const PHASE_HISTORY: usize = (MAX_PERIOD_MS as usize / SAMPLE_BUCKET_MS as usize) + 20;

/// Outputs averaged into the learned value.
pub const OUTPUT_HISTORY: usize = 120;

/// When calibration learning runs after a Jam.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum CalibrateMode {
    #[default]
    Off,
    /// Learn once, then switch to `Off`.
    Once,
    /// Learn after every Jam.
    Always,
}

/// Timeline of a learning session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CalibrationPlan {
    /// Wait after lock before the PID takes over.
    pub settle_ms: u32,
    /// Wait after entering Monitor without learning.
    pub observe_settle_ms: u32,
    pub tick_ms: u32,
    /// Ticks run with a 1 s period.
    pub tight_ticks: u32,
    pub total_ticks: u32,
    pub tight_period_ms: u32,
}

impl Default for CalibrationPlan {
    fn default() -> Self {
        Self {
            settle_ms: 60_000,
            observe_settle_ms: 1000,
            tick_ms: 1000,
            tight_ticks: 340,
            total_ticks: 540,
            tight_period_ms: 1000,
        }
    }
}

/// A new calibration value for the micro-adjust.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Correction {
    pub calval: f32,
    pub period_ms: u32,
}

/// Result of a completed learning session.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Learned {
    pub rate: FrameRate,
    pub drop_frame: bool,
    pub calval: f32,
    pub period_ms: u32,
}

/// What a [`PhaseCorrector::tick`] produced.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Tick {
    /// Not due, or no session.
    Wait,
    /// Averaged phase, without a correction.
    Observed(Option<f32>),
    Adjust(Correction),
    Learned(Learned),
}

/// Samples not yet folded into the history.
#[derive(Copy, Clone, Debug)]
struct Bucket {
    start_ms: u64,
    sum: f32,
    count: u32,
}

#[derive(Copy, Clone, Debug)]
struct Session {
    rate: FrameRate,
    drop_frame: bool,
    learning: bool,
    pid_active: bool,
    next_tick_ms: u64,
    ticks: u32,
}

pub struct PhaseCorrector {
    plan: CalibrationPlan,
    period_ms: u32,
    pid: Pid,
    phase: Rolling<PHASE_HISTORY>,
    pending: Option<Bucket>,
    outputs: Rolling<OUTPUT_HISTORY>,
    session: Option<Session>,
}

impl PhaseCorrector {
    /// `period_ms` is capped at [`MAX_PERIOD_MS`].
    pub fn new(plan: CalibrationPlan, period_ms: u32) -> Self {
        Self {
            plan,
            period_ms: period_ms.min(MAX_PERIOD_MS),
            pid: Pid::phase_lock(MAX_CALVAL),
            phase: Rolling::new(),
            pending: None,
            outputs: Rolling::new(),
            session: None,
        }
    }

    /// Start a session on entering Monitor.
    pub fn begin(&mut self, now_ms: u64, rate: FrameRate, drop_frame: bool, learning: bool) {
        let settle = if learning {
            self.plan.settle_ms
        } else {
            self.plan.observe_settle_ms
        };
        self.phase.clear();
        self.pending = None;
        self.outputs.clear();
        self.pid.reset();
        self.session = Some(Session {
            rate,
            drop_frame,
            learning,
            pid_active: false,
            next_tick_ms: now_ms + settle as u64,
            ticks: 0,
        });
        if learning {
            info!("calibration: settling for {} s", settle / 1000);
        }
    }

    /// Discard the session without reporting anything.
    pub fn cancel(&mut self) {
        if self.is_learning() {
            info!("calibration cancelled");
        }
        self.session = None;
        self.pid.reset();
        self.phase.clear();
        self.pending = None;
        self.outputs.clear();
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_learning(&self) -> bool {
        self.session.is_some_and(|s| s.learning)
    }

    /// Record a phase sample taken at `now_ms`.
    pub fn sample(&mut self, phase: f32, now_ms: u64) {
        if self.session.is_none() {
            return;
        }
        match self.pending.as_mut() {
            Some(b) if now_ms < b.start_ms + SAMPLE_BUCKET_MS => {
                b.sum += phase;
                b.count += 1;
            }
            _ => {
                self.flush();
                self.pending = Some(Bucket {
                    start_ms: now_ms,
                    sum: phase,
                    count: 1,
                });
            }
        }
    }

    /// Move the pending bucket's mean into the history, stamped with its first sample.
    fn flush(&mut self) {
        if let Some(b) = self.pending.take() {
            self.phase.store(b.sum / b.count as f32, b.start_ms);
        }
    }

    /// Run one tick if due. `current_calval` seeds the PID when it takes over.
    pub fn tick(&mut self, now_ms: u64, current_calval: f32) -> Tick {
        let Some(mut s) = self.session else {
            return Tick::Wait;
        };
        if now_ms < s.next_tick_ms {
            return Tick::Wait;
        }
        s.next_tick_ms = now_ms + self.plan.tick_ms as u64;
        self.flush();

        if !s.learning {
            self.phase.purge(now_ms.saturating_sub(self.plan.tick_ms as u64));
            let avg = self.phase.read();
            if let Some(avg) = avg {
                debug!("phase {:.4} calval {:.3}", avg, current_calval);
            }
            self.session = Some(s);
            return Tick::Observed(avg);
        }

        if !s.pid_active {
            self.pid.resume(current_calval);
            s.pid_active = true;
        }

        let period_ms = if s.ticks < self.plan.tight_ticks {
            self.plan.tight_period_ms
        } else {
            self.period_ms
        };
        self.phase.purge(now_ms.saturating_sub(period_ms as u64));

        let Some(avg) = self.phase.read() else {
            self.session = Some(s);
            return Tick::Observed(None);
        };

        let dt = self.plan.tick_ms as f32 / 1000.0;
        let adjust = self.pid.update(0.0, avg, dt);
        let mean = self.outputs.store_read(adjust, now_ms).unwrap_or(adjust);
        let terms = self.pid.terms();
        debug!(
            "cal tick {}: phase {:.4} adjust {:.3} mean {:.3} (p {:.3} i {:.3} d {:.3})",
            s.ticks, avg, adjust, mean, terms.p, terms.i, terms.d
        );

        s.ticks += 1;
        if s.ticks >= self.plan.total_ticks {
            let learned = Learned {
                rate: s.rate,
                drop_frame: s.drop_frame,
                calval: mean,
                period_ms: self.period_ms,
            };
            info!(
                "calibration learned {:.3} for {}{}",
                mean,
                s.rate,
                if s.drop_frame { "-DF" } else { "" }
            );

            s.learning = false;
            s.pid_active = false;
            self.pid.reset();
            self.outputs.clear();
            self.phase.purge(now_ms);
            self.session = Some(s);
            return Tick::Learned(learned);
        }

        self.session = Some(s);
        Tick::Adjust(Correction {
            calval: adjust,
            period_ms,
        })
    }

    /// Configured control period.
    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }
}
