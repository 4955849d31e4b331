// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Fractional clock trimming by dithering the divider.
//!
//! Each control period starts by writing the divider for the whole part of the calibration
//! value. For the last `period * frac(|calval|)` ms one more step is applied in the same
//! direction, and the next period restores the coarse divider. Only one deadline is ever armed.
//!
//! ```text
//!   |<------------- period ------------->|
//!   |  Off: coarse divider  | On: +1 step|  next period ...
//! start                   step_at    period_end
//! ```
//!
//! [`MicroAdjust::service`] runs from the engine loop, never from interrupt context. If the
//! timer never reports a deadline, the deadline plus [`SAFETY_MARGIN_MS`] triggers a restart of
//! the cycle with the latest requested value.

use log::{error, trace};

#[allow(unused_imports)]
use micromath::F32Ext;

use super::{
    calibrated_divider, clamp_calval, ClockDivider, OneShot, DEFAULT_PERIOD_MS, DIVIDER_STEP,
    SAFETY_MARGIN_MS,
};
use crate::timecode::FrameRate;

/// Dither cycle state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dither {
    /// Stopped, no deadline armed.
    Idle,
    /// Coarse divider applied. The fine step is due at `step_at`, or never if the value is whole.
    Off { step_at: Option<u64>, period_end: u64 },
    /// Fine step applied until `period_end`.
    On { period_end: u64 },
}

impl Dither {
    fn deadline(self) -> Option<u64> {
        match self {
            Dither::Idle => None,
            Dither::Off { step_at, period_end } => Some(step_at.unwrap_or(period_end)),
            Dither::On { period_end } => Some(period_end),
        }
    }
}

pub struct MicroAdjust<D, T> {
    divider: D,
    timer: T,
    rate: FrameRate,
    running: bool,

    state: Dither,
    /// Value applied to the cycle in flight.
    calval: f32,
    /// Value for the next cycle.
    next_calval: f32,
    period_ms: u32,

    missed: u32,
}

impl<D: ClockDivider, T: OneShot> MicroAdjust<D, T> {
    pub fn new(divider: D, timer: T) -> Self {
        Self {
            divider,
            timer,
            rate: FrameRate::Fps30,
            running: false,
            state: Dither::Idle,
            calval: 0.0,
            next_calval: 0.0,
            period_ms: DEFAULT_PERIOD_MS,
            missed: 0,
        }
    }

    /// Allow adjustments at `rate`. The first [`request`](Self::request) starts the cycle.
    pub fn start(&mut self, rate: FrameRate) {
        self.rate = rate;
        self.running = true;
        self.state = Dither::Idle;
    }

    /// Cancel any pending deadline and forget the calibration value.
    pub fn stop(&mut self) {
        self.running = false;
        self.timer.cancel();
        self.state = Dither::Idle;
        self.calval = 0.0;
        self.next_calval = 0.0;
    }

    /// Request a calibration value, and optionally a new period.
    ///
    /// While stopped this only cancels the timer. While a cycle is in flight the value is
    /// picked up at the next period boundary.
    pub fn request(&mut self, calval: f32, period_ms: Option<u32>, now_ms: u64) {
        if !self.running {
            self.timer.cancel();
            self.state = Dither::Idle;
            return;
        }

        self.next_calval = clamp_calval(calval);
        if let Some(p) = period_ms.filter(|p| *p > 0) {
            self.period_ms = p;
        }

        if self.state == Dither::Idle {
            self.begin_cycle(now_ms);
        }
    }

    /// Handle a due deadline. Call often from the engine loop.
    pub fn service(&mut self, now_ms: u64) {
        if !self.running {
            return;
        }
        let Some(deadline) = self.state.deadline() else {
            return;
        };

        if self.timer.expired(now_ms) {
            match self.state {
                Dither::Off {
                    step_at: Some(_),
                    period_end,
                } => {
                    let div = self.divider.divider();
                    if self.calval > 0.0 {
                        self.divider.set_divider(div - DIVIDER_STEP);
                    } else {
                        self.divider.set_divider(div + DIVIDER_STEP);
                    }
                    self.state = Dither::On { period_end };
                    self.timer.arm(period_end);
                }
                _ => self.begin_cycle(now_ms),
            }
        } else if now_ms >= deadline + SAFETY_MARGIN_MS {
            self.missed += 1;
            error!(
                "dither deadline {} missed at {}, reapplying {:.3}",
                deadline, now_ms, self.next_calval
            );
            self.timer.cancel();
            self.begin_cycle(now_ms);
        }
    }

    fn begin_cycle(&mut self, now_ms: u64) {
        self.calval = self.next_calval;
        self.divider
            .set_divider(calibrated_divider(self.rate, self.calval));

        let period_end = now_ms + self.period_ms as u64;
        let part = (self.period_ms as f32 * self.calval.abs().fract()) as u64;
        let step_at = (part > 0).then_some(period_end - part);

        trace!(
            "dither {:.3}: div {:#010x}, step for {} of {} ms",
            self.calval,
            self.divider.divider(),
            part,
            self.period_ms
        );

        self.state = Dither::Off {
            step_at,
            period_end,
        };
        self.timer.arm(step_at.unwrap_or(period_end));
    }

    #[inline]
    pub fn state(&self) -> Dither {
        self.state
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Value applied to the current cycle.
    #[inline]
    pub fn calval(&self) -> f32 {
        self.calval
    }

    /// Value the next cycle will apply.
    #[inline]
    pub fn target(&self) -> f32 {
        self.next_calval
    }

    #[inline]
    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    /// Deadlines recovered by the safety check.
    #[inline]
    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn divider(&self) -> &D {
        &self.divider
    }
}
