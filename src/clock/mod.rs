// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Line Clock
//!
//! Every PIO state machine runs from the same fractional clock divider. The base values below
//! assume a 120 MHz system clock and a state-machine rate of `nominal * 80 * 32` Hz. A
//! calibration value trims the divider in whole steps, and [`MicroAdjust`] dithers one extra
//! step for part of each control period to reach fractional values.

pub mod micro_adjust;

pub use micro_adjust::{Dither, MicroAdjust};

#[allow(unused_imports)]
use micromath::F32Ext;

use crate::timecode::FrameRate;

/// One fractional step of the `CLKDIV` register (`int << 16 | frac << 8`).
pub const DIVIDER_STEP: u32 = 0x100;

/// Largest calibration magnitude applied to the divider.
pub const MAX_CALVAL: f32 = 50.0;

/// How long after a missed dither deadline the safety check fires.
pub const SAFETY_MARGIN_MS: u64 = 2000;

/// Default dither control period.
pub const DEFAULT_PERIOD_MS: u32 = 10_000;

/// Longest control period; the phase history holds one mean per second of it.
pub const MAX_PERIOD_MS: u32 = 300_000;

/// Hardware clock divider shared by all line state machines.
pub trait ClockDivider {
    /// Current divider as written to `CLKDIV`.
    fn divider(&self) -> u32;

    /// Write the divider to every line state machine.
    fn set_divider(&mut self, divider: u32);
}

/// A single one-shot timer.
pub trait OneShot {
    /// Arm to fire at `deadline_ms`, replacing any pending deadline.
    fn arm(&mut self, deadline_ms: u64);

    fn cancel(&mut self);

    /// Consume a fire event. Returns `true` once per firing.
    fn expired(&mut self, now_ms: u64) -> bool;
}

impl<T: OneShot + ?Sized> OneShot for &mut T {
    fn arm(&mut self, deadline_ms: u64) {
        (**self).arm(deadline_ms);
    }

    fn cancel(&mut self) {
        (**self).cancel();
    }

    fn expired(&mut self, now_ms: u64) -> bool {
        (**self).expired(now_ms)
    }
}

/// Deadline bookkeeping for a hardware [`OneShot`].
///
/// The deadline is only consumed by a fire the hardware reports. Time passing alone never
/// expires it, so a lost alarm is left to the safety check in [`MicroAdjust::service`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AlarmLatch {
    deadline: Option<u64>,
}

impl AlarmLatch {
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    pub fn arm(&mut self, deadline_ms: u64) {
        self.deadline = Some(deadline_ms);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// Consume a fire. `fired` is the hardware's view; without an armed deadline it is stale.
    pub fn take(&mut self, fired: bool) -> bool {
        fired && self.deadline.take().is_some()
    }
}

/// `CLKDIV` for a rate at 120 MHz.
pub const fn base_divider(rate: FrameRate) -> u32 {
    match rate {
        FrameRate::Fps30 => 0x061a_8000,
        FrameRate::Fps29_97 => 0x061c_1000,
        FrameRate::Fps25 => 0x0753_0000,
        FrameRate::Fps24_98 => 0x0754_e000,
        FrameRate::Fps24 => 0x07a1_2000,
        FrameRate::Fps23_98 => 0x07a3_1400,
    }
}

/// Clamp a calibration value to `±MAX_CALVAL`.
#[inline]
pub fn clamp_calval(calval: f32) -> f32 {
    if calval > MAX_CALVAL {
        MAX_CALVAL
    } else if calval < -MAX_CALVAL {
        -MAX_CALVAL
    } else {
        calval
    }
}

/// Base divider less the whole steps of `calval`. Positive values run the clock faster.
pub fn calibrated_divider(rate: FrameRate, calval: f32) -> u32 {
    let steps = clamp_calval(calval).trunc() as i32;
    (base_divider(rate) as i32 - steps * DIVIDER_STEP as i32) as u32
}
