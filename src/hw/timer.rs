// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Microsecond timer access and the dither alarm.

use log::warn;
use rp2040_hal::{
    pac,
    timer::{Alarm, Alarm0, Instant},
    Timer,
};

use crate::clock::{AlarmLatch, OneShot};
use crate::error::LineError;

/// Low word of the microsecond counter. Safe from interrupt context.
#[inline]
pub fn now_us() -> u32 {
    // SAFETY: TIMERAWL is a read-only view of the free running counter.
    unsafe { (*pac::TIMER::ptr()).timerawl().read().bits() }
}

/// Milliseconds since boot.
#[inline]
pub fn now_ms(timer: &Timer) -> u64 {
    timer.get_counter().ticks() / 1000
}

/// [`OneShot`] on hardware alarm 0.
///
/// The alarm interrupt stays masked; [`MicroAdjust`](crate::clock::MicroAdjust) polls the
/// alarm's fired flag from the engine loop.
pub struct AlarmTimer {
    alarm: Alarm0,
    latch: AlarmLatch,
}

impl AlarmTimer {
    pub fn new(timer: &mut Timer) -> Result<Self, LineError> {
        let alarm = timer.alarm_0().ok_or(LineError::AlarmTaken)?;
        Ok(Self {
            alarm,
            latch: AlarmLatch::new(),
        })
    }
}

impl OneShot for AlarmTimer {
    fn arm(&mut self, deadline_ms: u64) {
        let _ = self.alarm.cancel();
        if self
            .alarm
            .schedule_at(Instant::from_ticks(deadline_ms * 1000))
            .is_err()
        {
            warn!("alarm for {} ms not scheduled", deadline_ms);
        }
        self.latch.arm(deadline_ms);
    }

    fn cancel(&mut self) {
        let _ = self.alarm.cancel();
        self.latch.cancel();
    }

    fn expired(&mut self, _now_ms: u64) -> bool {
        self.latch.take(self.alarm.finished())
    }
}
