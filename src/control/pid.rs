// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! PID controller for the phase-lock loop.
//!
//! Works in `no_std` and does not allocate memory. The integral term is clamped to the output
//! range and can be preloaded, so the loop can take over from a calibration value already in
//! use without a jump.

/// Closed interval a value is held to.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Bounds {
    min: f32,
    max: f32,
}

impl Bounds {
    const UNIT: Self = Self {
        min: -1.0,
        max: 1.0,
    };

    #[inline]
    fn clamp(self, v: f32) -> f32 {
        v.clamp(self.min, self.max)
    }
}

/// PID controller with derivative on measurement and anti-windup.
#[derive(Clone, Debug)]
pub struct Pid {
    kp: f32,
    ki: f32,
    kd: f32,

    integral: f32,
    /// Measurement of the previous update, `None` until the first one.
    prev_measurement: Option<f32>,

    output: Bounds,
    windup: Bounds,

    last: PidTerms,
}

/// The three terms of the last update, for logging.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PidTerms {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

impl Pid {
    /// Output and integral both start limited to `±1`.
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            prev_measurement: None,
            output: Bounds::UNIT,
            windup: Bounds::UNIT,
            last: PidTerms::default(),
        }
    }

    /// Gains used for calibration: Kp 500, Ki 20, output and integral within `±limit`.
    pub fn phase_lock(limit: f32) -> Self {
        Self::new(500.0, 20.0, 0.0)
            .with_output_limits(-limit, limit)
            .with_integral_limits(-limit, limit)
    }

    pub fn with_output_limits(mut self, min: f32, max: f32) -> Self {
        self.output = Bounds { min, max };
        self
    }

    pub fn with_integral_limits(mut self, min: f32, max: f32) -> Self {
        self.windup = Bounds { min, max };
        self
    }

    /// Forget the integrator and the derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_measurement = None;
        self.last = PidTerms::default();
    }

    /// Restart with the integrator holding `last_output`, so the first output continues from
    /// the value already applied.
    pub fn resume(&mut self, last_output: f32) {
        self.reset();
        self.integral = self.windup.clamp(last_output);
    }

    /// Terms of the most recent [`update`](Self::update).
    pub fn terms(&self) -> PidTerms {
        self.last
    }

    /// Run one step of `dt` seconds and return the clamped command.
    pub fn update(&mut self, setpoint: f32, measurement: f32, dt: f32) -> f32 {
        let error = setpoint - measurement;

        self.integral = self.windup.clamp(self.integral + self.ki * error * dt);
        let d = match self.prev_measurement.replace(measurement) {
            Some(prev) => self.kd * (prev - measurement) / dt,
            None => 0.0,
        };

        self.last = PidTerms {
            p: self.kp * error,
            i: self.integral,
            d,
        };
        self.output.clamp(self.last.p + self.last.i + self.last.d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_opposes_phase() {
        let mut pid = Pid::phase_lock(50.0);
        // TX ahead of RX: slow down
        assert!(pid.update(0.0, 0.01, 1.0) < 0.0);
        pid.reset();
        assert!(pid.update(0.0, -0.01, 1.0) > 0.0);
    }

    #[test]
    fn output_is_clamped() {
        let mut pid = Pid::phase_lock(50.0);
        assert_eq!(pid.update(0.0, -0.4, 1.0), 50.0);
        assert_eq!(pid.terms().i, 8.0);
    }

    #[test]
    fn resume_is_bumpless() {
        let mut pid = Pid::phase_lock(50.0);
        pid.resume(3.25);
        assert_eq!(pid.update(0.0, 0.0, 1.0), 3.25);

        pid.resume(-80.0);
        assert_eq!(pid.update(0.0, 0.0, 1.0), -50.0);
    }

    #[test]
    fn integral_accumulates_with_dt() {
        let mut pid = Pid::new(0.0, 2.0, 0.0)
            .with_output_limits(-10.0, 10.0)
            .with_integral_limits(-10.0, 10.0);
        pid.update(1.0, 0.0, 0.5);
        assert_eq!(pid.update(1.0, 0.0, 0.5), 2.0);
    }
}
