// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Control Algorithms
//!
//! Building blocks for locking the local line clock to a received stream.
//!
//! ## Modules
//!
//! - [`pid`] - General-purpose PID controller implementation.
//! - [`rolling`] - Rolling average with purge by timestamp.
//! - [`phase`] - TX/RX phase measurement in frames.
//! - [`calibration`] - Phase corrector and calibration learning timeline.

pub mod calibration;
pub mod phase;
pub mod pid;
pub mod rolling;

pub use calibration::{CalibrateMode, CalibrationPlan, Correction, Learned, PhaseCorrector, Tick};
pub use phase::phase_error;
pub use pid::Pid;
pub use rolling::Rolling;
