// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! TX/RX phase measurement.

use crate::timecode::FrameRate;

/// The RX sync interrupt fires about 2/3 of a bit after the frame boundary.
pub const RX_SAMPLE_OFFSET: f32 = 2.0 / (3.0 * 80.0);

/// Phase of the received stream against our own, in frames within `[-0.5, 0.5]`.
///
/// `rx_us` and `tx_us` are the microsecond stamps of the RX data start and TX frame start.
/// Positive means TX is ahead of RX. Offsets more than two frames away cannot be folded onto
/// the nearest frame boundary and give `None`.
pub fn phase_error(rx_us: u32, tx_us: u32, rate: FrameRate) -> Option<f32> {
    let delta = rx_us.wrapping_sub(tx_us) as i32;
    let mut d = delta as f32 / rate.frame_period_us() - RX_SAMPLE_OFFSET;

    if d > -2.0 && d <= 0.0 {
        while d < -0.5 {
            d += 1.0;
        }
    } else if d < 2.0 && d >= 0.0 {
        while d > 0.5 {
            d -= 1.0;
        }
    }

    if (-0.5..=0.5).contains(&d) {
        Some(d)
    } else {
        None
    }
}
