// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Timecode Values
//!
//! [`Timecode`] is a plain `Copy` value holding `HH:MM:SS:FF`, the frame rate, drop-frame and
//! the LTC flag/user bits. Sharing between the real-time loop and the monitor happens through
//! [`shared::SharedTimecode`], never through the value itself.
//!
//! ## Modules
//!
//! - [`packet`] - 80-bit SMPTE LTC packet codec.
//! - [`userbits`] - User-bit formats and the timezone table.
//! - [`shared`] - Lock-guarded and lock-free publication cells.

pub mod packet;
pub mod shared;
pub mod userbits;

use core::fmt;
use core::fmt::Write as _;
use core::str::FromStr;

use heapless::String;

use crate::error::TimecodeError;

pub use packet::LtcFrame;
pub use userbits::{UserBits, UserFormat};

/// Supported LTC frame rates.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameRate {
    Fps30,
    Fps29_97,
    Fps25,
    Fps24_98,
    Fps24,
    Fps23_98,
}

impl FrameRate {
    pub const ALL: [FrameRate; 6] = [
        FrameRate::Fps30,
        FrameRate::Fps29_97,
        FrameRate::Fps25,
        FrameRate::Fps24_98,
        FrameRate::Fps24,
        FrameRate::Fps23_98,
    ];

    /// Frames counted per second, i.e. `round(fps)`.
    #[inline]
    pub const fn nominal(self) -> u8 {
        match self {
            FrameRate::Fps30 | FrameRate::Fps29_97 => 30,
            FrameRate::Fps25 | FrameRate::Fps24_98 => 25,
            FrameRate::Fps24 | FrameRate::Fps23_98 => 24,
        }
    }

    /// Actual frames per second.
    pub const fn fps(self) -> f32 {
        match self {
            FrameRate::Fps30 => 30.0,
            FrameRate::Fps29_97 => 29.97,
            FrameRate::Fps25 => 25.0,
            FrameRate::Fps24_98 => 24.98,
            FrameRate::Fps24 => 24.0,
            FrameRate::Fps23_98 => 23.98,
        }
    }

    /// Duration of one frame in microseconds.
    #[inline]
    pub fn frame_period_us(self) -> f32 {
        1_000_000.0 / self.fps()
    }

    /// Drop-frame counting only exists for the NTSC-derived rates.
    #[inline]
    pub const fn allows_drop_frame(self) -> bool {
        matches!(self, FrameRate::Fps29_97 | FrameRate::Fps23_98)
    }

    /// 25 fps moves the parity bit to bit 59 and the BGF flags to bits 27/43.
    #[inline]
    pub const fn uses_ebu_layout(self) -> bool {
        matches!(self, FrameRate::Fps25)
    }

    /// Name used in configuration (`"29.97"`).
    pub const fn as_str(self) -> &'static str {
        match self {
            FrameRate::Fps30 => "30",
            FrameRate::Fps29_97 => "29.97",
            FrameRate::Fps25 => "25",
            FrameRate::Fps24_98 => "24.98",
            FrameRate::Fps24 => "24",
            FrameRate::Fps23_98 => "23.98",
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameRate {
    type Err = TimecodeError;

    /// Accepts the config spelling (`"30"`, `"29.97"`) or any decimal within 0.005 of a rate.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rate) = FrameRate::ALL.iter().find(|r| r.as_str() == s) {
            return Ok(*rate);
        }

        let fps: f32 = s.parse().map_err(|_| TimecodeError::UnsupportedRate)?;
        FrameRate::ALL
            .iter()
            .copied()
            .find(|r| {
                let diff = r.fps() - fps;
                diff < 0.005 && diff > -0.005
            })
            .ok_or(TimecodeError::UnsupportedRate)
    }
}

/// An `HH:MM:SS:FF` LTC timecode with its rate, flags and user bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timecode {
    hours: u8,
    minutes: u8,
    seconds: u8,
    frames: u8,

    rate: FrameRate,
    drop_frame: bool,

    /// Color frame flag (bit 11).
    pub color_frame: bool,
    /// BGF1: timecode is referenced to real time.
    pub clock_flag: bool,

    user_format: UserFormat,
    user_bits: UserBits,
}

impl Default for Timecode {
    fn default() -> Self {
        Self::new(FrameRate::Fps30)
    }
}

impl Timecode {
    /// `00:00:00:00`, non-drop-frame, user bits `"PICO"`.
    pub const fn new(rate: FrameRate) -> Self {
        Self {
            hours: 0,
            minutes: 0,
            seconds: 0,
            frames: 0,
            rate,
            drop_frame: false,
            color_frame: false,
            clock_flag: false,
            user_format: UserFormat::Text,
            user_bits: UserBits::PICO,
        }
    }

    /// Build a timecode at a given position.
    pub fn at(
        rate: FrameRate,
        drop_frame: bool,
        hours: u8,
        minutes: u8,
        seconds: u8,
        frames: u8,
    ) -> Result<Self, TimecodeError> {
        let mut tc = Self::new(rate);
        tc.set_fps_df(rate, drop_frame)?;
        tc.set_time(hours, minutes, seconds, frames)?;
        Ok(tc)
    }

    #[inline]
    pub fn hours(&self) -> u8 {
        self.hours
    }

    #[inline]
    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    #[inline]
    pub fn seconds(&self) -> u8 {
        self.seconds
    }

    #[inline]
    pub fn frames(&self) -> u8 {
        self.frames
    }

    #[inline]
    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    #[inline]
    pub fn drop_frame(&self) -> bool {
        self.drop_frame
    }

    #[inline]
    pub fn user_format(&self) -> UserFormat {
        self.user_format
    }

    #[inline]
    pub fn user_bits(&self) -> UserBits {
        self.user_bits
    }

    /// Replace the user bits and their format flags.
    pub fn set_user(&mut self, format: UserFormat, bits: UserBits) {
        self.user_format = format;
        self.user_bits = bits;
    }

    /// Set rate and drop-frame. The current value is clamped to the new rate and moved off any
    /// dropped frame number.
    pub fn set_fps_df(&mut self, rate: FrameRate, drop_frame: bool) -> Result<(), TimecodeError> {
        if drop_frame && !rate.allows_drop_frame() {
            return Err(TimecodeError::UnsupportedDropFrame);
        }

        self.rate = rate;
        self.drop_frame = drop_frame;
        if self.frames >= rate.nominal() {
            self.frames = rate.nominal() - 1;
        }
        self.skip_dropped_forward();
        Ok(())
    }

    /// Set the time fields, rejecting values outside the rate's range.
    pub fn set_time(
        &mut self,
        hours: u8,
        minutes: u8,
        seconds: u8,
        frames: u8,
    ) -> Result<(), TimecodeError> {
        if hours >= 24 || minutes >= 60 || seconds >= 60 || frames >= self.rate.nominal() {
            return Err(TimecodeError::OutOfRange);
        }

        self.hours = hours;
        self.minutes = minutes;
        self.seconds = seconds;
        self.frames = frames;
        self.skip_dropped_forward();
        Ok(())
    }

    /// Frames 0 and 1 do not exist at second 0 of minutes not divisible by ten.
    #[inline]
    fn on_dropped_frame(&self) -> bool {
        self.drop_frame && self.seconds == 0 && self.frames < 2 && self.minutes % 10 != 0
    }

    fn skip_dropped_forward(&mut self) {
        if self.on_dropped_frame() {
            self.frames = 2;
        }
    }

    fn skip_dropped_backward(&mut self) {
        if self.on_dropped_frame() {
            // minutes % 10 != 0, so there is no hour borrow
            self.minutes -= 1;
            self.seconds = 59;
            self.frames = self.rate.nominal() - 1;
        }
    }

    /// Advance by one frame, carrying into seconds, minutes and hours, wrapping at 24h.
    pub fn next_frame(&mut self) {
        self.frames += 1;
        if self.frames >= self.rate.nominal() {
            self.frames = 0;
            self.seconds += 1;
            if self.seconds >= 60 {
                self.seconds = 0;
                self.minutes += 1;
                if self.minutes >= 60 {
                    self.minutes = 0;
                    self.hours += 1;
                    if self.hours >= 24 {
                        self.hours = 0;
                    }
                }
            }
        }
        self.skip_dropped_forward();
    }

    /// Step back by one frame. Exact inverse of [`next_frame`](Self::next_frame).
    pub fn prev_frame(&mut self) {
        if self.frames == 0 {
            self.frames = self.rate.nominal() - 1;
            if self.seconds == 0 {
                self.seconds = 59;
                if self.minutes == 0 {
                    self.minutes = 59;
                    self.hours = if self.hours == 0 { 23 } else { self.hours - 1 };
                } else {
                    self.minutes -= 1;
                }
            } else {
                self.seconds -= 1;
            }
        } else {
            self.frames -= 1;
        }
        self.skip_dropped_backward();
    }

    pub fn advance(&mut self, count: u32) {
        for _ in 0..count {
            self.next_frame();
        }
    }

    pub fn rewind(&mut self, count: u32) {
        for _ in 0..count {
            self.prev_frame();
        }
    }

    /// Packed snapshot: `df << 7 | hh << 24 | mm << 16 | ss << 8 | ff`.
    #[inline]
    pub fn to_raw(&self) -> u32 {
        ((self.drop_frame as u32) << 7)
            | ((self.hours as u32) << 24)
            | ((self.minutes as u32) << 16)
            | ((self.seconds as u32) << 8)
            | self.frames as u32
    }

    /// Load time fields and drop-frame from a packed snapshot. Flags, rate and user bits are
    /// left alone.
    pub fn set_raw(&mut self, raw: u32) {
        self.drop_frame = (raw & 0x0000_0080) != 0;
        self.hours = ((raw & 0x1F00_0000) >> 24) as u8;
        self.minutes = ((raw & 0x003F_0000) >> 16) as u8;
        self.seconds = ((raw & 0x0000_3F00) >> 8) as u8;
        self.frames = (raw & 0x0000_001F) as u8;
    }

    /// Parse `HH:MM:SS:FF` (a `.`/`;`/`,` before the frames selects drop-frame) or the compact
    /// `HHMMSSFF` form, which keeps the current drop-frame setting.
    pub fn set_ascii(&mut self, s: &str) -> Result<(), TimecodeError> {
        let b = s.as_bytes();
        let (fields, drop_frame) = match b.len() {
            11 => {
                if b[2] != b':' || b[5] != b':' {
                    return Err(TimecodeError::Malformed);
                }
                let df = match b[8] {
                    b':' => false,
                    b'.' | b';' | b',' => true,
                    _ => return Err(TimecodeError::Malformed),
                };
                ([&b[0..2], &b[3..5], &b[6..8], &b[9..11]], df)
            }
            8 => ([&b[0..2], &b[2..4], &b[4..6], &b[6..8]], self.drop_frame),
            _ => return Err(TimecodeError::Malformed),
        };

        let mut value = [0u8; 4];
        for (v, pair) in value.iter_mut().zip(fields) {
            *v = two_digits(pair)?;
        }

        let mut tc = *self;
        tc.set_fps_df(self.rate, drop_frame)?;
        tc.set_time(value[0], value[1], value[2], value[3])?;
        *self = tc;
        Ok(())
    }

    /// 11-character form, `.` before the frames when drop-frame.
    pub fn to_ascii(&self) -> String<11> {
        let mut s = String::new();
        // 11 chars always fit
        let _ = write!(s, "{self}");
        s
    }

    /// 8-digit form without separators.
    pub fn to_ascii_compact(&self) -> String<8> {
        let mut s = String::new();
        let _ = write!(
            s,
            "{:02}{:02}{:02}{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        );
        s
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours,
            self.minutes,
            self.seconds,
            if self.drop_frame { '.' } else { ':' },
            self.frames
        )
    }
}

impl FromStr for Timecode {
    type Err = TimecodeError;

    /// Parse at 29.97 when the string marks drop-frame, otherwise at 30 fps.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tc = Timecode::new(FrameRate::Fps29_97);
        tc.set_ascii(s)?;
        if !tc.drop_frame {
            tc.rate = FrameRate::Fps30;
        }
        Ok(tc)
    }
}

fn two_digits(pair: &[u8]) -> Result<u8, TimecodeError> {
    let mut v = 0u8;
    for &c in pair {
        if !c.is_ascii_digit() {
            return Err(TimecodeError::Malformed);
        }
        v = v * 10 + (c - b'0');
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tc(rate: FrameRate, df: bool, h: u8, m: u8, s: u8, f: u8) -> Timecode {
        Timecode::at(rate, df, h, m, s, f).unwrap()
    }

    #[test]
    fn carries_through_every_field() {
        let mut t = tc(FrameRate::Fps25, false, 23, 59, 59, 24);
        t.next_frame();
        assert_eq!(t.to_raw(), 0);
    }

    #[test]
    fn borrows_through_every_field() {
        let mut t = tc(FrameRate::Fps24, false, 0, 0, 0, 0);
        t.prev_frame();
        assert_eq!(t.to_ascii().as_str(), "23:59:59:23");
    }

    #[test]
    fn drop_frame_only_at_ntsc_rates() {
        let mut t = Timecode::new(FrameRate::Fps25);
        assert_eq!(
            t.set_fps_df(FrameRate::Fps25, true),
            Err(TimecodeError::UnsupportedDropFrame)
        );
        assert!(!t.drop_frame());
        assert!(t.set_fps_df(FrameRate::Fps23_98, true).is_ok());
    }

    #[test]
    fn enabling_drop_frame_moves_off_dropped_number() {
        let mut t = tc(FrameRate::Fps29_97, false, 0, 1, 0, 0);
        t.set_fps_df(FrameRate::Fps29_97, true).unwrap();
        assert_eq!(t.to_ascii().as_str(), "00:01:00.02");
    }

    #[test]
    fn lowering_the_rate_clamps_frames() {
        let mut t = tc(FrameRate::Fps30, false, 1, 2, 3, 29);
        t.set_fps_df(FrameRate::Fps24, false).unwrap();
        assert_eq!(t.frames(), 23);
    }

    #[test]
    fn ascii_round_trip() {
        let mut t = Timecode::new(FrameRate::Fps29_97);
        t.set_ascii("01:23:45.12").unwrap();
        assert!(t.drop_frame());
        assert_eq!(t.to_ascii().as_str(), "01:23:45.12");
        assert_eq!(t.to_ascii_compact().as_str(), "01234512");
    }

    #[test]
    fn compact_ascii_keeps_drop_frame() {
        let mut t = tc(FrameRate::Fps29_97, true, 0, 0, 0, 0);
        t.set_ascii("00010000").unwrap();
        assert!(t.drop_frame());
        assert_eq!(t.frames(), 2);
    }

    #[test]
    fn bad_ascii_leaves_value_untouched() {
        let mut t = tc(FrameRate::Fps25, false, 10, 0, 0, 0);
        assert_eq!(t.set_ascii("10:00:00:25"), Err(TimecodeError::OutOfRange));
        assert_eq!(t.set_ascii("10-00-00-00"), Err(TimecodeError::Malformed));
        assert_eq!(t.set_ascii("10:00:00.00"), Err(TimecodeError::UnsupportedDropFrame));
        assert_eq!(t.to_ascii().as_str(), "10:00:00:00");
    }

    #[test]
    fn raw_snapshot_round_trip() {
        let t = tc(FrameRate::Fps29_97, true, 12, 34, 56, 7);
        let mut u = Timecode::new(FrameRate::Fps29_97);
        u.set_raw(t.to_raw());
        assert_eq!(u.to_raw(), t.to_raw());
        assert_eq!(t.to_raw(), 0x0C22_3807 | 0x80);
    }

    #[test]
    fn rate_parsing() {
        assert_eq!("29.97".parse::<FrameRate>(), Ok(FrameRate::Fps29_97));
        assert_eq!("30.00".parse::<FrameRate>(), Ok(FrameRate::Fps30));
        assert_eq!(" 25 ".parse::<FrameRate>(), Ok(FrameRate::Fps25));
        assert_eq!("50".parse::<FrameRate>(), Err(TimecodeError::UnsupportedRate));
    }
}
