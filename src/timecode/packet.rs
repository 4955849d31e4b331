// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! SMPTE 12M LTC packet codec.
//!
//! One 80-bit frame is 64 data bits followed by the 16-bit sync word. The data bits travel as two
//! 32-bit words, LSB first:
//!
//! ```text
//! low:  ff units | uf1 | ff tens, DF, CF | uf2 | ss units | uf3 | ss tens, f27 | uf4
//! high: mm units | uf5 | mm tens, f43    | uf6 | hh units | uf7 | hh tens, BGF1, f59 | uf8
//! ```
//!
//! Since 80 bits do not divide into words, the sync word is sent every other frame, once for the
//! frame before and once for the current one, giving three words instead of two.

use heapless::Vec;

use super::{Timecode, UserBits, UserFormat};
use crate::error::TimecodeError;

/// SMPTE sync word in transmit bit order.
pub const SYNC_WORD: u32 = 0xBFFC;

/// Sync word with every bit doubled, as matched by the RX sync state machine.
pub const SYNC_WORD_DOUBLED: u32 = 0xCFFF_FFF0;

const F27: u32 = 1 << 27;
const F43: u32 = 1 << 11;
const F59: u32 = 1 << 27;
const BGF1: u32 = 1 << 26;
const DF: u32 = 1 << 10;
const CF: u32 = 1 << 11;

/// The 64 data bits of one LTC frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct LtcFrame {
    /// Bits 0..32.
    pub low: u32,
    /// Bits 32..64.
    pub high: u32,
}

impl LtcFrame {
    pub const fn from_words(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    /// Whether the full 80 bits, sync word included, hold an even number of ones.
    pub fn has_even_parity(&self) -> bool {
        (SYNC_WORD.count_ones() + self.low.count_ones() + self.high.count_ones()) & 1 == 0
    }

    /// Words to push into the TX queue. With `send_sync` the two frame words are framed by sync
    /// words into three whole words.
    pub fn words(&self, send_sync: bool) -> Vec<u32, 3> {
        let mut out = Vec::new();
        let words: &[u32] = if send_sync {
            &[
                ((self.low & 0xFFFF) << 16) | SYNC_WORD,
                ((self.high & 0xFFFF) << 16) | (self.low >> 16),
                (SYNC_WORD << 16) | (self.high >> 16),
            ]
        } else {
            &[self.low, self.high]
        };
        // capacity is 3
        let _ = out.extend_from_slice(words);
        out
    }
}

/// Place four user nibbles at bits 4, 12, 20 and 28.
#[inline]
fn spread(nibbles: u32) -> u32 {
    ((nibbles & 0x000F) << 4)
        | ((nibbles & 0x00F0) << 8)
        | ((nibbles & 0x0F00) << 12)
        | ((nibbles & 0xF000) << 16)
}

#[inline]
fn gather(word: u32) -> u32 {
    ((word >> 4) & 0x000F)
        | ((word >> 8) & 0x00F0)
        | ((word >> 12) & 0x0F00)
        | ((word >> 16) & 0xF000)
}

#[inline]
fn bcd(units: u32, tens: u32, tens_mask: u32) -> Result<u8, TimecodeError> {
    let units = units & 0xF;
    if units > 9 {
        return Err(TimecodeError::BadPacket);
    }
    Ok(((tens & tens_mask) * 10 + units) as u8)
}

impl Timecode {
    /// Encode into an LTC frame with the parity bit set for even parity.
    pub fn to_ltc(&self) -> LtcFrame {
        let (bgf0, bgf2) = self.user_format.flags();
        let ebu = self.rate.uses_ebu_layout();
        let ub = self.user_bits.0;

        let (ff, ss) = (self.frames as u32, self.seconds as u32);
        let (mm, hh) = (self.minutes as u32, self.hours as u32);

        let mut low = (ff % 10)
            | ((ff / 10) & 0x3) << 8
            | (ss % 10) << 16
            | ((ss / 10) & 0x7) << 24
            | spread(ub & 0xFFFF);
        if self.drop_frame {
            low |= DF;
        }
        if self.color_frame {
            low |= CF;
        }

        let mut high = (mm % 10)
            | ((mm / 10) & 0x7) << 8
            | (hh % 10) << 16
            | ((hh / 10) & 0x3) << 24
            | spread(ub >> 16);
        if self.clock_flag {
            high |= BGF1;
        }

        if ebu {
            if bgf0 {
                low |= F27;
            }
            if bgf2 {
                high |= F43;
            }
        } else {
            if bgf0 {
                high |= F43;
            }
            if bgf2 {
                high |= F59;
            }
        }

        let mut frame = LtcFrame { low, high };
        if !frame.has_even_parity() {
            if ebu {
                frame.high |= F59;
            } else {
                frame.low |= F27;
            }
        }
        frame
    }

    /// Decode an LTC frame at the current rate. Nothing changes unless the whole frame is valid.
    pub fn set_ltc(&mut self, frame: LtcFrame) -> Result<(), TimecodeError> {
        let LtcFrame { low, high } = frame;

        let frames = bcd(low, low >> 8, 0x3)?;
        let seconds = bcd(low >> 16, low >> 24, 0x7)?;
        let minutes = bcd(high, high >> 8, 0x7)?;
        let hours = bcd(high >> 16, high >> 24, 0x3)?;

        if frames >= self.rate.nominal() || seconds >= 60 || minutes >= 60 || hours >= 24 {
            return Err(TimecodeError::BadPacket);
        }

        let (bgf0, bgf2) = if self.rate.uses_ebu_layout() {
            (low & F27 != 0, high & F43 != 0)
        } else {
            (high & F43 != 0, high & F59 != 0)
        };

        self.hours = hours;
        self.minutes = minutes;
        self.seconds = seconds;
        self.frames = frames;
        self.drop_frame = low & DF != 0;
        self.color_frame = low & CF != 0;
        self.clock_flag = high & BGF1 != 0;
        self.user_format = UserFormat::from_flags(bgf0, bgf2);
        self.user_bits = UserBits(gather(low) | (gather(high) << 16));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timecode::FrameRate;
    use pretty_assertions::assert_eq;

    #[test]
    fn encodes_known_frame() {
        let mut tc = Timecode::at(FrameRate::Fps30, false, 12, 34, 56, 28).unwrap();
        tc.set_user_bcd_hex("00000000");
        let frame = tc.to_ltc();
        // ff 28, ss 56 | mm 34, hh 12
        assert_eq!(frame.low & !F27, 0x0506_0208);
        assert_eq!(frame.high, 0x0102_0304);
        assert!(frame.has_even_parity());
    }

    #[test]
    fn parity_bit_moves_at_25fps() {
        let mut tc = Timecode::at(FrameRate::Fps25, false, 0, 0, 0, 1).unwrap();
        tc.set_user_bcd_hex("00000000");
        let frame = tc.to_ltc();
        // 13 ones in the sync word plus one in the frame units
        assert_eq!(frame.high & F59, 0);
        assert_eq!(frame.low & F27, 0);

        tc.set_time(0, 0, 0, 3).unwrap();
        let frame = tc.to_ltc();
        assert_ne!(frame.high & F59, 0);
        assert_eq!(frame.low & F27, 0);
        assert!(frame.has_even_parity());
    }

    #[test]
    fn sync_framing() {
        let frame = LtcFrame::from_words(0x1111_2222, 0x3333_4444);
        assert_eq!(frame.words(false).as_slice(), &[0x1111_2222, 0x3333_4444]);
        assert_eq!(
            frame.words(true).as_slice(),
            &[0x2222_BFFC, 0x4444_1111, 0xBFFC_3333]
        );
    }

    #[test]
    fn frame_limit_uses_nominal_count() {
        let src = Timecode::at(FrameRate::Fps29_97, false, 1, 0, 0, 29).unwrap();
        let mut dst = Timecode::new(FrameRate::Fps29_97);
        dst.set_ltc(src.to_ltc()).unwrap();
        assert_eq!(dst.frames(), 29);
    }

    #[test]
    fn impossible_frame_is_rejected_without_change() {
        let src = Timecode::at(FrameRate::Fps30, false, 1, 2, 3, 27).unwrap();
        let mut dst = Timecode::at(FrameRate::Fps24, false, 4, 5, 6, 7).unwrap();
        let before = dst;
        assert_eq!(dst.set_ltc(src.to_ltc()), Err(TimecodeError::BadPacket));
        assert_eq!(dst, before);

        let garbage = LtcFrame::from_words(0x0000_000F, 0);
        assert_eq!(dst.set_ltc(garbage), Err(TimecodeError::BadPacket));
    }

    #[test]
    fn flags_survive_at_both_layouts() {
        for rate in [FrameRate::Fps25, FrameRate::Fps29_97] {
            let mut src = Timecode::at(rate, false, 9, 8, 7, 6).unwrap();
            src.set_user_date("Y24-M03-D15+0100").unwrap();
            src.clock_flag = true;
            src.color_frame = true;

            let mut dst = Timecode::new(rate);
            dst.set_ltc(src.to_ltc()).unwrap();
            assert_eq!(dst, src);
        }
    }
}
