// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! LTC user bits.
//!
//! The 32 user bits are stored as eight nibbles `uf1..uf8`, `uf1` in the low nibble. Two binary
//! group flags (BGF0, BGF2) select how they are read:
//!
//! | BGF0 | BGF2 | Format |
//! | ---- | ---- | ------ |
//! | 1 | 0 | Four 8-bit characters |
//! | 0 | 0 | Eight BCD/hex digits |
//! | 0 | 1 | `YY-MM-DD` plus a timezone index |
//! | 1 | 1 | Page/line (not decoded) |

use core::fmt::Write as _;

use heapless::String;

use super::Timecode;
use crate::error::TimecodeError;

/// Timezone codes addressed by the 6-bit index in `uf7`/`uf8` of the date format.
pub const TIMEZONES: [&str; 64] = [
    "+0000", "-0100", "-0200", "-0300", "-0400", "-0500", "-0600", "-0700", "-0800", "-0900",
    "-0030", "-0130", "-0230", "-0330", "-0430", "-0530", //
    "-1000", "-1100", "-1200", "+1300", "+1200", "+1100", "+1000", "+0900", "+0800", "+0700",
    "-0630", "-0730", "-0830", "-0930", "-1030", "-1130", //
    "+0600", "+0500", "+0400", "+0300", "+0200", "+0100", "Undef", "Undef", "TP-03", "TP-02",
    "+1130", "+1030", "+0930", "+0830", "+0730", "+0630", //
    "TP-01", "TP-00", "+1245", "Undef", "Undef", "Undef", "Undef", "Undef", "+XXXX", "Undef",
    "+0530", "+0430", "+0330", "+0230", "+0130", "+0030",
];

/// Interpretation of the user bits, carried on the wire as BGF0/BGF2.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum UserFormat {
    Digits,
    #[default]
    Text,
    Date,
    PageLine,
}

impl UserFormat {
    pub const fn from_flags(bgf0: bool, bgf2: bool) -> Self {
        match (bgf0, bgf2) {
            (false, false) => UserFormat::Digits,
            (true, false) => UserFormat::Text,
            (false, true) => UserFormat::Date,
            (true, true) => UserFormat::PageLine,
        }
    }

    /// `(bgf0, bgf2)`
    pub const fn flags(self) -> (bool, bool) {
        match self {
            UserFormat::Digits => (false, false),
            UserFormat::Text => (true, false),
            UserFormat::Date => (false, true),
            UserFormat::PageLine => (true, true),
        }
    }
}

/// Eight user-bit nibbles, `uf1` in bits 0..4 through `uf8` in bits 28..32.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct UserBits(pub u32);

impl UserBits {
    /// The characters `"PICO"`.
    pub const PICO: UserBits = UserBits(u32::from_le_bytes(*b"PICO"));

    /// Nibble `uf<n>` for `n` in `1..=8`.
    #[inline]
    pub const fn nibble(self, n: u8) -> u8 {
        ((self.0 >> ((n as u32 - 1) * 4)) & 0xF) as u8
    }

    #[inline]
    pub fn set_nibble(&mut self, n: u8, value: u8) {
        let shift = (n as u32 - 1) * 4;
        self.0 = (self.0 & !(0xF << shift)) | (((value & 0xF) as u32) << shift);
    }

    /// Four characters, space padded. Only ASCII fits in a byte per character.
    pub fn from_text(s: &str) -> Result<Self, TimecodeError> {
        let mut bytes = [b' '; 4];
        for (b, c) in bytes.iter_mut().zip(s.chars()) {
            if !c.is_ascii() {
                return Err(TimecodeError::BadUserBits);
            }
            *b = c as u8;
        }
        Ok(UserBits(u32::from_le_bytes(bytes)))
    }

    /// Up to eight hex digits, most significant (`uf8`) first. Non-hex characters are skipped
    /// and missing digits are zero.
    pub fn from_hex(s: &str) -> Self {
        let mut value = 0u32;
        let mut count = 0;
        for d in s.chars().filter_map(|c| c.to_digit(16)).take(8) {
            value = (value << 4) | d;
            count += 1;
        }
        if count < 8 {
            value <<= 4 * (8 - count);
        }
        UserBits(value)
    }

    /// `"Y24-M03-D15+0000"`. Unknown timezones encode index 0.
    pub fn from_date(s: &str) -> Result<Self, TimecodeError> {
        let b = s.as_bytes();
        if b.len() < 11 {
            return Err(TimecodeError::BadUserBits);
        }

        let mut bits = UserBits(0);
        for (n, idx) in [(1, 10), (2, 9), (3, 6), (4, 5), (5, 2), (6, 1)] {
            let c = b[idx];
            if !c.is_ascii_digit() {
                return Err(TimecodeError::BadUserBits);
            }
            bits.set_nibble(n, c - b'0');
        }

        let tz = s.get(11..).unwrap_or("");
        let index = TIMEZONES.iter().position(|z| *z == tz).unwrap_or(0) as u8;
        bits.set_nibble(7, index & 0xF);
        bits.set_nibble(8, index >> 4);
        Ok(bits)
    }

    /// Timezone code for the date format, `+0000` when the index is off the table.
    pub fn timezone(self) -> &'static str {
        let index = ((self.nibble(8) << 4) | self.nibble(7)) as usize;
        TIMEZONES.get(index).copied().unwrap_or(TIMEZONES[0])
    }
}

impl Timecode {
    /// Render the user bits for display, `*` first when the clock flag is set.
    pub fn user_to_ascii(&self) -> String<24> {
        let mut out: String<24> = String::new();
        let ub = self.user_bits;

        if self.user_format == UserFormat::PageLine {
            let _ = out.push_str("Page/Line NA");
            return out;
        }
        if self.clock_flag {
            let _ = out.push('*');
        }

        // At most 17 characters, which always fits.
        let _ = match self.user_format {
            UserFormat::Digits => write!(out, "{:08X}", ub.0),
            UserFormat::Date => write!(
                out,
                "Y{}{}-M{}{}-D{}{}{}",
                digit(ub.nibble(6)),
                digit(ub.nibble(5)),
                digit(ub.nibble(4)),
                digit(ub.nibble(3)),
                digit(ub.nibble(2)),
                digit(ub.nibble(1)),
                ub.timezone()
            ),
            _ => {
                for c in ub.0.to_le_bytes() {
                    let _ = out.push(c as char);
                }
                Ok(())
            }
        };
        out
    }

    /// Store four text characters.
    pub fn set_user_ascii(&mut self, s: &str) -> Result<(), TimecodeError> {
        self.set_user(UserFormat::Text, UserBits::from_text(s)?);
        Ok(())
    }

    /// Store eight BCD/hex digits.
    pub fn set_user_bcd_hex(&mut self, s: &str) {
        self.set_user(UserFormat::Digits, UserBits::from_hex(s));
    }

    /// Store a date and timezone.
    pub fn set_user_date(&mut self, s: &str) -> Result<(), TimecodeError> {
        self.set_user(UserFormat::Date, UserBits::from_date(s)?);
        Ok(())
    }
}

/// Date digits are printed as `'0' + nibble`, even past 9.
fn digit(n: u8) -> char {
    (b'0' + n) as char
}
