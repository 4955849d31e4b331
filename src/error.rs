// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Error types shared across the timecode engine.

use thiserror::Error;

/// Errors from building, parsing or decoding a [`Timecode`](crate::timecode::Timecode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimecodeError {
    /// ASCII timecode was not `HH:MM:SS:FF` or `HHMMSSFF`.
    #[error("malformed timecode string")]
    Malformed,

    /// A field was outside its legal range for the frame rate.
    #[error("timecode field out of range")]
    OutOfRange,

    /// Frame rate string did not name a supported rate.
    #[error("unsupported frame rate")]
    UnsupportedRate,

    /// Drop-frame requested at a rate that has no drop-frame counting.
    #[error("drop-frame is not valid at this frame rate")]
    UnsupportedDropFrame,

    /// Decoded LTC packet carried an impossible value.
    #[error("LTC packet rejected")]
    BadPacket,

    /// User-bit source string could not be encoded.
    #[error("malformed user bits")]
    BadUserBits,
}

/// Errors from the key/value configuration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration value")]
    Invalid,

    /// Key or value too long, or the store is full.
    #[error("configuration store is full")]
    Full,

    #[error(transparent)]
    Timecode(#[from] TimecodeError),
}

/// Fatal engine conditions. The engine has no other caller than its own loop, so these end the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The line encoder ran dry: the loop missed its real-time deadline.
    #[error("Underflow Error")]
    Underflow,
}

/// Errors bringing up the RP2040 line hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LineError {
    /// The programs for a session do not fit in a PIO block's instruction memory.
    #[error("PIO instruction memory full")]
    ProgramSpace,

    #[error("timer alarm already in use")]
    AlarmTaken,
}
