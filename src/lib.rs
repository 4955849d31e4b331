// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Pico-Timecode Firmware
//!
//! This crate contains the SMPTE Linear Timecode (LTC) engine for an RP2040, written in Rust. It
//! generates LTC from a local clock, decodes an incoming LTC stream, and can jam-sync and
//! phase-lock the generator to that stream by trimming the PIO clock divider.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`timecode`] | Timecode value, drop-frame arithmetic, LTC packet codec, user bits |
//! | [`clock`] | PIO clock divider table and the dithering micro-adjust controller |
//! | [`control`] | PID, rolling averages, phase measurement and calibration learning |
//! | [`engine`] | Line channels, TX/RX queue servicing, Jam lock and the real-time loop |
//! | [`config`] | Typed settings on top of a string key/value store |
//! | `hw` | RP2040 PIO, alarm and UART glue (feature `rp2040`) |
//!
//! Everything except `hw` is hardware independent and is tested on the host:
//!
//! ```bash
//! cargo test
//! ```
//!
//! Flash the board:
//!
//! ```bash
//! cargo run --release --features rp2040 --target thumbv6m-none-eabi
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod timecode;

#[cfg(feature = "rp2040")]
pub mod hw;

pub use error::{ConfigError, EngineError, LineError, TimecodeError};
pub use timecode::{FrameRate, Timecode};
