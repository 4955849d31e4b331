// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! RP2040 glue: pins, PIO line machines, timer alarm and the debug UART.

pub mod pins;
pub mod pio;
pub mod timer;
pub mod usart;

pub use pins::BoardPins;
pub use pio::{PioDivider, PioPort};
pub use timer::AlarmTimer;
pub use usart::{DebugUart, Usart};
