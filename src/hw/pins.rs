// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Pin definitions for the Raspberry Pi Pico running the timecode engine.

use rp2040_hal::{
    gpio::{
        bank0, FunctionPio0, FunctionPio1, FunctionSioInput, FunctionUart, Pin, Pins, PullDown,
        PullNone, PullUp,
    },
    pac,
    sio::SioGpioBank0,
};

use super::usart::DebugPins;

/// All board pins. Construct this once at startup using:
///
/// ```rust,ignore
/// let pins = BoardPins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);
/// ```
pub struct BoardPins {
    pub uart: DebugPins,
    pub keys: KeyPins,
    pub line: LinePins,
}

/// Front panel keys, active low.
pub struct KeyPins {
    pub a: Pin<bank0::Gpio15, FunctionSioInput, PullUp>,
    pub b: Pin<bank0::Gpio17, FunctionSioInput, PullUp>,
}

/// Signals owned by the line state machines. See [`super::pio::pins`].
pub struct LinePins {
    pub ltc_out: Pin<bank0::Gpio13, FunctionPio0, PullDown>,
    pub ltc_in: Pin<bank0::Gpio18, FunctionSioInput, PullNone>,
    pub rx_bits: (
        Pin<bank0::Gpio19, FunctionPio1, PullDown>,
        Pin<bank0::Gpio20, FunctionPio1, PullDown>,
    ),
    pub rx_frame: Pin<bank0::Gpio21, FunctionPio1, PullDown>,
    pub tx_bits: Pin<bank0::Gpio22, FunctionPio0, PullDown>,
    pub led: Pin<bank0::Gpio25, FunctionPio0, PullDown>,
    pub marker: Pin<bank0::Gpio26, FunctionPio0, PullDown>,
}

impl BoardPins {
    /// Create all named pins from the raw GPIO bank.
    pub fn new(
        io_bank0: pac::IO_BANK0,
        pads_bank0: pac::PADS_BANK0,
        sio_gpio: SioGpioBank0,
        resets: &mut pac::RESETS,
    ) -> Self {
        let pins = Pins::new(io_bank0, pads_bank0, sio_gpio, resets);

        Self {
            uart: (
                pins.gpio0.into_function::<FunctionUart>(),
                pins.gpio1.into_function::<FunctionUart>(),
            ),

            keys: KeyPins {
                a: pins.gpio15.into_pull_up_input(),
                b: pins.gpio17.into_pull_up_input(),
            },

            line: LinePins {
                ltc_out: pins.gpio13.into_function(),
                ltc_in: pins.gpio18.into_floating_input(),
                rx_bits: (pins.gpio19.into_function(), pins.gpio20.into_function()),
                rx_frame: pins.gpio21.into_function(),
                tx_bits: pins.gpio22.into_function(),
                led: pins.gpio25.into_function(),
                marker: pins.gpio26.into_function(),
            },
        }
    }
}
