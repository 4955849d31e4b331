// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! UART debug terminal and the `log` backend that writes to it.
//!
//! Both cores log, so the port lives behind a critical-section mutex and each record is written
//! whole. Records go out as `[LEVEL] message\r\n`.
//!
//! To access the terminal on the host machine, connect a USB-serial adapter to GPIO0/GPIO1 and
//! use
//! ```text
//! $ screen /dev/ttyUSB0 115200
//! ```

use core::cell::RefCell;
use core::fmt::{self, Write as _};

use critical_section::Mutex;
use embedded_hal_nb::serial::Write;
use log::{LevelFilter, Metadata, Record};
use nb::block;
use rp2040_hal::{
    gpio::{bank0, FunctionUart, Pin, PullDown},
    pac,
    uart::{Enabled, UartDevice, UartPeripheral, ValidUartPinout},
};

/// Pins of the debug UART: TX on GPIO0, RX on GPIO1.
pub type DebugPins = (
    Pin<bank0::Gpio0, FunctionUart, PullDown>,
    Pin<bank0::Gpio1, FunctionUart, PullDown>,
);

pub type DebugUart = Usart<pac::UART0, DebugPins>;

pub struct Usart<D: UartDevice, P: ValidUartPinout<D>> {
    uart: UartPeripheral<Enabled, D, P>,
}

impl<D: UartDevice, P: ValidUartPinout<D>> Usart<D, P> {
    pub fn new(uart: UartPeripheral<Enabled, D, P>) -> Self {
        Self { uart }
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        let _ = block!(self.uart.write(b));
    }

    pub fn write_str(&mut self, s: &str) {
        for b in s.bytes() {
            self.write_byte(b);
        }
    }

    /// Write a string followed by CRLF.
    pub fn println(&mut self, s: &str) {
        self.write_str(s);
        self.write_str("\r\n");
    }

    pub fn flush(&mut self) {
        let _ = block!(self.uart.flush());
    }
}

impl<D: UartDevice, P: ValidUartPinout<D>> fmt::Write for Usart<D, P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Usart::write_str(self, s);
        Ok(())
    }
}

/// `log` backend over the debug UART.
pub struct UartLogger {
    port: Mutex<RefCell<Option<DebugUart>>>,
}

static LOGGER: UartLogger = UartLogger {
    port: Mutex::new(RefCell::new(None)),
};

impl log::Log for UartLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        critical_section::with(|cs| {
            if let Some(port) = self.port.borrow_ref_mut(cs).as_mut() {
                let _ = write!(port, "[{}] {}\r\n", record.level(), record.args());
            }
        });
    }

    fn flush(&self) {
        critical_section::with(|cs| {
            if let Some(port) = self.port.borrow_ref_mut(cs).as_mut() {
                port.flush();
            }
        });
    }
}

/// Install the UART as the `log` backend.
///
/// Must run once on core 0 before core 1 is started and before any interrupt is unmasked.
pub fn init_logger(port: DebugUart, level: LevelFilter) {
    critical_section::with(|cs| {
        LOGGER.port.borrow_ref_mut(cs).replace(port);
    });
    // SAFETY: thumbv6m has no atomic compare-and-swap, so the racy setters are the only ones
    // available. Nothing else runs yet.
    unsafe {
        let _ = log::set_logger_racy(&LOGGER);
        log::set_max_level_racy(level);
    }
}

/// Print a line on the terminal outside the `log` format.
pub fn print_line(line: &str) {
    critical_section::with(|cs| {
        if let Some(port) = LOGGER.port.borrow_ref_mut(cs).as_mut() {
            port.println(line);
        }
    });
}
