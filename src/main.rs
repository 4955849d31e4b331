// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Firmware entry point.
//!
//! Core 1 runs timecode sessions back to back. Core 0 owns the debug terminal, the keys and the
//! PIO interrupts, and reports the engine state once a second.
//!
//! Keys (active low):
//!
//! | Key | Engine stopped | Engine running |
//! | --- | -------------- | -------------- |
//! | A (GPIO15) | start a Run session | toggle Run / Monitor |
//! | B (GPIO17) | start a Jam session | stop |
//!
//! Holding B at power-up starts with a Jam.

#![no_main]
#![no_std]

use core::cell::Cell;
use core::fmt::Write as _;

use cortex_m_rt::entry;
use critical_section::Mutex;
use embedded_hal::digital::InputPin;
use fugit::{HertzU32, RateExtU32};
use heapless::String;
use log::{error, info, warn, LevelFilter};
use panic_halt as _;

use rp2040_hal::{
    clocks::ClocksManager,
    multicore::{Multicore, Stack},
    pac::{self, interrupt},
    pll::{common_configs::PLL_USB_48MHZ, setup_pll_blocking, PLLConfig},
    uart::{DataBits, StopBits, UartConfig, UartPeripheral},
    xosc::setup_xosc_blocking,
    Clock, Sio, Timer, Watchdog,
};

use pico_timecode::config::{MemoryStore, Settings};
use pico_timecode::engine::{ChannelSet, Engine, EngineShared, RunMode, StartMode};
use pico_timecode::hw::{self, pins::KeyPins, pio, timer, AlarmTimer, BoardPins, PioDivider, Usart};
use pico_timecode::timecode::shared::read_stable;

#[link_section = ".boot2"]
#[used]
pub static BOOT2_FIRMWARE: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

const XTAL_FREQ_HZ: u32 = 12_000_000;
const UART_BAUD_RATE: u32 = 115_200;
const CORE1_STACK_SIZE: usize = 4096;

/// 12 MHz * 120 / 6 / 2. The base dividers assume exactly 120 MHz.
const PLL_SYS_120MHZ: PLLConfig = PLLConfig {
    vco_freq: HertzU32::MHz(1440),
    refdiv: 1,
    post_div1: 6,
    post_div2: 2,
};

static SHARED: EngineShared = EngineShared::new();

/// Next session for core 1 to run.
static SESSION: Mutex<Cell<Option<StartMode>>> = Mutex::new(Cell::new(None));

static mut CORE1_STACK: Stack<CORE1_STACK_SIZE> = Stack::new();

#[entry]
fn main() -> ! {
    let mut pac = pac::Peripherals::take().unwrap();

    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let Some(clocks) = init_clocks(
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    ) else {
        panic!("clock setup failed");
    };

    let mut sio = Sio::new(pac.SIO);
    let pins = BoardPins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);

    let uart = UartPeripheral::new(pac.UART0, pins.uart, &mut pac.RESETS).enable(
        UartConfig::new(UART_BAUD_RATE.Hz(), DataBits::Eight, None, StopBits::One),
        clocks.peripheral_clock.freq(),
    );
    if let Ok(uart) = uart {
        hw::usart::init_logger(Usart::new(uart), LevelFilter::Info);
    }
    info!("pico-timecode {}", env!("CARGO_PKG_VERSION"));

    let mut keys = pins.keys;
    let _line = pins.line;

    let first = if keys.b.is_low().unwrap_or(false) {
        StartMode::Jam
    } else {
        StartMode::Run
    };
    request_session(first);

    let mut timer = Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let alarm = match AlarmTimer::new(&mut timer) {
        Ok(alarm) => alarm,
        Err(e) => panic!("{}", e),
    };

    let (pio0, pio1, resets) = (pac.PIO0, pac.PIO1, pac.RESETS);
    let mut mc = Multicore::new(&mut pac.PSM, &mut pac.PPB, &mut sio.fifo);
    let cores = mc.cores();
    let core1 = &mut cores[1];
    #[allow(static_mut_refs)]
    let spawned = core1.spawn(unsafe { &mut CORE1_STACK.mem }, move || {
        engine_core(pio0, pio1, resets, timer, alarm)
    });
    if spawned.is_err() {
        error!("core 1 did not start");
    }

    // SAFETY: the handlers only touch atomics and PIO flag/FIFO registers.
    unsafe {
        pac::NVIC::unmask(pac::Interrupt::PIO0_IRQ_0);
        pac::NVIC::unmask(pac::Interrupt::PIO1_IRQ_0);
    }

    monitor(&mut keys, &timer)
}

fn init_clocks(
    xosc: pac::XOSC,
    clocks: pac::CLOCKS,
    pll_sys: pac::PLL_SYS,
    pll_usb: pac::PLL_USB,
    resets: &mut pac::RESETS,
    watchdog: &mut Watchdog,
) -> Option<ClocksManager> {
    let xosc = setup_xosc_blocking(xosc, XTAL_FREQ_HZ.Hz()).ok()?;
    watchdog.enable_tick_generation((XTAL_FREQ_HZ / 1_000_000) as u8);

    let mut clocks = ClocksManager::new(clocks);
    let pll_sys = setup_pll_blocking(
        pll_sys,
        xosc.operating_frequency(),
        PLL_SYS_120MHZ,
        &mut clocks,
        resets,
    )
    .ok()?;
    let pll_usb = setup_pll_blocking(
        pll_usb,
        xosc.operating_frequency(),
        PLL_USB_48MHZ,
        &mut clocks,
        resets,
    )
    .ok()?;
    clocks.init_default(&xosc, &pll_sys, &pll_usb).ok()?;
    Some(clocks)
}

fn request_session(mode: StartMode) {
    critical_section::with(|cs| SESSION.borrow(cs).set(Some(mode)));
}

fn wait_for_session() -> StartMode {
    loop {
        if let Some(mode) = critical_section::with(|cs| SESSION.borrow(cs).take()) {
            return mode;
        }
        cortex_m::asm::delay(120_000);
    }
}

/// Core 1: one engine per requested session.
fn engine_core(
    pio0: pac::PIO0,
    pio1: pac::PIO1,
    mut resets: pac::RESETS,
    timer: Timer,
    mut alarm: AlarmTimer,
) -> ! {
    // TODO: back the store with a flash sector so learned calibrations survive a power cycle.
    let mut store = MemoryStore::new();
    let mut settings = Settings::load(&store).unwrap_or_else(|e| {
        warn!("settings rejected ({}), using defaults", e);
        Settings::default()
    });

    let mut blocks = Some((pio0, pio1));
    loop {
        let mode = wait_for_session();
        // SAFETY: the previous session's port is gone and `configure` resets both blocks.
        let (pio0, pio1) = blocks
            .take()
            .unwrap_or_else(|| unsafe { (pac::PIO0::steal(), pac::PIO1::steal()) });

        let config = settings.engine_config(mode);
        let rate = config.timecode.rate();
        let channels = ChannelSet::for_mode(config.mode, config.rx_source);
        let port = match pio::configure(pio0, pio1, &mut resets, &channels, rate) {
            Ok(port) => port,
            Err(e) => {
                error!("line setup failed: {}", e);
                continue;
            }
        };

        let mut engine = Engine::new(&SHARED, port, PioDivider::new(rate), &mut alarm, config);
        let result = engine.run(
            || timer::now_ms(&timer),
            |learned| {
                info!(
                    "learned calval {:.4} for {}{}",
                    learned.calval,
                    learned.rate,
                    if learned.drop_frame { " DF" } else { "" }
                );
                if let Err(e) = settings.store_calibration(&mut store, &learned) {
                    warn!("calibration not stored: {}", e);
                }
            },
        );
        if let Err(e) = result {
            error!("session ended: {}", e);
        }
    }
}

/// Core 0: keys and the once-a-second report.
fn monitor(keys: &mut KeyPins, timer: &Timer) -> ! {
    let mut held = (false, false);
    let mut next_report = 0;

    loop {
        let pressed = (
            keys.a.is_low().unwrap_or(false),
            keys.b.is_low().unwrap_or(false),
        );
        let running = !SHARED.is_stopped();

        if pressed.0 && !held.0 {
            if running {
                let next = match SHARED.mode() {
                    RunMode::Run => RunMode::Monitor,
                    _ => RunMode::Run,
                };
                SHARED.request_mode(next);
            } else {
                request_session(StartMode::Run);
            }
        }
        if pressed.1 && !held.1 {
            if running {
                SHARED.request_mode(RunMode::Halted);
            } else {
                request_session(StartMode::Jam);
            }
        }
        held = pressed;

        let now = timer::now_ms(timer);
        if now >= next_report {
            next_report = now + 1000;
            report();
        }
        cortex_m::asm::delay(1_200_000);
    }
}

/// One status line on the terminal, outside the log format.
fn report() {
    let status = SHARED.status();
    let mut line: String<96> = String::new();
    if SHARED.is_stopped() {
        let _ = write!(line, "{}", status);
    } else {
        let mut tx = SHARED.tx.get();
        tx.set_raw(read_stable(|| SHARED.tx_echo.load()));
        let rx = SHARED.rx.get();
        let _ = write!(
            line,
            "TX {} RX {} UB {} | {} cal {:.3}",
            tx,
            rx,
            tx.user_to_ascii(),
            status,
            SHARED.calval()
        );
    }
    hw::usart::print_line(&line);
}

#[interrupt]
fn PIO0_IRQ_0() {
    pio::on_pio0_irq(&SHARED, timer::now_us());
}

#[interrupt]
fn PIO1_IRQ_0() {
    pio::on_pio1_irq(&SHARED, timer::now_us());
}
