// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! PIO line state machines.
//!
//! [`configure`] resets both PIO blocks, loads the programs for a [`ChannelSet`] and leaves every
//! machine stopped. After that the engine drives them through [`PioPort`] and [`PioDivider`],
//! which go straight to the block registers, so one session needs no typestate handles.
//!
//! All machines run at `nominal * 80 * 32` Hz: 32 cycles per LTC bit.
//!
//! Interrupt flags: the blink machine raises its flag at every marker step, the buffer machine
//! when it runs dry, and the sync machine at the start of each received packet. The handlers
//! are [`on_pio0_irq`] and [`on_pio1_irq`].

use core::sync::atomic::{AtomicU32, Ordering};

use pio::{
    InstructionOperands, MovDestination, MovOperation, MovSource, Program,
    RP2040_MAX_PROGRAM_SIZE,
};
use pio_proc::pio_asm;
use rp2040_hal::{
    pac,
    pio::{Buffers, PIOBuilder, PIOExt, PinDir, PinState, ShiftDirection},
};

use crate::clock::{base_divider, ClockDivider};
use crate::engine::{
    Channel, ChannelKind, ChannelSet, EngineShared, LinePort, RxSource, StartTrigger,
    FRAME_MARKS, PRELOAD_MARKS,
};
use crate::error::LineError;
use crate::timecode::FrameRate;

/// GPIO numbers of the line signals.
pub mod pins {
    /// Encoded LTC output.
    pub const LTC_OUT: u8 = 13;
    /// Encoded LTC input.
    pub const LTC_IN: u8 = 18;
    /// Decoded RX bit, driven on two adjacent pins.
    pub const RX_BITS: u8 = 19;
    /// Low while an RX packet is being read.
    pub const RX_FRAME: u8 = 21;
    /// Raw TX bit stream into the encoder.
    pub const TX_BITS: u8 = 22;
    /// On-board LED.
    pub const LED: u8 = 25;
    /// Blink marker, low on the steps that raise the blink interrupt.
    pub const MARKER: u8 = 26;
}

const BLINK_SM: u8 = 1;
const BUFFER_SM: u8 = 2;
const ECHO_SM: u8 = 0;
const SYNC_SM: u8 = 1;

/// Blink interrupts seen this session.
static MARKS: AtomicU32 = AtomicU32::new(0);

type LineProgram = Program<RP2040_MAX_PROGRAM_SIZE>;

fn auto_start() -> LineProgram {
    pio_asm!(
        "
            set x, 0
            nop
            nop
            irq clear 4
        wait_for_low:
            jmp x-- null1
        null1:
            jmp pin wait_for_low [2]
            mov isr, x
            push
            jmp x-- wait_for_high [1]
        .wrap_target
        wait_for_high:
            jmp x-- null2
        null2:
            jmp pin wait_for_low [2]
        .wrap
        "
    )
    .program
}

fn start_from_rx() -> LineProgram {
    pio_asm!(
        "
            set x, 0
            wait 0 pin 0
            wait 1 pin 0
            irq clear 4
        wait_for_low:
            jmp x-- null1
        null1:
            jmp pin wait_for_low [2]
            mov isr, x
            push
            jmp x-- wait_for_high [1]
        .wrap_target
        wait_for_high:
            jmp x-- null2
        null2:
            jmp pin wait_for_low [2]
        .wrap
        "
    )
    .program
}

fn blink() -> LineProgram {
    pio_asm!(
        "
            irq wait 4
        .wrap_target
            out x, 6
        next:
            out pins, 2
            jmp pin skip_irq
            irq 0 rel [4]
        skip_irq:
            set y, 3 [2]
            jmp x-- delay
            pull [27]
            jmp y-- delay
        delay:
            jmp y-- delay [29]
            jmp x!=y next
        .wrap
        "
    )
    .program
}

fn buffer_out() -> LineProgram {
    pio_asm!(
        "
            irq wait 4
        start:
            out pins, 1 [30]
            jmp !osre start
            irq 0 rel
        .wrap_target
            set pins, 0
        .wrap
        "
    )
    .program
}

fn encode() -> LineProgram {
    pio_asm!(
        "
            irq wait 4
        .wrap_target
        toggle_0:
            mov pins, !pins [14]
            jmp pin toggle_1
            jmp toggle_0 [15]
        toggle_1:
            mov pins, !pins [15]
        .wrap
        "
    )
    .program
}

fn echo() -> LineProgram {
    pio_asm!(
        "
        .wrap_target
            out x, 32
            in x, 32
        .wrap
        "
    )
    .program
}

fn sync_and_read() -> LineProgram {
    pio_asm!(
        "
            out y, 32
        .wrap_target
        find_sync:
            mov isr, x
            irq wait 5
            in pins, 2
            mov x, isr [10]
            jmp x!=y find_sync
            set pins, 0
            set x, 31 [8]
            mov isr, null
            irq 0 rel
            set pins, 0
        next_bit:
            in pins, 1
            jmp x-- next_bit [30]
            set x, 30
        next_bit2:
            in pins, 1
            jmp x-- next_bit2 [30]
            set pins, 1
            in pins, 1
        .wrap
        "
    )
    .program
}

fn decode() -> LineProgram {
    pio_asm!(
        "
        previously_low:
            wait 1 pin 0
            irq clear 5 [19]
            jmp pin staying_high
            set pins, 3
            jmp previously_low
        staying_high:
            set pins, 0
        .wrap_target
        previously_high:
            wait 0 pin 0
            irq clear 5 [19]
            jmp pin going_high
            set pins, 0
            jmp previously_low
        going_high:
            set pins, 3
        .wrap
        "
    )
    .program
}

/// Register block of PIO0 or PIO1.
fn block(index: u8) -> &'static pac::pio0::RegisterBlock {
    let ptr = if index == 0 {
        pac::PIO0::ptr()
    } else {
        pac::PIO1::ptr()
    };
    // SAFETY: the blocks are memory mapped for the life of the program. FIFO, flag and divider
    // writes are single word stores; CTRL is only modified from the engine core.
    unsafe { &*ptr }
}

/// Reset both PIO blocks and load the programs for `channels`. Every machine is left stopped.
pub fn configure(
    pio0: pac::PIO0,
    pio1: pac::PIO1,
    resets: &mut pac::RESETS,
    channels: &ChannelSet,
    rate: FrameRate,
) -> Result<PioPort, LineError> {
    let div = base_divider(rate);
    let (int, frac) = ((div >> 16) as u16, (div >> 8) as u8);

    let (mut tx, sm0, sm1, sm2, sm3) = pio0.split(resets);
    let (mut rx, sm4, sm5, sm6, _) = pio1.split(resets);

    let trigger = match channels.start().map(|c| c.kind) {
        Some(ChannelKind::Start(StartTrigger::FromRx)) => StartTrigger::FromRx,
        _ => StartTrigger::Auto,
    };
    let program = match trigger {
        StartTrigger::Auto => auto_start(),
        StartTrigger::FromRx => start_from_rx(),
    };
    let installed = tx.install(&program).map_err(|_| LineError::ProgramSpace)?;
    let _start = PIOBuilder::from_installed_program(installed)
        .clock_divisor_fixed_point(int, frac)
        .jmp_pin(pins::RX_FRAME)
        .in_pin_base(pins::RX_FRAME)
        .build(sm0);

    let installed = tx.install(&blink()).map_err(|_| LineError::ProgramSpace)?;
    let (mut sm, _, _) = PIOBuilder::from_installed_program(installed)
        .clock_divisor_fixed_point(int, frac)
        .out_pins(pins::LED, 2)
        .jmp_pin(pins::MARKER)
        .out_shift_direction(ShiftDirection::Right)
        .autopull(true)
        .buffers(Buffers::OnlyTx)
        .build(sm1);
    sm.set_pindirs([(pins::LED, PinDir::Output), (pins::MARKER, PinDir::Output)]);
    sm.set_pins([(pins::LED, PinState::High), (pins::MARKER, PinState::High)]);

    let installed = tx.install(&buffer_out()).map_err(|_| LineError::ProgramSpace)?;
    let (mut sm, _, _) = PIOBuilder::from_installed_program(installed)
        .clock_divisor_fixed_point(int, frac)
        .out_pins(pins::TX_BITS, 1)
        .set_pins(pins::TX_BITS, 1)
        .out_shift_direction(ShiftDirection::Right)
        .autopull(true)
        .buffers(Buffers::OnlyTx)
        .build(sm2);
    sm.set_pindirs([(pins::TX_BITS, PinDir::Output)]);
    sm.set_pins([(pins::TX_BITS, PinState::Low)]);

    let installed = tx.install(&encode()).map_err(|_| LineError::ProgramSpace)?;
    let (mut sm, _, _) = PIOBuilder::from_installed_program(installed)
        .clock_divisor_fixed_point(int, frac)
        .jmp_pin(pins::TX_BITS)
        .in_pin_base(pins::LTC_OUT)
        .out_pins(pins::LTC_OUT, 1)
        .build(sm3);
    sm.set_pindirs([(pins::LTC_OUT, PinDir::Output)]);
    sm.set_pins([(pins::LTC_OUT, PinState::Low)]);

    let installed = rx.install(&echo()).map_err(|_| LineError::ProgramSpace)?;
    let _echo = PIOBuilder::from_installed_program(installed)
        .clock_divisor_fixed_point(int, frac)
        .autopull(true)
        .autopush(true)
        .build(sm4);

    let source = channels.iter().find_map(|c| match c.kind {
        ChannelKind::RxDecode(source) => Some(source),
        _ => None,
    });
    if let Some(source) = source {
        let installed = rx
            .install(&sync_and_read())
            .map_err(|_| LineError::ProgramSpace)?;
        let (mut sm, _, _) = PIOBuilder::from_installed_program(installed)
            .clock_divisor_fixed_point(int, frac)
            .jmp_pin(pins::RX_BITS)
            .in_pin_base(pins::RX_BITS)
            .out_pins(pins::RX_FRAME, 1)
            .set_pins(pins::RX_FRAME, 1)
            .in_shift_direction(ShiftDirection::Right)
            .autopull(true)
            .autopush(true)
            .build(sm5);
        sm.set_pindirs([(pins::RX_FRAME, PinDir::Output)]);
        sm.set_pins([(pins::RX_FRAME, PinState::Low)]);

        let input = match source {
            RxSource::External => pins::LTC_IN,
            RxSource::Loopback => pins::LTC_OUT,
        };
        let installed = rx.install(&decode()).map_err(|_| LineError::ProgramSpace)?;
        let (mut sm, _, _) = PIOBuilder::from_installed_program(installed)
            .clock_divisor_fixed_point(int, frac)
            .jmp_pin(input)
            .in_pin_base(input)
            .set_pins(pins::RX_BITS, 2)
            .build(sm6);
        sm.set_pindirs([
            (pins::RX_BITS, PinDir::Output),
            (pins::RX_BITS + 1, PinDir::Output),
        ]);
        sm.set_pins([
            (pins::RX_BITS, PinState::Low),
            (pins::RX_BITS + 1, PinState::Low),
        ]);
    }

    MARKS.store(0, Ordering::Relaxed);
    let irq_flags = 1 << (8 + BLINK_SM) | 1 << (8 + BUFFER_SM);
    block(0)
        .irq0_inte()
        .write(|w| unsafe { w.bits(irq_flags) });
    block(1)
        .irq0_inte()
        .write(|w| unsafe { w.bits(1 << (8 + SYNC_SM)) });

    Ok(PioPort { _private: () })
}

/// [`LinePort`] over the PIO FIFOs. Only [`configure`] makes one.
pub struct PioPort {
    _private: (),
}

impl LinePort for PioPort {
    fn tx_level(&self, ch: &Channel) -> usize {
        let level = block(ch.block).flevel().read().bits();
        ((level >> (8 * ch.sm)) & 0xf) as usize
    }

    fn rx_level(&self, ch: &Channel) -> usize {
        let level = block(ch.block).flevel().read().bits();
        ((level >> (8 * ch.sm + 4)) & 0xf) as usize
    }

    fn push(&mut self, ch: &Channel, word: u32) {
        let pio = block(ch.block);
        while pio.fstat().read().bits() & 1 << (16 + ch.sm) != 0 {
            core::hint::spin_loop();
        }
        pio.txf(ch.sm as usize).write(|w| unsafe { w.bits(word) });
    }

    fn pop(&mut self, ch: &Channel) -> Option<u32> {
        let pio = block(ch.block);
        if pio.fstat().read().bits() & 1 << (8 + ch.sm) != 0 {
            return None;
        }
        Some(pio.rxf(ch.sm as usize).read().bits())
    }

    fn set_enabled(&mut self, ch: &Channel, enabled: bool) {
        let mask = 1 << ch.sm;
        block(ch.block).ctrl().modify(|r, w| {
            let bits = if enabled {
                r.bits() | mask
            } else {
                r.bits() & !mask
            };
            unsafe { w.bits(bits) }
        });
    }

    fn park(&mut self) {
        let low = InstructionOperands::MOV {
            destination: MovDestination::PINS,
            op: MovOperation::None,
            source: MovSource::NULL,
        }
        .encode();
        // blink, buffer and encoder own the outputs
        for sm in [BLINK_SM, BUFFER_SM, 3] {
            block(0)
                .sm(sm as usize)
                .sm_instr()
                .write(|w| unsafe { w.bits(low as u32) });
        }
    }
}

/// Writes one divider to every line state machine.
pub struct PioDivider {
    divider: u32,
}

impl PioDivider {
    pub fn new(rate: FrameRate) -> Self {
        Self {
            divider: base_divider(rate),
        }
    }
}

impl ClockDivider for PioDivider {
    fn divider(&self) -> u32 {
        self.divider
    }

    fn set_divider(&mut self, divider: u32) {
        critical_section::with(|_| {
            for (index, machines) in [(0, 4), (1, 3)] {
                for sm in 0..machines {
                    block(index)
                        .sm(sm)
                        .sm_clkdiv()
                        .write(|w| unsafe { w.bits(divider) });
                }
            }
        });
        self.divider = divider;
    }
}

/// PIO0 interrupt: blink markers and TX underflow.
///
/// The first marker of each frame stamps the frame start and takes that frame's raw value off
/// the echo queue, so `tx_echo` always names the frame on the line.
pub fn on_pio0_irq(shared: &EngineShared, now_us: u32) {
    let pio = block(0);
    let flags = pio.irq().read().bits();

    if flags & 1 << BLINK_SM != 0 {
        pio.irq().write(|w| unsafe { w.bits(1 << BLINK_SM) });
        let mark = MARKS.load(Ordering::Relaxed);
        MARKS.store(mark.wrapping_add(1), Ordering::Relaxed);

        if mark >= PRELOAD_MARKS && (mark - PRELOAD_MARKS) % FRAME_MARKS == 0 {
            shared.tx_stamp.publish(now_us);
            let echo = block(1);
            if echo.fstat().read().bits() & 1 << (8 + ECHO_SM) == 0 {
                shared
                    .tx_echo
                    .publish(echo.rxf(ECHO_SM as usize).read().bits());
            }
        }
    }

    if flags & 1 << BUFFER_SM != 0 {
        pio.irq().write(|w| unsafe { w.bits(1 << BUFFER_SM) });
        shared.signal_underflow();
    }
}

/// PIO1 interrupt: start of an RX packet.
pub fn on_pio1_irq(shared: &EngineShared, now_us: u32) {
    let pio = block(1);
    if pio.irq().read().bits() & 1 << SYNC_SM != 0 {
        pio.irq().write(|w| unsafe { w.bits(1 << SYNC_SM) });
        shared.rx_stamp.publish(now_us);
    }
}
