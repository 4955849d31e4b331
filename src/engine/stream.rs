// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! TX queue refill.

use super::channel::{ChannelSet, LinePort};
use crate::timecode::shared::SharedTimecode;
use crate::timecode::Timecode;

/// Words written to the blink channel before the first frame.
pub const BLINK_PRELOAD: [u32; 2] = [
    (0b10101001111111110111111101 << 6) + 23,
    0b10101010101010101000101010100010,
];

/// First blink word of a frame with the LED lit.
pub const BLINK_FLASH: u32 = (0b10100010101010011111111101 << 6) + 19;

/// First blink word of a frame with the LED dark.
pub const BLINK_IDLE: u32 = (0b10100010101010001010101000 << 6) + 19;

/// Second blink word of every frame.
pub const BLINK_TAIL: u32 = 0b10101010101010101010101010001010;

/// Marker interrupts raised by a blink word pair.
///
/// The low six bits of the first word hold the step count less one. Each step drives two
/// outputs from the following bits; a step whose second output is low raises the marker
/// interrupt. The first step of every frame is a marker.
pub const fn blink_marks(first: u32, second: u32) -> u32 {
    let steps = (first & 0x3f) + 1;
    let bits = (first >> 6) as u64 | (second as u64) << 26;
    let mut marks = 0;
    let mut i = 0;
    while i < steps {
        if (bits >> (2 * i)) & 0b10 == 0 {
            marks += 1;
        }
        i += 1;
    }
    marks
}

/// Markers before the first frame.
pub const PRELOAD_MARKS: u32 = blink_marks(BLINK_PRELOAD[0], BLINK_PRELOAD[1]);

/// Markers per frame, one at its start and one per quarter after.
pub const FRAME_MARKS: u32 = blink_marks(BLINK_IDLE, BLINK_TAIL);

/// The buffer FIFO is 8 words deep when joined; a sync frame needs three.
const TX_WATERMARK: usize = 7;

/// Which frames light the LED.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum FlashFrame {
    #[default]
    Off,
    /// Every second, at this frame number.
    Frame(u8),
    /// Once, at this raw timecode.
    At(u32),
}

impl FlashFrame {
    pub fn matches(self, tc: &Timecode) -> bool {
        match self {
            FlashFrame::Off => false,
            FlashFrame::Frame(f) => tc.frames() == f,
            FlashFrame::At(raw) => tc.to_raw() == raw,
        }
    }
}

/// Produces the TX words for each frame: echo, LTC packet and blink timing.
pub struct TxProducer {
    send_sync: bool,
    flash: FlashFrame,
}

impl TxProducer {
    pub fn new(flash: FlashFrame) -> Self {
        Self {
            send_sync: true,
            flash,
        }
    }

    /// Queue frames until the buffer channel is above the watermark. Returns the number of
    /// frames queued.
    pub fn refill<P: LinePort>(
        &mut self,
        port: &mut P,
        channels: &ChannelSet,
        tx: &SharedTimecode,
    ) -> usize {
        let Some(buffer) = channels.buffer() else {
            return 0;
        };
        let echo = channels.echo();
        let blink = channels.blink();

        let mut frames = 0;
        while port.tx_level(&buffer) < TX_WATERMARK - self.send_sync as usize {
            let (raw, ltc, next) = tx.update(|tc| {
                let raw = tc.to_raw();
                let ltc = tc.to_ltc();
                tc.next_frame();
                (raw, ltc, *tc)
            });

            if let Some(echo) = &echo {
                port.push(echo, raw);
            }
            for word in ltc.words(self.send_sync) {
                port.push(&buffer, word);
            }
            self.send_sync = !self.send_sync;

            if let Some(blink) = &blink {
                let first = if self.flash.matches(&next) {
                    BLINK_FLASH
                } else {
                    BLINK_IDLE
                };
                port.push(blink, first);
                port.push(blink, BLINK_TAIL);
            }
            frames += 1;
        }
        frames
    }
}
