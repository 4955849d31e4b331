// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Host doubles for the line hardware.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use pico_timecode::clock::{ClockDivider, OneShot};
use pico_timecode::engine::{Channel, LinePort};
use pico_timecode::timecode::packet::LtcFrame;

/// `(block, sm)` of each channel, as laid out by `ChannelSet`.
pub const START: (u8, u8) = (0, 0);
pub const BLINK: (u8, u8) = (0, 1);
pub const BUFFER: (u8, u8) = (0, 2);
pub const ENCODE: (u8, u8) = (0, 3);
pub const ECHO: (u8, u8) = (1, 0);
pub const SYNC: (u8, u8) = (1, 1);
pub const DECODE: (u8, u8) = (1, 2);

#[derive(Default, Debug)]
struct Slot {
    tx: VecDeque<u32>,
    rx: VecDeque<u32>,
    enabled: bool,
}

/// Unbounded queues per state machine. Tests play the line by draining TX and filling RX.
#[derive(Default)]
pub struct MockPort {
    slots: HashMap<(u8, u8), Slot>,
    pub parked: bool,
    /// Runs on every RX level read, standing in for the other core acting mid-poll.
    pub on_rx_level: Option<Box<dyn Fn()>>,
}

impl MockPort {
    fn slot(&mut self, id: (u8, u8)) -> &mut Slot {
        self.slots.entry(id).or_default()
    }

    /// Everything queued for transmission on `id`, oldest first.
    pub fn take_tx(&mut self, id: (u8, u8)) -> Vec<u32> {
        self.slot(id).tx.drain(..).collect()
    }

    pub fn tx_len(&self, id: (u8, u8)) -> usize {
        self.slots.get(&id).map_or(0, |s| s.tx.len())
    }

    pub fn rx_len(&self, id: (u8, u8)) -> usize {
        self.slots.get(&id).map_or(0, |s| s.rx.len())
    }

    pub fn feed_rx(&mut self, id: (u8, u8), words: &[u32]) {
        self.slot(id).rx.extend(words.iter().copied());
    }

    /// Queue one decoded packet as the sync machine would.
    pub fn feed_frame(&mut self, frame: LtcFrame) {
        self.feed_rx(SYNC, &[frame.low, frame.high]);
    }

    pub fn is_enabled(&self, id: (u8, u8)) -> bool {
        self.slots.get(&id).is_some_and(|s| s.enabled)
    }

    pub fn any_enabled(&self) -> bool {
        self.slots.values().any(|s| s.enabled)
    }
}

impl LinePort for MockPort {
    fn tx_level(&self, ch: &Channel) -> usize {
        self.tx_len((ch.block, ch.sm))
    }

    fn rx_level(&self, ch: &Channel) -> usize {
        if let Some(hook) = &self.on_rx_level {
            hook();
        }
        self.rx_len((ch.block, ch.sm))
    }

    fn push(&mut self, ch: &Channel, word: u32) {
        self.slot((ch.block, ch.sm)).tx.push_back(word);
    }

    fn pop(&mut self, ch: &Channel) -> Option<u32> {
        self.slot((ch.block, ch.sm)).rx.pop_front()
    }

    fn set_enabled(&mut self, ch: &Channel, enabled: bool) {
        self.slot((ch.block, ch.sm)).enabled = enabled;
    }

    fn park(&mut self) {
        self.parked = true;
    }
}

/// Records every divider written.
#[derive(Default, Debug)]
pub struct MockDivider {
    pub value: u32,
    pub writes: Vec<u32>,
}

impl ClockDivider for MockDivider {
    fn divider(&self) -> u32 {
        self.value
    }

    fn set_divider(&mut self, divider: u32) {
        self.value = divider;
        self.writes.push(divider);
    }
}

/// Fires as soon as the polled time reaches the deadline.
#[derive(Default, Debug)]
pub struct MockTimer {
    pub deadline: Option<u64>,
}

impl OneShot for MockTimer {
    fn arm(&mut self, deadline_ms: u64) {
        self.deadline = Some(deadline_ms);
    }

    fn cancel(&mut self) {
        self.deadline = None;
    }

    fn expired(&mut self, now_ms: u64) -> bool {
        match self.deadline {
            Some(d) if now_ms >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Bits of `words` in line order (each word LSB first).
pub fn line_bits(words: &[u32]) -> Vec<bool> {
    words
        .iter()
        .flat_map(|w| (0..32).map(move |i| (w >> i) & 1 == 1))
        .collect()
}

/// Collect `n` bits starting at `start` into an integer, first bit lowest.
pub fn bits_at(bits: &[bool], start: usize, n: usize) -> u64 {
    bits[start..start + n]
        .iter()
        .enumerate()
        .fold(0, |acc, (i, b)| acc | (*b as u64) << i)
}
